mod commit_handler;
mod election;
mod event;
mod raft;
mod raft_context;
mod raft_role;
mod replication;
mod state_machine_handler;
mod timer;

pub(crate) use commit_handler::*;
pub(crate) use election::*;
#[doc(hidden)]
pub use event::*;
pub(crate) use raft::*;
pub(crate) use raft_context::*;
#[doc(hidden)]
pub use raft_role::*;
pub(crate) use replication::*;
pub(crate) use state_machine_handler::*;
pub(crate) use timer::*;
use tracing::instrument;


/// Raft paper: 5.4.1 Election restriction
///
/// Raft determines which of two logs is more up-to-date by comparing the index and term of the last
/// entries in the  logs. If the logs have last entries with different terms, then the log with the
/// later term is more up-to-date. If the logs end with the same term, then whichever log is longer
/// is more up-to-date.
#[instrument]
pub(crate) fn is_target_log_more_recent(
    my_last_log_index: u64,
    my_last_log_term: u64,
    target_last_log_index: u64,
    target_last_log_term: u64,
) -> bool {
    (target_last_log_term > my_last_log_term)
        || (target_last_log_term == my_last_log_term && target_last_log_index >= my_last_log_index)
}
