mod election_timer;
mod heartbeat_timer;

pub(crate) use election_timer::*;
pub(crate) use heartbeat_timer::*;
