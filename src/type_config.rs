use std::fmt::Debug;

use crate::ElectionCore;
use crate::RaftLog;
use crate::ReplicationCore;
use crate::StateMachine;
use crate::StateMachineHandler;
use crate::StateStorage;

/// **This coding style learned from OpenRaft project type config.**
pub trait TypeConfig:
    Sync + Send + Sized + Debug + Clone + Copy + Default + Eq + PartialEq + Ord + PartialOrd + 'static
{
    type R: RaftLog;

    type SM: StateMachine;

    type SS: StateStorage;

    type E: ElectionCore<Self>;

    type REP: ReplicationCore<Self>;

    type SMH: StateMachineHandler<Self>;
}

pub mod alias {
    use super::TypeConfig;

    pub type ROF<T> = <T as TypeConfig>::R;

    pub type SMOF<T> = <T as TypeConfig>::SM;

    pub type SSOF<T> = <T as TypeConfig>::SS;

    pub type EOF<T> = <T as TypeConfig>::E;

    pub type REPOF<T> = <T as TypeConfig>::REP;

    pub type SMHOF<T> = <T as TypeConfig>::SMH;
}

/// Production wiring: sled-backed storage with the default handlers.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct RaftTypeConfig;

impl TypeConfig for RaftTypeConfig {
    type R = crate::SledRaftLog;

    type SM = crate::SledStateMachine;

    type SS = crate::SledStateStorage;

    type E = crate::ElectionHandler<Self>;

    type REP = crate::ReplicationHandler<Self>;

    type SMH = crate::DefaultStateMachineHandler<Self>;
}
