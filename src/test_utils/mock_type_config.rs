use crate::MockElectionCore;
use crate::MockRaftLog;
use crate::MockReplicationCore;
use crate::MockStateMachine;
use crate::MockStateMachineHandler;
use crate::MockStateStorage;
use crate::TypeConfig;

/// Test wiring: every slot filled with a mockall mock so each test decides
/// exactly which calls it expects.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct MockTypeConfig;

impl TypeConfig for MockTypeConfig {
    type R = MockRaftLog;

    type SM = MockStateMachine;

    type SS = MockStateStorage;

    type E = MockElectionCore<Self>;

    type REP = MockReplicationCore<Self>;

    type SMH = MockStateMachineHandler<Self>;
}
