/**
 * Mission Phase State Machine
 *
 * A mission run walks INIT_DIVE -> TRANSIT_GATE -> APPROACH_FIRST_TARGET ->
 * APPROACH_SECOND_TARGET -> COMPLETE on its own thread. Phases drive the
 * vehicle by issuing action tokens and by setting vote weights; the control
 * cycle pulls per-cycle vote values from the shared context.
 */

pub mod cancel;
pub mod context;
pub mod plan;

pub use cancel::CancelToken;
pub use context::{ActiveMission, HeadingSweep, MissionContext, Phase, SharedContext};
pub use plan::{CompetitionMission, MissionPlan, MissionRun, DIVE_STAGES};

use thiserror::Error;

use crate::action::{CommandSpec, TokenState};

#[derive(Debug, Error)]
pub enum MissionError {
    #[error("mission run cancelled")]
    Cancelled,

    #[error("token {id} ({spec:?}) ended as {state:?}")]
    TokenAborted { id: u64, spec: CommandSpec, state: TokenState },

    #[error("mission fault: {0}")]
    Fault(String),
}
