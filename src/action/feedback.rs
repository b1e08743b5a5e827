use crate::fusion::{PerceptionSnapshot, PoseEstimate};

/// What the control cycle observed; token predicates read this.
#[derive(Debug, Clone, Default)]
pub struct ControlFeedback {
    pub cycle: u64,
    /// Composite heading emitted this cycle.
    pub heading_command: Option<f32>,
    /// Composite depth emitted this cycle.
    pub depth_command: Option<f32>,
    /// Last error reported by the motion layer; stale when a call failed.
    pub heading_error: f32,
    pub depth_error: f32,
    pub pose: Option<PoseEstimate>,
    pub perception: PerceptionSnapshot,
}
