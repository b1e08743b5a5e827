/**
 * Sensor Vote Registry and Fusion
 *
 * Each sensor source votes on heading and depth with a weight; the control
 * cycle blends the votes into one setpoint.
 */

pub mod decay;
pub mod engine;
pub mod perception;
pub mod vote;

pub use decay::DecayClock;
pub use engine::{ControlBroadcast, ControlHandles, ControlState, CycleReport, EngineTopics, FusionEngine};
pub use perception::{AreaThresholdPolicy, PerceptionSnapshot, PoseEstimate, TargetPolicy, TargetReport};
pub use vote::{weighted_mean, Composite, SensorSource, SensorVote, VoteAxis, VoteRegistry};
