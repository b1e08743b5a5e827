pub mod ring_buffer;
pub mod pubsub;
pub mod uart;
pub mod config;
pub mod fusion;
pub mod action;
pub mod motion;
pub mod mission;
pub mod interlock;
pub mod runtime;
pub mod signal;

#[cfg(test)]
pub(crate) mod test_support;

pub use ring_buffer::RingBuffer;

pub use pubsub::{
    Message, Topic,
    Publisher, Subscriber,
    TopicRegistry,
};

pub use config::{ConfigError, MissionConfig};
pub use fusion::{FusionEngine, PoseEstimate, SensorSource, TargetReport, VoteRegistry};
pub use action::{ActionToken, MotionPlanner, TokenRegistry, TokenState};
pub use motion::{LinkError, MotionLink};
pub use mission::{CompetitionMission, MissionError, MissionPlan, Phase};
pub use interlock::{InterlockState, KillSwitch, SafetyInterlock};
pub use runtime::MissionControl;
