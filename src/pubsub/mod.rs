pub mod message;
pub mod topic;
pub mod publisher;
pub mod subscriber;
pub mod registry;

pub use message::Message;
pub use topic::Topic;
pub use publisher::Publisher;
pub use subscriber::Subscriber;
pub use registry::{TopicRegistry, KILL_SWITCH_TOPIC, POSE_TOPIC, TARGETS_TOPIC, CONTROLS_TOPIC};
