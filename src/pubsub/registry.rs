use parking_lot::RwLock;
use std::sync::Arc;
use std::collections::HashMap;
use std::any::Any;
use super::topic::Topic;
use super::message::Message;

// well known topic names
pub const KILL_SWITCH_TOPIC: &str = "/robot/sensors/kill_switch";
pub const POSE_TOPIC: &str = "/robot/sensors/pose";
pub const TARGETS_TOPIC: &str = "/perception/targets";
pub const CONTROLS_TOPIC: &str = "/robot/controls";

pub struct TopicRegistry {
    topics: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        TopicRegistry {
            topics: RwLock::new(HashMap::new()),
        }
    }

    // a name already bound to a different message type gets replaced
    pub fn get_or_create<T: Message>(&self, name: &str, capacity: usize) -> Arc<Topic<T>> {
        let mut topics = self.topics.write();
        if let Some(existing) = topics.get(name) {
            if let Ok(topic) = existing.clone().downcast::<Topic<T>>() {
                return topic;
            }
            log::warn!("topic {} re-registered with a different message type", name);
        }
        let topic = Arc::new(Topic::<T>::new(name, capacity));
        topics.insert(name.to_string(), topic.clone() as Arc<dyn Any + Send + Sync>);
        topic
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::{PoseEstimate, TargetReport};

    #[test]
    fn test_registry_get_or_create() {
        let registry = TopicRegistry::new();
        let kill: Arc<Topic<bool>> = registry.get_or_create(KILL_SWITCH_TOPIC, 8);
        let pose: Arc<Topic<PoseEstimate>> = registry.get_or_create(POSE_TOPIC, 16);
        assert_eq!(kill.name(), KILL_SWITCH_TOPIC);
        assert_eq!(pose.name(), POSE_TOPIC);
        assert_eq!(registry.topic_count(), 2);
    }

    #[test]
    fn test_registry_same_topic_returns_same() {
        let registry = TopicRegistry::new();
        let first: Arc<Topic<TargetReport>> = registry.get_or_create(TARGETS_TOPIC, 8);
        first.publish(TargetReport { bearing: 42.0, ..Default::default() });
        let second: Arc<Topic<TargetReport>> = registry.get_or_create(TARGETS_TOPIC, 8);
        assert_eq!(second.try_receive().unwrap().bearing, 42.0);
        assert_eq!(registry.topic_count(), 1);
    }
}
