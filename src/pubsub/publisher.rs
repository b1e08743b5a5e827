use std::sync::Arc;
use super::topic::Topic;
use super::message::Message;

pub struct Publisher<T: Message> {
    topic: Arc<Topic<T>>,
}

impl<T: Message> Publisher<T> {
    pub fn new(topic: Arc<Topic<T>>) -> Self {
        Publisher { topic }
    }

    pub fn publish(&self, msg: T) -> u64 {
        self.topic.publish(msg)
    }

    pub fn topic_name(&self) -> &str {
        self.topic.name()
    }
}

impl<T: Message> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Publisher { topic: Arc::clone(&self.topic) }
    }
}
