use std::sync::Arc;
use crate::ring_buffer::RingBuffer;
use super::message::Message;

pub struct Topic<T: Message> {
    name: String,
    buffer: Arc<RingBuffer<T>>,
}

impl<T: Message> Topic<T> {
    pub fn new(name: &str, capacity: usize) -> Self {
        Topic {
            name: name.to_string(),
            buffer: Arc::new(RingBuffer::new(capacity)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn publish(&self, msg: T) -> u64 {
        self.buffer.push(msg)
    }

    pub fn try_receive(&self) -> Option<T> {
        self.buffer.pop()
    }

    pub fn drain(&self) -> Vec<T> {
        self.buffer.drain()
    }

    pub fn peek_latest(&self) -> Option<(T, u64)> {
        self.buffer.peek_latest()
    }

    pub fn latest_epoch(&self) -> u64 {
        self.buffer.latest_epoch()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }
}

impl<T: Message> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Topic {
            name: self.name.clone(),
            buffer: Arc::clone(&self.buffer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::PoseEstimate;

    #[test]
    fn test_typed_topic_publish_subscribe() {
        let topic: Topic<PoseEstimate> = Topic::new("/robot/sensors/pose", 8);
        let msg1 = PoseEstimate { heading: 10.0, depth: 1.5 };
        let msg2 = PoseEstimate { heading: 12.0, depth: 1.7 };
        let e1 = topic.publish(msg1.clone());
        let e2 = topic.publish(msg2.clone());
        assert_eq!(e1, 1);
        assert_eq!(e2, 2);
        assert_eq!(topic.len(), 2);
        assert_eq!(topic.name(), "/robot/sensors/pose");
        assert_eq!(topic.try_receive().unwrap(), msg1);
        assert_eq!(topic.try_receive().unwrap(), msg2);
        assert!(topic.try_receive().is_none());
    }

    #[test]
    fn test_typed_topic_peek_latest() {
        let topic: Topic<bool> = Topic::new("/robot/sensors/kill_switch", 8);
        topic.publish(false);
        topic.publish(true);
        let (val, epoch) = topic.peek_latest().unwrap();
        assert!(val);
        assert_eq!(epoch, 2);
        assert_eq!(topic.len(), 2);
    }

    #[test]
    fn test_topic_clone_shares_buffer() {
        let topic1: Topic<f32> = Topic::new("/robot/cmd_vel", 8);
        let topic2 = topic1.clone();
        topic1.publish(75.0);

        assert_eq!(topic2.try_receive(), Some(75.0));
        assert!(topic1.try_receive().is_none());
    }
}
