/**
 * Serial Motion Link
 *
 * Talks to the controller board over UART:
 * 1. Sends depth/heading setpoint requests and waits for the error reply
 * 2. Publishes speed commands without waiting
 * 3. Reader thread routes depth, orientation and kill switch frames to topics
 */

use parking_lot::{Condvar, Mutex};
use serialport::SerialPort;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::fusion::PoseEstimate;
use crate::pubsub::Publisher;
use crate::uart::{
    encode_frame, f32_payload, read_f32, read_kill_switch, FrameDecoder, MsgType, OrientationMsg, UartFrame,
};
use super::{LinkError, MotionLink};

const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Replies to outstanding requests, keyed by reply type.
#[derive(Default)]
struct ReplySlots {
    values: Mutex<HashMap<MsgType, f32>>,
    arrived: Condvar,
}

impl ReplySlots {
    // forget any stale reply before a new request goes out
    fn arm(&self, kind: MsgType) {
        self.values.lock().remove(&kind);
    }

    fn fulfil(&self, kind: MsgType, value: f32) {
        self.values.lock().insert(kind, value);
        self.arrived.notify_all();
    }

    fn wait(&self, kind: MsgType, timeout: Duration) -> Option<f32> {
        let deadline = Instant::now() + timeout;
        let mut values = self.values.lock();
        loop {
            if let Some(value) = values.remove(&kind) {
                return Some(value);
            }
            if self.arrived.wait_until(&mut values, deadline).timed_out() {
                return values.remove(&kind);
            }
        }
    }
}

/// Turns decoded frames into topic messages and request replies.
struct FrameRouter {
    replies: Arc<ReplySlots>,
    kill_out: Publisher<bool>,
    pose_out: Publisher<PoseEstimate>,
    heading: Option<f32>,
    depth: Option<f32>,
}

impl FrameRouter {
    fn route(&mut self, frame: &UartFrame) {
        match frame.msg_type {
            MsgType::Depth => {
                if let Some(depth) = read_f32(&frame.payload) {
                    self.depth = Some(depth);
                    self.publish_pose();
                }
            }
            MsgType::Orientation => {
                if let Some(orientation) = OrientationMsg::from_bytes(&frame.payload) {
                    self.heading = Some(orientation.yaw);
                    self.publish_pose();
                }
            }
            MsgType::KillSwitch => {
                if let Some(enabled) = read_kill_switch(&frame.payload) {
                    self.kill_out.publish(enabled);
                }
            }
            MsgType::DepthReply | MsgType::HeadingReply => {
                if let Some(error) = read_f32(&frame.payload) {
                    self.replies.fulfil(frame.msg_type, error);
                }
            }
            MsgType::Heartbeat => log::trace!("controller heartbeat"),
            other => log::debug!("ignoring unexpected {:?} frame from controller", other),
        }
    }

    // pose goes out once both axes have been heard from
    fn publish_pose(&self) {
        if let (Some(heading), Some(depth)) = (self.heading, self.depth) {
            self.pose_out.publish(PoseEstimate { heading, depth });
        }
    }
}

struct UartReader {
    port: Box<dyn SerialPort>,
    decoder: FrameDecoder,
    router: FrameRouter,
    running: Arc<AtomicBool>,
}

impl UartReader {
    fn run_loop(&mut self) {
        let mut read_buf = [0u8; 256];

        while self.running.load(Ordering::SeqCst) {
            match self.port.read(&mut read_buf) {
                Ok(n) if n > 0 => {
                    self.decoder.push(&read_buf[..n]);
                    while let Some(frame) = self.decoder.next_frame() {
                        self.router.route(&frame);
                    }
                }
                Ok(_) => {}
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    log::error!("uart read error: {}", e);
                    thread::sleep(READ_TIMEOUT);
                }
            }
        }
        log::info!("uart reader stopped");
    }
}

pub struct SerialLink {
    writer: Mutex<Box<dyn SerialPort>>,
    replies: Arc<ReplySlots>,
    reply_timeout: Duration,
}

impl SerialLink {
    /// Open the port and start the reader thread. Kill switch samples and
    /// pose estimates are published on the given topics.
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        reply_timeout: Duration,
        kill_out: Publisher<bool>,
        pose_out: Publisher<PoseEstimate>,
        running: Arc<AtomicBool>,
    ) -> Result<(Self, JoinHandle<()>), LinkError> {
        log::info!("opening {} at {} baud", port_name, baud_rate);

        let port = serialport::new(port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()?;
        let reader_port = port.try_clone()?;

        let replies = Arc::new(ReplySlots::default());
        let mut reader = UartReader {
            port: reader_port,
            decoder: FrameDecoder::new(),
            router: FrameRouter {
                replies: Arc::clone(&replies),
                kill_out,
                pose_out,
                heading: None,
                depth: None,
            },
            running,
        };
        let handle = thread::spawn(move || reader.run_loop());

        log::info!("connected to controller on {}", port_name);
        Ok((SerialLink { writer: Mutex::new(port), replies, reply_timeout }, handle))
    }

    fn send(&self, msg_type: MsgType, payload: &[u8]) -> Result<(), LinkError> {
        let frame = encode_frame(msg_type, payload).ok_or(LinkError::PayloadTooLarge(payload.len()))?;
        let mut port = self.writer.lock();
        port.write_all(&frame)?;
        port.flush()?;
        Ok(())
    }

    fn request(&self, request: MsgType, reply: MsgType, value: f32, name: &'static str) -> Result<f32, LinkError> {
        self.replies.arm(reply);
        self.send(request, &f32_payload(value))?;
        self.replies
            .wait(reply, self.reply_timeout)
            .ok_or(LinkError::Timeout { request: name, timeout: self.reply_timeout })
    }
}

impl MotionLink for SerialLink {
    fn set_depth(&self, depth: f32) -> Result<f32, LinkError> {
        self.request(MsgType::SetDepth, MsgType::DepthReply, depth, "set_depth")
    }

    fn set_heading(&self, heading: f32) -> Result<f32, LinkError> {
        self.request(MsgType::SetHeading, MsgType::HeadingReply, heading, "set_heading")
    }

    fn set_speed(&self, speed: f32) {
        if let Err(e) = self.send(MsgType::SetSpeed, &f32_payload(speed)) {
            log::warn!("failed to send speed {}: {}", speed, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::Topic;
    use crate::uart::kill_switch_payload;

    struct Harness {
        router: FrameRouter,
        kill: Arc<Topic<bool>>,
        pose: Arc<Topic<PoseEstimate>>,
        replies: Arc<ReplySlots>,
    }

    fn harness() -> Harness {
        let kill = Arc::new(Topic::new("/robot/sensors/kill_switch", 8));
        let pose = Arc::new(Topic::new("/robot/sensors/pose", 8));
        let replies = Arc::new(ReplySlots::default());
        let router = FrameRouter {
            replies: Arc::clone(&replies),
            kill_out: Publisher::new(Arc::clone(&kill)),
            pose_out: Publisher::new(Arc::clone(&pose)),
            heading: None,
            depth: None,
        };
        Harness { router, kill, pose, replies }
    }

    fn frame(msg_type: MsgType, payload: &[u8]) -> UartFrame {
        let bytes = encode_frame(msg_type, payload).unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        decoder.next_frame().unwrap()
    }

    #[test]
    fn kill_switch_frames_reach_topic() {
        let mut h = harness();
        h.router.route(&frame(MsgType::KillSwitch, &kill_switch_payload(true)));
        h.router.route(&frame(MsgType::KillSwitch, &kill_switch_payload(false)));
        assert_eq!(h.kill.drain(), vec![true, false]);
    }

    #[test]
    fn pose_waits_for_both_axes() {
        let mut h = harness();
        h.router.route(&frame(MsgType::Depth, &f32_payload(3.5)));
        assert!(h.pose.is_empty());

        let orientation = OrientationMsg { roll: 0.0, pitch: 0.0, yaw: 120.0 };
        h.router.route(&frame(MsgType::Orientation, &orientation.to_bytes()));

        let (pose, _) = h.pose.peek_latest().unwrap();
        assert_eq!(pose, PoseEstimate { heading: 120.0, depth: 3.5 });
    }

    #[test]
    fn replies_fulfil_waiting_request() {
        let mut h = harness();
        h.replies.arm(MsgType::DepthReply);
        h.router.route(&frame(MsgType::DepthReply, &f32_payload(-1.25)));
        assert_eq!(h.replies.wait(MsgType::DepthReply, Duration::from_millis(10)), Some(-1.25));
    }

    #[test]
    fn missing_reply_times_out() {
        let h = harness();
        h.replies.arm(MsgType::HeadingReply);
        assert_eq!(h.replies.wait(MsgType::HeadingReply, Duration::from_millis(10)), None);
    }

    #[test]
    fn reply_from_another_thread_wakes_waiter() {
        let replies = Arc::new(ReplySlots::default());
        replies.arm(MsgType::HeadingReply);
        let sender = {
            let replies = Arc::clone(&replies);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                replies.fulfil(MsgType::HeadingReply, 4.0);
            })
        };
        assert_eq!(replies.wait(MsgType::HeadingReply, Duration::from_secs(5)), Some(4.0));
        sender.join().unwrap();
    }
}
