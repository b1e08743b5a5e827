//! Test doubles shared by unit tests across modules.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::motion::{LinkError, MotionLink};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkCall {
    Depth(f32),
    Heading(f32),
    Speed(f32),
}

/// Motion link that records every call and answers with scripted errors.
pub struct RecordingLink {
    calls: Mutex<Vec<LinkCall>>,
    depth_error: Mutex<f32>,
    heading_error: Mutex<f32>,
    failing: AtomicBool,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            depth_error: Mutex::new(0.0),
            heading_error: Mutex::new(0.0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<LinkCall> {
        self.calls.lock().clone()
    }

    pub fn speeds(&self) -> Vec<f32> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                LinkCall::Speed(speed) => Some(*speed),
                _ => None,
            })
            .collect()
    }

    pub fn set_depth_error(&self, error: f32) {
        *self.depth_error.lock() = error;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn reply(&self, error: &Mutex<f32>, request: &'static str) -> Result<f32, LinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LinkError::Timeout { request, timeout: Duration::from_millis(1) });
        }
        Ok(*error.lock())
    }
}

impl MotionLink for RecordingLink {
    fn set_depth(&self, depth: f32) -> Result<f32, LinkError> {
        self.calls.lock().push(LinkCall::Depth(depth));
        self.reply(&self.depth_error, "set_depth")
    }

    fn set_heading(&self, heading: f32) -> Result<f32, LinkError> {
        self.calls.lock().push(LinkCall::Heading(heading));
        self.reply(&self.heading_error, "set_heading")
    }

    fn set_speed(&self, speed: f32) {
        self.calls.lock().push(LinkCall::Speed(speed));
    }
}

/// Forwards to a `RecordingLink`, but depth requests block until the gate
/// is opened. Stands in for a slow serial round trip.
pub struct GatedLink {
    inner: Arc<RecordingLink>,
    closed: Mutex<bool>,
    opened: Condvar,
    blocking: AtomicBool,
}

impl GatedLink {
    pub fn closed(inner: Arc<RecordingLink>) -> Self {
        Self { inner, closed: Mutex::new(true), opened: Condvar::new(), blocking: AtomicBool::new(false) }
    }

    pub fn open(&self) {
        *self.closed.lock() = false;
        self.opened.notify_all();
    }

    /// Whether a depth request is waiting at the gate.
    pub fn is_blocking(&self) -> bool {
        self.blocking.load(Ordering::SeqCst)
    }
}

impl MotionLink for GatedLink {
    fn set_depth(&self, depth: f32) -> Result<f32, LinkError> {
        let mut closed = self.closed.lock();
        while *closed {
            self.blocking.store(true, Ordering::SeqCst);
            self.opened.wait(&mut closed);
        }
        self.blocking.store(false, Ordering::SeqCst);
        drop(closed);
        self.inner.set_depth(depth)
    }

    fn set_heading(&self, heading: f32) -> Result<f32, LinkError> {
        self.inner.set_heading(heading)
    }

    fn set_speed(&self, speed: f32) {
        self.inner.set_speed(speed)
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}
