/**
 * Motion Link
 *
 * Interface to the low-level controller that owns the depth/heading PID
 * loops and the thrusters. Two request/response calls return the
 * controller's current error term; speed is fire-and-forget.
 */

pub mod serial;
pub mod sim;

pub use serial::SerialLink;
pub use sim::SimulatedVehicle;

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no {request} reply within {timeout:?}")]
    Timeout { request: &'static str, timeout: Duration },

    #[error("payload of {0} bytes does not fit in a frame")]
    PayloadTooLarge(usize),

    #[error("motion link unavailable: {0}")]
    Unavailable(String),
}

pub trait MotionLink: Send + Sync {
    /// Request a new depth setpoint; returns the controller's depth error.
    fn set_depth(&self, depth: f32) -> Result<f32, LinkError>;

    /// Request a new heading setpoint; returns the controller's heading error.
    fn set_heading(&self, heading: f32) -> Result<f32, LinkError>;

    fn set_speed(&self, speed: f32);
}

/// Signed difference `target - current` wrapped into [-180, 180).
pub fn heading_difference(target: f32, current: f32) -> f32 {
    (target - current + 180.0).rem_euclid(360.0) - 180.0
}
