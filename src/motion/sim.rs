/**
 * Simulated Vehicle
 *
 * Stands in for the controller board: tracks setpoints, slews heading and
 * depth towards them at fixed rates, and publishes the resulting pose.
 */

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::fusion::PoseEstimate;
use crate::pubsub::Publisher;
use super::{heading_difference, LinkError, MotionLink};

#[derive(Debug, Clone, Copy, Default)]
struct SimState {
    pose: PoseEstimate,
    heading_setpoint: Option<f32>,
    depth_setpoint: Option<f32>,
    speed: f32,
}

pub struct SimulatedVehicle {
    state: Mutex<SimState>,
    pose_out: Option<Publisher<PoseEstimate>>,
    /// Degrees per second.
    pub turn_rate: f32,
    /// Depth units per second.
    pub dive_rate: f32,
}

impl SimulatedVehicle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            pose_out: None,
            turn_rate: 30.0,
            dive_rate: 20.0,
        }
    }

    pub fn with_pose_publisher(mut self, publisher: Publisher<PoseEstimate>) -> Self {
        self.pose_out = Some(publisher);
        self
    }

    pub fn pose(&self) -> PoseEstimate {
        self.state.lock().pose
    }

    pub fn speed(&self) -> f32 {
        self.state.lock().speed
    }

    /// Advance the simulation by `dt`.
    pub fn step(&self, dt: Duration) {
        let secs = dt.as_secs_f32();
        let pose = {
            let mut s = self.state.lock();
            if let Some(target) = s.heading_setpoint {
                let err = heading_difference(target, s.pose.heading);
                let step = err.clamp(-self.turn_rate * secs, self.turn_rate * secs);
                s.pose.heading = (s.pose.heading + step).rem_euclid(360.0);
            }
            if let Some(target) = s.depth_setpoint {
                let err = target - s.pose.depth;
                s.pose.depth += err.clamp(-self.dive_rate * secs, self.dive_rate * secs);
            }
            s.pose
        };

        if let Some(out) = &self.pose_out {
            out.publish(pose);
        }
    }

    pub fn start(self: Arc<Self>, period: Duration, running: Arc<AtomicBool>) -> JoinHandle<()> {
        thread::spawn(move || {
            log::info!("simulated vehicle running at {:?}", period);
            while running.load(Ordering::SeqCst) {
                self.step(period);
                thread::sleep(period);
            }
        })
    }
}

impl Default for SimulatedVehicle {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionLink for SimulatedVehicle {
    fn set_depth(&self, depth: f32) -> Result<f32, LinkError> {
        let mut s = self.state.lock();
        s.depth_setpoint = Some(depth);
        Ok(depth - s.pose.depth)
    }

    fn set_heading(&self, heading: f32) -> Result<f32, LinkError> {
        let mut s = self.state.lock();
        s.heading_setpoint = Some(heading);
        Ok(heading_difference(heading, s.pose.heading))
    }

    fn set_speed(&self, speed: f32) {
        self.state.lock().speed = speed;
    }
}
