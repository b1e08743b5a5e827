/**
 * Fusion Engine
 *
 * Fixed-rate control cycle:
 * 1. Zero vote values, drain perception, let the active mission re-populate
 * 2. Decay weights on the decay clock
 * 3. Blend votes into a composite setpoint and, when armed, send it down
 *    the motion link together with a pose-error speed correction
 * 4. Broadcast desired/measured state and poll the action tokens
 */

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::action::{ControlFeedback, TokenRegistry};
use crate::config::{ControlParams, MissionConfig};
use crate::mission::{ActiveMission, SharedContext};
use crate::motion::{heading_difference, MotionLink};
use crate::pubsub::{Publisher, Subscriber};
use super::decay::DecayClock;
use super::perception::{PerceptionSnapshot, PoseEstimate, TargetPolicy, TargetReport};
use super::vote::{Composite, VoteRegistry};

/// Shared state the control cycle and the interlock both act on.
#[derive(Clone)]
pub struct ControlHandles {
    pub votes: Arc<VoteRegistry>,
    pub tokens: Arc<TokenRegistry>,
    pub mission: Arc<ActiveMission>,
    pub link: Arc<dyn MotionLink>,
}

pub struct EngineTopics {
    pub pose: Subscriber<PoseEstimate>,
    pub targets: Subscriber<TargetReport>,
    pub controls: Publisher<ControlState>,
}

/// Desired setpoint next to the measured pose, for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlState {
    pub desired: Composite,
    pub measured: Option<PoseEstimate>,
}

/// Latest control state plus its topic. Publishing is best effort: a cycle
/// that finds the state locked skips its broadcast.
pub struct ControlBroadcast {
    latest: Mutex<ControlState>,
    out: Publisher<ControlState>,
}

impl ControlBroadcast {
    pub fn new(out: Publisher<ControlState>) -> Self {
        Self { latest: Mutex::new(ControlState::default()), out }
    }

    pub fn latest(&self) -> ControlState {
        *self.latest.lock()
    }

    fn try_publish(&self, state: ControlState) -> bool {
        match self.latest.try_lock() {
            Some(mut latest) => {
                *latest = state;
                self.out.publish(state);
                true
            }
            None => false,
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub heading: Option<f32>,
    pub depth: Option<f32>,
    pub speed: Option<f32>,
    pub pose_error: Option<f32>,
    pub decayed: bool,
    pub broadcast: bool,
}

pub struct FusionEngine {
    control: ControlParams,
    max_speed: f32,
    handles: ControlHandles,
    topics: EngineTopics,
    policy: Box<dyn TargetPolicy>,
    broadcast: Arc<ControlBroadcast>,
    decay: DecayClock,
    // last errors the controller reported; kept when a request fails
    heading_error: f32,
    depth_error: f32,
    cycle: u64,
}

impl FusionEngine {
    pub fn new(config: &MissionConfig, handles: ControlHandles, topics: EngineTopics, policy: Box<dyn TargetPolicy>) -> Self {
        let broadcast = Arc::new(ControlBroadcast::new(topics.controls.clone()));
        Self {
            control: config.control.clone(),
            max_speed: config.mission.max_speed,
            handles,
            topics,
            policy,
            broadcast,
            decay: DecayClock::new(config.control.decay_interval()),
            heading_error: 0.0,
            depth_error: 0.0,
            cycle: 0,
        }
    }

    pub fn broadcast(&self) -> Arc<ControlBroadcast> {
        Arc::clone(&self.broadcast)
    }

    /// Last (heading, depth) errors reported by the controller.
    pub fn last_errors(&self) -> (f32, f32) {
        (self.heading_error, self.depth_error)
    }

    pub fn run_cycle(&mut self, now: Instant) -> CycleReport {
        self.cycle += 1;
        let votes = &self.handles.votes;

        votes.reset_values();
        let perception = self.drain_perception();
        let context = self.handles.mission.context();
        if let Some(context) = &context {
            context.lock().contribute(votes, &perception);
        }

        let decayed = self.decay.tick(now);
        if decayed {
            votes.decay();
        }

        let composite = votes.composite();
        let pose = self.topics.pose.peek_latest().map(|(pose, _)| pose);
        let mut report = CycleReport { cycle: self.cycle, decayed, ..Default::default() };

        // the whole emission runs under the actuation lock so a disarm
        // cannot slip in between the armed check and the last command
        let mission = Arc::clone(&self.handles.mission);
        mission.actuate(|| self.emit(composite, pose, context.as_ref(), &mut report));

        report.broadcast = self.broadcast.try_publish(ControlState { desired: composite, measured: pose });
        if !report.broadcast {
            log::trace!("control state busy, skipping broadcast");
        }

        let feedback = ControlFeedback {
            cycle: self.cycle,
            heading_command: report.heading,
            depth_command: report.depth,
            heading_error: self.heading_error,
            depth_error: self.depth_error,
            pose,
            perception,
        };
        self.handles.tokens.poll(&feedback, now);

        report
    }

    fn emit(&mut self, composite: Composite, pose: Option<PoseEstimate>, context: Option<&SharedContext>, report: &mut CycleReport) {
        let link = Arc::clone(&self.handles.link);
        if let Some(heading) = composite.heading {
            match link.set_heading(heading) {
                Ok(error) => self.heading_error = error,
                Err(e) => log::warn!("set_heading({:.2}) failed: {}", heading, e),
            }
            report.heading = Some(heading);
        }
        if let Some(depth) = composite.depth {
            match link.set_depth(depth) {
                Ok(error) => self.depth_error = error,
                Err(e) => log::warn!("set_depth({:.2}) failed: {}", depth, e),
            }
            report.depth = Some(depth);
        }

        let Some(pose) = pose else { return };
        let error = self.pose_error(composite, pose);
        report.pose_error = Some(error);
        let speed_enabled = context.map_or(false, |context| {
            let mut context = context.lock();
            context.record_pose_error(error);
            context.speed_enabled()
        });
        if speed_enabled {
            let speed = self.corrected_speed(error);
            link.set_speed(speed);
            report.speed = Some(speed);
        }
    }

    fn drain_perception(&self) -> PerceptionSnapshot {
        let mut snapshot = PerceptionSnapshot::default();
        for report in self.topics.targets.drain() {
            let hit = self.policy.target_hit(&report);
            snapshot.record(report, hit);
        }
        snapshot
    }

    /// Scaled distance between the composite setpoint and the measured pose.
    /// Axes without a setpoint contribute nothing.
    fn pose_error(&self, composite: Composite, pose: PoseEstimate) -> f32 {
        let heading = composite.heading.map_or(0.0, |h| heading_difference(h, pose.heading));
        let depth = composite.depth.map_or(0.0, |d| d - pose.depth);
        let heading = heading * self.control.heading_corr_scale;
        let depth = depth * self.control.depth_corr_scale;
        (heading * heading + depth * depth).sqrt()
    }

    fn corrected_speed(&self, pose_error: f32) -> f32 {
        let correction = (pose_error * self.control.speed_corr_scale).min(self.max_speed);
        self.max_speed - correction
    }

    /// Run cycles at the configured period until `running` clears.
    pub fn run(mut self, running: Arc<AtomicBool>) {
        let period = self.control.period();
        log::info!("fusion engine running every {:?}", period);

        let mut next = Instant::now();
        while running.load(Ordering::SeqCst) {
            self.run_cycle(Instant::now());

            next += period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                log::debug!("control cycle {} overran by {:?}", self.cycle, now - next);
                next = now;
            }
        }
        log::info!("fusion engine stopped after {} cycles", self.cycle);
    }

    pub fn start(self, running: Arc<AtomicBool>) -> JoinHandle<()> {
        thread::spawn(move || self.run(running))
    }
}
