use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::MissionParams;
use crate::fusion::{PerceptionSnapshot, SensorSource, VoteRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    InitDive,
    TransitGate,
    ApproachFirstTarget,
    ApproachSecondTarget,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::InitDive => "Init Dive",
            Phase::TransitGate => "Transit Gate",
            Phase::ApproachFirstTarget => "Approach First Target",
            Phase::ApproachSecondTarget => "Approach Second Target",
            Phase::Complete => "Complete",
        };
        f.write_str(name)
    }
}

/// State of one mission run. A new context is built every time the
/// interlock launches the mission, so counters always start from zero.
#[derive(Debug, Clone)]
pub struct MissionContext {
    pub(crate) phase: Phase,
    pub(crate) dive_stage: u8,
    /// Depth the Path vote holds.
    pub(crate) dive_target: Option<f32>,
    /// Heading the Path vote holds.
    pub(crate) hold_heading: Option<f32>,
    pub(crate) speed_enabled: bool,
    pub(crate) pose_error: Option<f32>,
    /// Source whose sightings steer the vehicle right now.
    pub(crate) tracking: Option<SensorSource>,
    /// Heading scan that overrides `hold_heading` while a target is searched for.
    pub(crate) sweep: Option<HeadingSweep>,
    target_bearing: [Option<f32>; SensorSource::COUNT],
    target_decay: f32,
}

impl MissionContext {
    pub fn new(params: &MissionParams) -> Self {
        Self {
            phase: Phase::InitDive,
            dive_stage: 0,
            dive_target: None,
            hold_heading: None,
            speed_enabled: false,
            pose_error: None,
            tracking: None,
            sweep: None,
            target_bearing: [None; SensorSource::COUNT],
            target_decay: params.target_heading_decay,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn dive_stage(&self) -> u8 {
        self.dive_stage
    }

    pub fn speed_enabled(&self) -> bool {
        self.speed_enabled
    }

    pub fn pose_error(&self) -> Option<f32> {
        self.pose_error
    }

    pub(crate) fn record_pose_error(&mut self, error: f32) {
        self.pose_error = Some(error);
    }

    pub fn sweep(&self) -> Option<&HeadingSweep> {
        self.sweep.as_ref()
    }

    /// Per-cycle vote values. Runs after the engine zeroed every value.
    pub fn contribute(&mut self, votes: &VoteRegistry, perception: &PerceptionSnapshot) {
        let heading = match self.sweep.as_mut() {
            Some(sweep) => Some(sweep.advance()),
            None => self.hold_heading,
        };
        if heading.is_some() || self.dive_target.is_some() {
            let depth = self.dive_target;
            votes.update(SensorSource::Path, |vote| {
                if let Some(heading) = heading {
                    vote.heading.value = heading;
                }
                if let Some(depth) = depth {
                    vote.depth.value = depth;
                }
                vote.initialized = true;
            });
        }

        let Some(source) = self.tracking else { return };

        // a fresh sighting restores full confidence; without one the held
        // bearing keeps voting while its weight decays
        if let Some(report) = perception.latest(source) {
            self.target_bearing[source.index()] = Some(report.bearing);
            let decay = self.target_decay;
            votes.update(source, |vote| {
                vote.heading.set_weight(1.0);
                vote.heading.decay_rate = decay;
                vote.initialized = true;
            });
        }

        if let Some(bearing) = self.target_bearing[source.index()] {
            votes.update(source, |vote| vote.heading.value = bearing);
        }
    }
}

/// Back-and-forth heading scan between `center + min` and `center + max`,
/// moving one `step` every `dwell` control cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingSweep {
    center: f32,
    min: f32,
    max: f32,
    step: f32,
    dwell: u32,
    offset: f32,
    rising: bool,
    held: u32,
}

impl HeadingSweep {
    pub fn new(center: f32, min: f32, max: f32, step: f32, dwell: u32) -> Self {
        Self {
            center,
            min,
            max,
            step: step.abs(),
            dwell: dwell.max(1),
            offset: 0.0_f32.clamp(min, max),
            rising: true,
            held: 0,
        }
    }

    pub fn center(&self) -> f32 {
        self.center
    }

    pub fn heading(&self) -> f32 {
        (self.center + self.offset).rem_euclid(360.0)
    }

    /// Count one control cycle and return the heading to hold for it.
    pub fn advance(&mut self) -> f32 {
        self.held += 1;
        if self.held >= self.dwell {
            self.held = 0;
            let next = if self.rising { self.offset + self.step } else { self.offset - self.step };
            if next > self.max {
                self.rising = false;
                self.offset = (self.offset - self.step).max(self.min);
            } else if next < self.min {
                self.rising = true;
                self.offset = (self.offset + self.step).min(self.max);
            } else {
                self.offset = next;
            }
        }
        self.heading()
    }
}

pub type SharedContext = Arc<Mutex<MissionContext>>;

/// The context of the running mission, as seen by the control cycle, plus
/// the flag that allows actuation at all.
#[derive(Default)]
pub struct ActiveMission {
    armed: AtomicBool,
    context: Mutex<Option<SharedContext>>,
    // held across every actuation and by disarm
    actuation: Mutex<()>,
}

impl ActiveMission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self, context: SharedContext) {
        *self.context.lock() = Some(context);
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Forbid actuation and withdraw the context. Blocks until an actuation
    /// in progress has finished, so whatever the caller commands next is the
    /// last command the vehicle sees.
    pub fn disarm(&self) -> Option<SharedContext> {
        let _actuation = self.actuation.lock();
        self.armed.store(false, Ordering::SeqCst);
        self.context.lock().take()
    }

    /// Run `f` if actuation is allowed. `None` when disarmed.
    pub fn actuate<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let _actuation = self.actuation.lock();
        if self.is_armed() {
            Some(f())
        } else {
            None
        }
    }

    /// Withdraw `context` if it is still the published one. Actuation stays
    /// allowed. Returns whether anything was withdrawn.
    pub fn release(&self, context: &SharedContext) -> bool {
        let mut current = self.context.lock();
        match current.as_ref() {
            Some(published) if Arc::ptr_eq(published, context) => {
                *current = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    pub fn context(&self) -> Option<SharedContext> {
        self.context.lock().clone()
    }
}
