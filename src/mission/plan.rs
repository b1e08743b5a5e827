use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::action::{ActionToken, MotionPlanner, TokenState};
use crate::config::MissionParams;
use crate::fusion::{PoseEstimate, SensorSource, VoteRegistry};
use crate::pubsub::Topic;
use super::cancel::CancelToken;
use super::context::{HeadingSweep, Phase, SharedContext};
use super::MissionError;

/// The initial dive is split into this many equal depth increments.
pub const DIVE_STAGES: u8 = 4;

// degrees
const HEADING_TOLERANCE: f32 = 5.0;

/// Everything one mission run may touch.
pub struct MissionRun {
    pub context: SharedContext,
    pub votes: Arc<VoteRegistry>,
    pub planner: MotionPlanner,
    pub cancel: CancelToken,
    pub params: MissionParams,
    pose: Arc<Topic<PoseEstimate>>,
}

impl MissionRun {
    pub fn new(
        context: SharedContext,
        votes: Arc<VoteRegistry>,
        planner: MotionPlanner,
        cancel: CancelToken,
        params: MissionParams,
        pose: Arc<Topic<PoseEstimate>>,
    ) -> Self {
        Self { context, votes, planner, cancel, params, pose }
    }

    pub fn phase(&self) -> Phase {
        self.context.lock().phase
    }

    pub fn measured_pose(&self) -> Option<PoseEstimate> {
        self.pose.peek_latest().map(|(pose, _)| pose)
    }

    fn transition(&self, next: Phase) {
        let mut ctx = self.context.lock();
        log::info!("State {} -> State {}", ctx.phase, next);
        ctx.phase = next;
    }

    /// Wait up to `timeout` for `token` to succeed. `Ok(false)` when the wait
    /// or the token's own deadline runs out; the token is left as it is.
    pub fn wait_token(&self, token: &ActionToken, timeout: Duration) -> Result<bool, MissionError> {
        let deadline = Instant::now() + timeout;
        loop {
            let slice = deadline.saturating_duration_since(Instant::now()).min(self.params.token_poll());
            if token.wait(slice) {
                return Ok(true);
            }
            self.cancel.check()?;
            match token.state() {
                TokenState::Succeeded => return Ok(true),
                TokenState::TimedOut => return Ok(false),
                TokenState::Cancelled => return Err(self.interrupted(token)),
                TokenState::Issued | TokenState::Running => {}
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
        }
    }

    /// Block until `token` succeeds. A token that times out fails the run.
    pub fn await_token(&self, token: &ActionToken) -> Result<(), MissionError> {
        while !self.wait_token(token, self.params.token_poll())? {
            if token.state() == TokenState::TimedOut {
                return Err(MissionError::TokenAborted { id: token.id(), spec: token.spec(), state: TokenState::TimedOut });
            }
        }
        Ok(())
    }

    /// Keep a velocity token running for `duration`, then cancel it and stop.
    /// Fails if anything else cancels it first.
    pub fn hold(&self, token: &ActionToken, duration: Duration) -> Result<(), MissionError> {
        let held = self.wait_token(token, duration);
        token.cancel();
        self.planner.halt();
        held.map(|_| ())
    }

    /// Start a heading scan around `center` and issue the token that ends it
    /// on the first sighting of `source`.
    pub fn rotate_search(&self, source: SensorSource, center: f32) -> ActionToken {
        let p = &self.params;
        let bounds = (-p.search_span_deg, p.search_span_deg);
        self.context.lock().sweep = Some(HeadingSweep::new(center, bounds.0, bounds.1, p.search_step_deg, p.search_dwell_cycles));
        self.planner.rotate_search(source, center, bounds, p.search_step_deg, p.search_timeout())
    }

    // The kill watcher cancels tokens a moment before the interlock cancels
    // the run. Give the run one poll slice to follow before calling it an abort.
    fn interrupted(&self, token: &ActionToken) -> MissionError {
        if self.cancel.sleep(self.params.token_poll()) {
            MissionError::TokenAborted { id: token.id(), spec: token.spec(), state: TokenState::Cancelled }
        } else {
            MissionError::Cancelled
        }
    }
}

/// A mission script. `run` blocks until the script finishes, fails, or the
/// run is cancelled.
pub trait MissionPlan: Send + Sync {
    fn run(&self, run: &MissionRun) -> Result<(), MissionError>;
}

/// Staged dive, gate transit, then two targets in turn.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompetitionMission;

impl CompetitionMission {
    fn init_dive(&self, run: &MissionRun) -> Result<Phase, MissionError> {
        let params = &run.params;

        log::info!("Doing initial dive");
        if !run.cancel.sleep(params.settle_delay()) {
            return Err(MissionError::Cancelled);
        }

        // hold the heading we are pointing at and let the path vote own both axes
        let heading = run.measured_pose().map_or(0.0, |pose| pose.heading);
        run.votes.reset_weights();
        run.votes.update(SensorSource::Path, |vote| {
            vote.heading.set_weight(1.0);
            vote.heading.decay_rate = 0.0;
            vote.depth.set_weight(1.0);
            vote.depth.decay_rate = 0.0;
            vote.initialized = true;
        });
        run.context.lock().hold_heading = Some(heading);
        let facing = run.planner.face_to(heading, HEADING_TOLERANCE);

        let increment = params.gate_depth / DIVE_STAGES as f32;
        for stage in 1..=DIVE_STAGES {
            let target = increment * stage as f32;
            {
                let mut ctx = run.context.lock();
                ctx.dive_stage = stage;
                ctx.dive_target = Some(target);
            }
            log::info!("Dive stage {}/{}: depth {:.2}", stage, DIVE_STAGES, target);

            let token = run.planner.dive_to(target, params.dive_error_threshold);
            run.await_token(&token)?;
        }

        if facing.success() {
            log::info!("At heading {:.1}", heading);
        } else {
            log::warn!("Finished dive without settling on heading {:.1}", heading);
        }
        facing.cancel();

        Ok(Phase::TransitGate)
    }

    fn transit_gate(&self, run: &MissionRun) -> Result<Phase, MissionError> {
        log::info!("Moving towards gate");
        let token = run.planner.move_at_velocity(run.params.max_speed);
        run.hold(&token, run.params.gate_time())?;
        Ok(Phase::ApproachFirstTarget)
    }

    fn approach(&self, run: &MissionRun, source: SensorSource, next: Phase) -> Result<Phase, MissionError> {
        log::info!("Approaching {:?}", source);
        run.context.lock().tracking = Some(source);
        let decay = run.params.target_heading_decay;
        run.votes.update(source, |vote| vote.heading.decay_rate = decay);

        let hit = self.search(run, source)? && self.close_in(run, source)?;

        run.context.lock().tracking = None;
        run.votes.update(source, |vote| vote.heading.set_weight(0.0));
        if hit {
            log::info!("{:?} hit", source);
            self.ram(run, source)?;
        } else {
            log::warn!("Giving up on {:?}", source);
        }
        Ok(next)
    }

    /// Sweep the heading until `source` is seen. After each failed sweep the
    /// vehicle faces the search heading again and creeps forward.
    fn search(&self, run: &MissionRun, source: SensorSource) -> Result<bool, MissionError> {
        let params = &run.params;
        let center = run
            .measured_pose()
            .map(|pose| pose.heading)
            .or(run.context.lock().hold_heading)
            .unwrap_or(0.0);

        for attempt in 1..=params.search_attempts {
            log::info!("Searching for {:?} around {:.1} (attempt {}/{})", source, center, attempt, params.search_attempts);
            let sweep = run.rotate_search(source, center);
            let seen = run.wait_token(&sweep, params.search_timeout());
            run.context.lock().sweep = None;
            if seen? {
                return Ok(true);
            }
            sweep.cancel();

            let facing = run.planner.face_to(center, HEADING_TOLERANCE);
            if !run.wait_token(&facing, params.realign_timeout())? {
                log::warn!("Could not face {:.1} again", center);
            }
            facing.cancel();

            let creep = run.planner.move_at_velocity(params.creep_speed);
            run.hold(&creep, params.creep_time())?;
        }
        Ok(false)
    }

    /// Steer on the target with speed control until perception calls it hit.
    fn close_in(&self, run: &MissionRun, source: SensorSource) -> Result<bool, MissionError> {
        run.context.lock().speed_enabled = true;
        let token = run.planner.find_target(source, run.params.approach_timeout());
        let hit = run.wait_token(&token, run.params.approach_timeout());
        token.cancel();
        run.context.lock().speed_enabled = false;
        hit
    }

    /// Drive into the target, then back off at twice the speed.
    fn ram(&self, run: &MissionRun, source: SensorSource) -> Result<(), MissionError> {
        log::info!("Ramming {:?}", source);
        let speed = run.params.ram_speed;
        let forward = run.planner.move_at_velocity(speed);
        run.hold(&forward, run.params.ram_time())?;
        let back = run.planner.move_at_velocity(-2.0 * speed);
        run.hold(&back, run.params.ram_time())
    }
}

impl MissionPlan for CompetitionMission {
    fn run(&self, run: &MissionRun) -> Result<(), MissionError> {
        loop {
            run.cancel.check()?;
            let next = match run.phase() {
                Phase::InitDive => self.init_dive(run)?,
                Phase::TransitGate => self.transit_gate(run)?,
                Phase::ApproachFirstTarget => self.approach(run, SensorSource::FirstTarget, Phase::ApproachSecondTarget)?,
                Phase::ApproachSecondTarget => self.approach(run, SensorSource::SecondTarget, Phase::Complete)?,
                Phase::Complete => {
                    log::info!("Mission complete");
                    run.context.lock().speed_enabled = false;
                    return Ok(());
                }
            };
            run.transition(next);
        }
    }
}
