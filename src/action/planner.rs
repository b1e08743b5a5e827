use std::sync::Arc;
use std::time::Duration;

use crate::fusion::{ControlHandles, SensorSource};
use crate::mission::{ActiveMission, CancelToken};
use crate::motion::MotionLink;
use super::feedback::ControlFeedback;
use super::registry::TokenRegistry;
use super::token::{ActionToken, CommandSpec, Predicate};

// composite setpoints are reproduced through a weighted mean, allow rounding
const SETPOINT_MATCH: f32 = 1e-3;

fn matches_setpoint(command: Option<f32>, target: f32) -> bool {
    command.map_or(false, |c| (c - target).abs() <= SETPOINT_MATCH * target.abs().max(1.0))
}

/// Typed front end to the token registry for one mission run.
#[derive(Clone)]
pub struct MotionPlanner {
    tokens: Arc<TokenRegistry>,
    link: Arc<dyn MotionLink>,
    mission: Arc<ActiveMission>,
    cancel: CancelToken,
}

impl MotionPlanner {
    pub fn new(handles: &ControlHandles, cancel: CancelToken) -> Self {
        Self {
            tokens: Arc::clone(&handles.tokens),
            link: Arc::clone(&handles.link),
            mission: Arc::clone(&handles.mission),
            cancel,
        }
    }

    /// Issue a token for this run. Once the run is cancelled every new token
    /// comes back already cancelled, so nothing outlives a kill sweep.
    pub fn issue(&self, spec: CommandSpec, predicate: Predicate, timeout: Option<Duration>) -> ActionToken {
        let token = self.tokens.issue(spec, Some(predicate), timeout);
        if self.cancel.is_cancelled() {
            token.cancel();
        }
        token
    }

    /// Succeeds once the control cycle commands `depth` and the controller
    /// reports a depth error within `tolerance`.
    pub fn dive_to(&self, depth: f32, tolerance: f32) -> ActionToken {
        self.issue(
            CommandSpec::DiveTo { depth },
            Box::new(move |fb: &ControlFeedback| {
                matches_setpoint(fb.depth_command, depth) && fb.depth_error.abs() <= tolerance
            }),
            None,
        )
    }

    pub fn face_to(&self, heading: f32, tolerance: f32) -> ActionToken {
        self.issue(
            CommandSpec::FaceTo { heading },
            Box::new(move |fb: &ControlFeedback| {
                matches_setpoint(fb.heading_command, heading) && fb.heading_error.abs() <= tolerance
            }),
            None,
        )
    }

    /// Drive at `speed` until the token is cancelled. The speed goes out only
    /// while actuation is armed.
    pub fn move_at_velocity(&self, speed: f32) -> ActionToken {
        let token = self.issue(CommandSpec::MoveAtVelocity { speed }, Box::new(|_: &ControlFeedback| false), None);
        let sent = self.mission.actuate(|| {
            if token.is_live() {
                self.link.set_speed(speed);
            }
        });
        if sent.is_none() {
            log::debug!("actuation disarmed, speed {:.1} not sent", speed);
        }
        token
    }

    /// Command zero speed, if actuation is armed.
    pub fn halt(&self) {
        self.mission.actuate(|| self.link.set_speed(0.0));
    }

    /// Succeeds once perception declares `source` hit; times out after
    /// `timeout`.
    pub fn find_target(&self, source: SensorSource, timeout: Duration) -> ActionToken {
        self.issue(
            CommandSpec::FindTarget { source },
            Box::new(move |fb: &ControlFeedback| fb.perception.target_hit(source)),
            Some(timeout),
        )
    }

    /// Succeeds on the first sighting of `source`; times out after `timeout`.
    /// The scan itself is voted by the mission context.
    pub fn rotate_search(
        &self,
        source: SensorSource,
        center: f32,
        (min, max): (f32, f32),
        step: f32,
        timeout: Duration,
    ) -> ActionToken {
        self.issue(
            CommandSpec::RotateSearch { source, center, min, max, step },
            Box::new(move |fb: &ControlFeedback| fb.perception.latest(source).is_some()),
            Some(timeout),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::TokenState;
    use crate::fusion::{PerceptionSnapshot, TargetReport, VoteRegistry};
    use crate::mission::MissionContext;
    use crate::config::MissionParams;
    use crate::test_support::{LinkCall, RecordingLink};
    use parking_lot::Mutex;
    use std::time::Instant;

    fn armed_handles(link: Arc<RecordingLink>) -> ControlHandles {
        let handles = ControlHandles {
            votes: Arc::new(VoteRegistry::new()),
            tokens: Arc::new(TokenRegistry::new()),
            mission: Arc::new(ActiveMission::new()),
            link,
        };
        handles.mission.arm(Arc::new(Mutex::new(MissionContext::new(&MissionParams::default()))));
        handles
    }

    fn planner() -> (MotionPlanner, Arc<TokenRegistry>, Arc<RecordingLink>, CancelToken) {
        let link = Arc::new(RecordingLink::new());
        let handles = armed_handles(link.clone());
        let cancel = CancelToken::new();
        let planner = MotionPlanner::new(&handles, cancel.clone());
        (planner, handles.tokens, link, cancel)
    }

    #[test]
    fn dive_needs_matching_command_and_small_error() {
        let (planner, tokens, _, _) = planner();
        let token = planner.dive_to(42.5, 4.0);

        // small error left over from the previous stage
        let stale = ControlFeedback { depth_command: Some(21.25), depth_error: 0.5, ..Default::default() };
        tokens.poll(&stale, Instant::now());
        assert!(token.is_live());

        let far = ControlFeedback { depth_command: Some(42.5), depth_error: 12.0, ..Default::default() };
        tokens.poll(&far, Instant::now());
        assert!(token.is_live());

        let there = ControlFeedback { depth_command: Some(42.5), depth_error: -3.9, ..Default::default() };
        tokens.poll(&there, Instant::now());
        assert!(token.success());
    }

    #[test]
    fn face_to_uses_heading_axis() {
        let (planner, tokens, _, _) = planner();
        let token = planner.face_to(270.0, 2.0);

        let fb = ControlFeedback { heading_command: Some(270.0), heading_error: 1.0, depth_error: 50.0, ..Default::default() };
        tokens.poll(&fb, Instant::now());
        assert!(token.success());
    }

    #[test]
    fn velocity_token_commands_speed_and_runs_until_cancelled() {
        let (planner, tokens, link, _) = planner();
        let token = planner.move_at_velocity(75.0);

        assert_eq!(link.calls(), vec![LinkCall::Speed(75.0)]);
        tokens.poll(&ControlFeedback::default(), Instant::now());
        assert!(token.is_live());

        token.cancel();
        assert_eq!(token.state(), TokenState::Cancelled);
    }

    #[test]
    fn find_target_follows_perception_verdict() {
        let (planner, tokens, _, _) = planner();
        let token = planner.find_target(SensorSource::SecondTarget, Duration::from_secs(60));

        let mut perception = PerceptionSnapshot::default();
        perception.record(TargetReport { source: SensorSource::FirstTarget, ..Default::default() }, true);
        tokens.poll(&ControlFeedback { perception: perception.clone(), ..Default::default() }, Instant::now());
        assert!(token.is_live());

        perception.record(TargetReport { source: SensorSource::SecondTarget, ..Default::default() }, true);
        tokens.poll(&ControlFeedback { perception, ..Default::default() }, Instant::now());
        assert!(token.success());
    }

    #[test]
    fn cancelled_run_issues_dead_tokens_and_no_speed() {
        let (planner, tokens, link, cancel) = planner();
        cancel.cancel();

        let token = planner.move_at_velocity(75.0);
        assert_eq!(token.state(), TokenState::Cancelled);
        assert!(link.calls().is_empty());
        assert_eq!(tokens.live_count(), 0);
    }

    #[test]
    fn disarmed_mission_gets_no_speed() {
        let link = Arc::new(RecordingLink::new());
        let handles = armed_handles(link.clone());
        let planner = MotionPlanner::new(&handles, CancelToken::new());

        handles.mission.disarm();
        let token = planner.move_at_velocity(40.0);
        planner.halt();

        assert!(token.is_live());
        assert!(link.calls().is_empty());
    }

    #[test]
    fn halt_commands_zero_speed() {
        let (planner, _, link, _) = planner();
        planner.move_at_velocity(40.0).cancel();
        planner.halt();
        assert_eq!(link.speeds(), vec![40.0, 0.0]);
    }

    #[test]
    fn rotate_search_ends_on_sighting_or_deadline() {
        let (planner, tokens, _, _) = planner();
        let start = Instant::now();
        let found = planner.rotate_search(SensorSource::FirstTarget, 90.0, (-45.0, 45.0), 5.0, Duration::from_secs(20));

        tokens.poll(&ControlFeedback::default(), start);
        assert!(found.is_live());

        let mut perception = PerceptionSnapshot::default();
        perception.record(TargetReport { source: SensorSource::FirstTarget, apparent_size: 0.01, ..Default::default() }, false);
        tokens.poll(&ControlFeedback { perception, ..Default::default() }, start);
        assert!(found.success());

        let lost = planner.rotate_search(SensorSource::SecondTarget, 90.0, (-45.0, 45.0), 5.0, Duration::from_secs(20));
        tokens.poll(&ControlFeedback::default(), start + Duration::from_secs(21));
        assert_eq!(lost.state(), TokenState::TimedOut);
    }

    #[test]
    fn search_and_face_share_the_heading_slot() {
        let (planner, _, _, _) = planner();
        let search = planner.rotate_search(SensorSource::FirstTarget, 0.0, (-45.0, 45.0), 5.0, Duration::from_secs(20));
        let face = planner.face_to(0.0, 5.0);
        assert_eq!(search.state(), TokenState::Cancelled);
        assert!(face.is_live());
    }
}
