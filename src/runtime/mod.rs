/**
 * Mission Control Runtime
 *
 * Wires the whole vehicle stack together:
 * 1. Topics for kill switch, pose, perception and control state
 * 2. Motion link (simulator or UART controller board)
 * 3. Fusion engine, kill switch ingest, token watcher and safety interlock,
 *    each on its own thread sharing one running flag
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::action::TokenRegistry;
use crate::config::{LinkKind, MissionConfig};
use crate::fusion::{
    AreaThresholdPolicy, ControlBroadcast, ControlHandles, ControlState, EngineTopics, FusionEngine, PoseEstimate,
    TargetReport, VoteRegistry,
};
use crate::interlock::{spawn_ingest, InterlockState, KillSwitch, KillWatcher, SafetyInterlock};
use crate::mission::{ActiveMission, MissionPlan};
use crate::motion::{LinkError, MotionLink, SerialLink, SimulatedVehicle};
use crate::pubsub::{
    Publisher, Subscriber, Topic, TopicRegistry, CONTROLS_TOPIC, KILL_SWITCH_TOPIC, POSE_TOPIC, TARGETS_TOPIC,
};

pub struct MissionControl {
    topics: Arc<TopicRegistry>,
    capacity: usize,
    handles: ControlHandles,
    interlock: Arc<SafetyInterlock>,
    broadcast: Arc<ControlBroadcast>,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl MissionControl {
    /// Open the motion link and start every thread. The mission itself
    /// waits for the kill switch.
    pub fn start(config: &MissionConfig, plan: Arc<dyn MissionPlan>) -> Result<Self, LinkError> {
        let running = Arc::new(AtomicBool::new(true));
        let capacity = config.topics.capacity;
        let topics = Arc::new(TopicRegistry::new());

        let kill: Arc<Topic<bool>> = topics.get_or_create(KILL_SWITCH_TOPIC, capacity);
        let pose: Arc<Topic<PoseEstimate>> = topics.get_or_create(POSE_TOPIC, capacity);
        let targets: Arc<Topic<TargetReport>> = topics.get_or_create(TARGETS_TOPIC, capacity);
        let controls: Arc<Topic<ControlState>> = topics.get_or_create(CONTROLS_TOPIC, capacity);

        let mut threads = Vec::new();
        let link: Arc<dyn MotionLink> = match config.link.kind {
            LinkKind::Sim => {
                log::info!("using simulated vehicle");
                let sim = Arc::new(SimulatedVehicle::new().with_pose_publisher(Publisher::new(Arc::clone(&pose))));
                threads.push(Arc::clone(&sim).start(config.control.period(), Arc::clone(&running)));
                sim
            }
            LinkKind::Serial => {
                let (serial, reader) = SerialLink::open(
                    &config.link.port,
                    config.link.baud,
                    config.link.reply_timeout(),
                    Publisher::new(Arc::clone(&kill)),
                    Publisher::new(Arc::clone(&pose)),
                    Arc::clone(&running),
                )?;
                threads.push(reader);
                Arc::new(serial)
            }
        };

        let handles = ControlHandles {
            votes: Arc::new(VoteRegistry::new()),
            tokens: Arc::new(TokenRegistry::new()),
            mission: Arc::new(ActiveMission::new()),
            link,
        };

        let engine = FusionEngine::new(
            config,
            handles.clone(),
            EngineTopics {
                pose: Subscriber::new(Arc::clone(&pose)),
                targets: Subscriber::new(targets),
                controls: Publisher::new(controls),
            },
            Box::new(AreaThresholdPolicy { min_size: config.mission.target_hit_size }),
        );
        let broadcast = engine.broadcast();
        threads.push(engine.start(Arc::clone(&running)));

        let switch = Arc::new(KillSwitch::new());
        threads.push(KillWatcher::new(Arc::clone(&switch), Arc::clone(&handles.tokens)).start(Arc::clone(&running)));

        let interlock = Arc::new(SafetyInterlock::new(
            Arc::clone(&switch),
            handles.clone(),
            pose,
            plan,
            config.mission.clone(),
            Arc::clone(&running),
        ));
        threads.push(Arc::clone(&interlock).start());

        // samples are only read once the interlock is listening for edges
        threads.push(spawn_ingest(switch, Subscriber::new(kill), Arc::clone(&running)));

        log::info!("mission control up, {} threads", threads.len());
        Ok(Self { topics, capacity, handles, interlock, broadcast, running, threads })
    }

    pub fn kill_switch_publisher(&self) -> Publisher<bool> {
        Publisher::new(self.topics.get_or_create(KILL_SWITCH_TOPIC, self.capacity))
    }

    pub fn target_publisher(&self) -> Publisher<TargetReport> {
        Publisher::new(self.topics.get_or_create(TARGETS_TOPIC, self.capacity))
    }

    pub fn control_state(&self) -> ControlState {
        self.broadcast.latest()
    }

    pub fn interlock_state(&self) -> InterlockState {
        self.interlock.state()
    }

    pub fn restarts(&self) -> u64 {
        self.interlock.restarts()
    }

    pub fn handles(&self) -> &ControlHandles {
        &self.handles
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop every thread and wait for them. Aborts a running mission.
    pub fn shutdown(self) {
        log::info!("shutting down mission control");
        self.interlock.shutdown();
        self.running.store(false, Ordering::SeqCst);
        for handle in self.threads {
            if handle.join().is_err() {
                log::error!("a mission control thread panicked");
            }
        }
        log::info!("shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::SensorSource;
    use crate::mission::{CompetitionMission, Phase};
    use crate::test_support::wait_until;
    use std::time::Duration;

    fn bench_config() -> MissionConfig {
        let mut config = MissionConfig::default();
        config.control.period_ms = 2;
        config.mission.settle_delay_s = 0.0;
        config.mission.gate_depth = 2.0;
        config.mission.dive_error_threshold = 0.5;
        config.mission.gate_time_s = 0.05;
        config.mission.token_poll_ms = 5;
        config.mission.search_timeout_s = 0.5;
        config.mission.realign_timeout_s = 0.1;
        config.mission.creep_time_s = 0.05;
        config.mission.ram_time_s = 0.05;
        config
    }

    fn phase(control: &MissionControl) -> Option<Phase> {
        control.handles().mission.context().map(|ctx| ctx.lock().phase())
    }

    #[test]
    fn simulated_run_through_kill_cycle() {
        let control = MissionControl::start(&bench_config(), Arc::new(CompetitionMission)).unwrap();
        let kill = control.kill_switch_publisher();
        let targets = control.target_publisher();

        kill.publish(false);
        kill.publish(true);

        assert!(wait_until(Duration::from_secs(10), || phase(&control) == Some(Phase::ApproachFirstTarget)));
        assert_eq!(control.interlock_state(), InterlockState::MissionActive);
        assert!(control.control_state().desired.depth.is_some());

        // perception keeps reporting until the hit lands on the find token
        let sighting = TargetReport { source: SensorSource::FirstTarget, bearing: 20.0, apparent_size: 0.5, depth: None };
        assert!(wait_until(Duration::from_secs(5), || {
            targets.publish(sighting);
            phase(&control) == Some(Phase::ApproachSecondTarget)
        }));

        kill.publish(false);
        assert!(wait_until(Duration::from_secs(5), || control.interlock_state() == InterlockState::WaitingForEnable));
        assert_eq!(control.restarts(), 1);
        assert_eq!(control.handles().tokens.live_count(), 0);
        assert!(control.is_running());

        control.shutdown();
    }
}
