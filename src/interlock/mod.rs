/**
 * Safety Interlock
 *
 * Owns the mission lifecycle and is the only component allowed to start or
 * stop it:
 * 1. WAITING_FOR_ENABLE until the kill switch goes false -> true
 * 2. MISSION_ACTIVE: a fresh mission run on its own thread, actuation armed
 * 3. On true -> false: disarm, cancel the run and every token, zero speed,
 *    and go back to waiting
 */

pub mod kill_switch;

pub use kill_switch::{spawn_ingest, KillEdge, KillSwitch, KillWatcher};

use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crate::action::{MotionPlanner, TokenState};
use crate::config::MissionParams;
use crate::fusion::{ControlHandles, PoseEstimate};
use crate::mission::{CancelToken, MissionContext, MissionError, MissionPlan, MissionRun, SharedContext};
use crate::pubsub::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterlockState {
    WaitingForEnable,
    MissionActive,
}

pub struct SafetyInterlock {
    switch: Arc<KillSwitch>,
    handles: ControlHandles,
    pose: Arc<Topic<PoseEstimate>>,
    plan: Arc<dyn MissionPlan>,
    params: MissionParams,
    running: Arc<AtomicBool>,
    state: Mutex<InterlockState>,
    restarts: AtomicU64,
    current: Mutex<Option<CancelToken>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SafetyInterlock {
    pub fn new(
        switch: Arc<KillSwitch>,
        handles: ControlHandles,
        pose: Arc<Topic<PoseEstimate>>,
        plan: Arc<dyn MissionPlan>,
        params: MissionParams,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            switch,
            handles,
            pose,
            plan,
            params,
            running,
            state: Mutex::new(InterlockState::WaitingForEnable),
            restarts: AtomicU64::new(0),
            current: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> InterlockState {
        *self.state.lock()
    }

    /// Completed disable cycles.
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::SeqCst)
    }

    /// Blocking. Reacts to edges raised after the call.
    pub fn run(&self) {
        self.run_from(self.switch.generation());
    }

    /// Start in background thread. Reacts to edges raised after the call.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let seen = self.switch.generation();
        thread::spawn(move || self.run_from(seen))
    }

    /// Stop the loop. A running mission is aborted on the way out.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.switch.wake_all();
    }

    fn run_from(&self, mut seen: u64) {
        log::info!("Welcome to mission control");
        log::info!("Waiting for killswitch enable");

        while let Some((generation, edge)) = self.switch.wait_edge(seen, &self.running) {
            seen = generation;
            match (self.state(), edge) {
                (InterlockState::WaitingForEnable, KillEdge::Enabled) => self.launch(),
                (InterlockState::WaitingForEnable, KillEdge::Disabled) => {
                    log::debug!("enable edge already reversed, staying disabled");
                }
                (InterlockState::MissionActive, latest) => {
                    self.abort();
                    // the switch came back on before we got here
                    if latest == KillEdge::Enabled {
                        self.launch();
                    } else {
                        log::info!("Waiting for killswitch enable");
                    }
                }
            }
        }

        if self.state() == InterlockState::MissionActive {
            self.abort();
        }
        for task in self.tasks.lock().drain(..) {
            if task.join().is_err() {
                log::error!("mission plan thread did not exit cleanly");
            }
        }
        log::info!("mission control stopped after {} restarts", self.restarts());
    }

    fn launch(&self) {
        log::info!("Killswitch enabled. Launching mission plan thread...");

        let context: SharedContext = Arc::new(Mutex::new(MissionContext::new(&self.params)));
        let cancel = CancelToken::new();
        let planner = MotionPlanner::new(&self.handles, cancel.clone());
        let run = MissionRun::new(
            Arc::clone(&context),
            Arc::clone(&self.handles.votes),
            planner,
            cancel.clone(),
            self.params.clone(),
            Arc::clone(&self.pose),
        );

        self.handles.mission.arm(context);
        *self.current.lock() = Some(cancel);

        let plan = Arc::clone(&self.plan);
        let handles = self.handles.clone();
        let spawned = thread::Builder::new()
            .name("mission-plan".into())
            .spawn(move || run_mission(plan.as_ref(), run, &handles));

        match spawned {
            Ok(task) => self.tasks.lock().push(task),
            Err(e) => {
                log::error!("failed to spawn mission plan thread: {}", e);
                self.handles.mission.disarm();
                self.handles.link.set_speed(0.0);
            }
        }
        self.set_state(InterlockState::MissionActive);
    }

    fn abort(&self) {
        log::info!("Killswitch disabled. Cancelling all active action tokens...");

        // stop actuation and refuse new tokens before sweeping the old ones;
        // disarm waits out a cycle that is mid-emission, so the zero speed
        // below is the last command sent
        self.handles.mission.disarm();
        if let Some(cancel) = self.current.lock().take() {
            cancel.cancel();
        }
        let cancelled = self.handles.tokens.cancel_all();
        self.handles.tokens.clear();
        self.handles.link.set_speed(0.0);

        let restarts = self.restarts.fetch_add(1, Ordering::SeqCst) + 1;
        self.tasks.lock().retain(|task| !task.is_finished());
        log::info!("Cancelled {} tokens. Restarting mission control loop (restart {})", cancelled, restarts);

        self.set_state(InterlockState::WaitingForEnable);
    }

    fn set_state(&self, next: InterlockState) {
        let mut state = self.state.lock();
        if *state != next {
            log::debug!("interlock {:?} -> {:?}", *state, next);
            *state = next;
        }
    }
}

/// Body of the mission thread. Errors and panics stop here; the interlock
/// state is left alone.
fn run_mission(plan: &dyn MissionPlan, run: MissionRun, handles: &ControlHandles) {
    match panic::catch_unwind(AssertUnwindSafe(|| plan.run(&run))) {
        Ok(Ok(())) => log::info!("Mission plan finished"),
        Ok(Err(MissionError::Cancelled)) => log::info!("Mission plan cancelled"),
        Ok(Err(MissionError::TokenAborted { state: TokenState::Cancelled, .. })) if run.cancel.is_cancelled() => {
            log::info!("Mission plan cancelled")
        }
        Ok(Err(e)) => log::error!("Caught error [ {} ] while running mission plan", e),
        Err(payload) => log::error!("Mission plan panicked: {}", panic_message(payload.as_ref())),
    }

    // still published means the kill switch is on and nothing steers anymore
    if handles.mission.release(&run.context) {
        log::info!("Mission plan exited while enabled, holding until the next kill switch cycle");
        run.context.lock().speed_enabled = false;
        handles.votes.reset_weights();
        handles.mission.actuate(|| handles.link.set_speed(0.0));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
