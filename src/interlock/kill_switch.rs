use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::action::TokenRegistry;
use crate::pubsub::Subscriber;

/// Waiters re-check the running flag this often.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);
const INGEST_PERIOD: Duration = Duration::from_millis(5);
/// Silence longer than this gets reported; the last value is still held.
const SIGNAL_LOSS_WARN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillEdge {
    /// false -> true
    Enabled,
    /// true -> false
    Disabled,
}

#[derive(Debug, Default)]
struct EdgeLog {
    generation: u64,
    latest: Option<KillEdge>,
    enabled: u64,
    disabled: u64,
}

impl EdgeLog {
    fn count(&self, edge: KillEdge) -> u64 {
        match edge {
            KillEdge::Enabled => self.enabled,
            KillEdge::Disabled => self.disabled,
        }
    }
}

/// Edge detector over the raw kill switch samples. Only transitions matter;
/// repeated samples and the first sample ever seen raise nothing.
#[derive(Default)]
pub struct KillSwitch {
    last: Mutex<Option<bool>>,
    edges: Mutex<EdgeLog>,
    changed: Condvar,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample. A sample arriving while another is being processed is
    /// dropped.
    pub fn ingest(&self, enabled: bool) -> Option<KillEdge> {
        let mut last = self.last.try_lock()?;
        let edge = match (last.replace(enabled), enabled) {
            (Some(false), true) => KillEdge::Enabled,
            (Some(true), false) => KillEdge::Disabled,
            _ => return None,
        };

        let mut edges = self.edges.lock();
        edges.generation += 1;
        edges.latest = Some(edge);
        match edge {
            KillEdge::Enabled => edges.enabled += 1,
            KillEdge::Disabled => edges.disabled += 1,
        }
        log::debug!("kill switch edge {:?} (generation {})", edge, edges.generation);
        self.changed.notify_all();
        Some(edge)
    }

    pub fn last_sample(&self) -> Option<bool> {
        *self.last.lock()
    }

    pub fn generation(&self) -> u64 {
        self.edges.lock().generation
    }

    pub fn edge_count(&self, edge: KillEdge) -> u64 {
        self.edges.lock().count(edge)
    }

    /// Block until an edge newer than generation `seen` exists. Returns the
    /// current generation and the most recent edge; several edges since
    /// `seen` collapse into the latest one. `None` once `running` clears.
    pub fn wait_edge(&self, seen: u64, running: &AtomicBool) -> Option<(u64, KillEdge)> {
        let mut edges = self.edges.lock();
        loop {
            if edges.generation > seen {
                if let Some(latest) = edges.latest {
                    return Some((edges.generation, latest));
                }
            }
            if !running.load(Ordering::SeqCst) {
                return None;
            }
            self.changed.wait_for(&mut edges, SHUTDOWN_POLL);
        }
    }

    /// Block until more than `seen` edges of kind `edge` have been observed.
    /// Returns the new count, or `None` once `running` clears.
    pub fn wait_for(&self, edge: KillEdge, seen: u64, running: &AtomicBool) -> Option<u64> {
        let mut edges = self.edges.lock();
        loop {
            let count = edges.count(edge);
            if count > seen {
                return Some(count);
            }
            if !running.load(Ordering::SeqCst) {
                return None;
            }
            self.changed.wait_for(&mut edges, SHUTDOWN_POLL);
        }
    }

    /// Wake every waiter so it re-checks its running flag.
    pub fn wake_all(&self) {
        let _edges = self.edges.lock();
        self.changed.notify_all();
    }
}

/// Feeds kill switch samples from the topic into the edge detector.
pub fn spawn_ingest(switch: Arc<KillSwitch>, samples: Subscriber<bool>, running: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut last_sample = Instant::now();
        let mut silent = false;

        while running.load(Ordering::SeqCst) {
            let batch = samples.drain();
            if batch.is_empty() {
                if !silent && last_sample.elapsed() > SIGNAL_LOSS_WARN {
                    log::warn!(
                        "no kill switch sample for {:?}, holding last value {:?}",
                        last_sample.elapsed(),
                        switch.last_sample()
                    );
                    silent = true;
                }
            } else {
                if silent {
                    log::info!("kill switch signal back");
                    silent = false;
                }
                last_sample = Instant::now();
                for enabled in batch {
                    switch.ingest(enabled);
                }
            }
            thread::sleep(INGEST_PERIOD);
        }
    })
}

/// Cancels every live token on each disabled edge, independent of the
/// interlock loop.
pub struct KillWatcher {
    switch: Arc<KillSwitch>,
    tokens: Arc<TokenRegistry>,
}

impl KillWatcher {
    pub fn new(switch: Arc<KillSwitch>, tokens: Arc<TokenRegistry>) -> Self {
        Self { switch, tokens }
    }

    fn watch(&self, mut seen: u64, running: &AtomicBool) {
        while let Some(count) = self.switch.wait_for(KillEdge::Disabled, seen, running) {
            seen = count;
            let cancelled = self.tokens.cancel_all();
            log::info!("kill switch disabled, watcher cancelled {} tokens", cancelled);
        }
    }

    /// Edges raised after this call are acted on.
    pub fn start(self, running: Arc<AtomicBool>) -> JoinHandle<()> {
        let seen = self.switch.edge_count(KillEdge::Disabled);
        thread::spawn(move || self.watch(seen, &running))
    }
}
