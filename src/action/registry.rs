use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::feedback::ControlFeedback;
use super::token::{ActionToken, CommandSlot, CommandSpec, Predicate, TokenState, WeakToken};

/// Issues tokens and keeps weak references to the live ones so they can be
/// cancelled en masse. Never waits on a token itself.
pub struct TokenRegistry {
    next_id: AtomicU64,
    live: Mutex<Vec<WeakToken>>,
    slots: Mutex<HashMap<CommandSlot, WeakToken>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            live: Mutex::new(Vec::new()),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a token into its command slot. A live token already holding the
    /// slot is cancelled before the new one starts running.
    pub fn issue(&self, spec: CommandSpec, predicate: Option<Predicate>, timeout: Option<Duration>) -> ActionToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = ActionToken::new(id, spec, predicate, timeout);

        let previous = self.slots.lock().insert(spec.slot(), token.downgrade());
        if let Some(previous) = previous.and_then(|weak| weak.upgrade()) {
            if previous.is_live() {
                log::debug!("token {} replaces token {} in {:?} slot", id, previous.id(), spec.slot());
                previous.cancel();
            }
        }

        {
            let mut live = self.live.lock();
            live.retain(WeakToken::is_live);
            live.push(token.downgrade());
        }

        token.start();
        token
    }

    /// Cancel every live token. Returns how many were still live.
    pub fn cancel_all(&self) -> usize {
        let tokens = self.live_tokens();
        for token in &tokens {
            token.cancel();
        }
        tokens.len()
    }

    pub fn clear(&self) {
        self.live.lock().clear();
        self.slots.lock().clear();
    }

    pub fn live_tokens(&self) -> Vec<ActionToken> {
        self.live
            .lock()
            .iter()
            .filter_map(WeakToken::upgrade)
            .filter(ActionToken::is_live)
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.live_tokens().len()
    }

    /// The live token currently holding `slot`, if any.
    pub fn occupant(&self, slot: CommandSlot) -> Option<ActionToken> {
        self.slots
            .lock()
            .get(&slot)
            .and_then(WeakToken::upgrade)
            .filter(ActionToken::is_live)
    }

    /// Run completion predicates and deadlines against one cycle's feedback.
    pub fn poll(&self, feedback: &ControlFeedback, now: Instant) -> usize {
        let mut finished = 0;
        for token in self.live_tokens() {
            match token.poll(feedback, now) {
                Some(TokenState::Succeeded) => {
                    log::debug!("token {} ({:?}) succeeded", token.id(), token.spec());
                    finished += 1;
                }
                Some(state) => {
                    log::warn!("token {} ({:?}) finished as {:?}", token.id(), token.spec(), state);
                    finished += 1;
                }
                None => {}
            }
        }
        finished
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}
