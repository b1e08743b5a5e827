use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::fusion::SensorSource;
use super::feedback::ControlFeedback;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Issued,
    Running,
    Succeeded,
    Cancelled,
    TimedOut,
}

impl TokenState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TokenState::Succeeded | TokenState::Cancelled | TokenState::TimedOut)
    }
}

/// Only one live token may occupy a slot at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandSlot {
    Depth,
    Heading,
    Velocity,
    FindTarget,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandSpec {
    DiveTo { depth: f32 },
    FaceTo { heading: f32 },
    MoveAtVelocity { speed: f32 },
    FindTarget { source: SensorSource },
    /// Scan `center + min ..= center + max` in `step` degree increments until
    /// `source` is seen.
    RotateSearch { source: SensorSource, center: f32, min: f32, max: f32, step: f32 },
}

impl CommandSpec {
    pub fn slot(&self) -> CommandSlot {
        match self {
            CommandSpec::DiveTo { .. } => CommandSlot::Depth,
            CommandSpec::FaceTo { .. } | CommandSpec::RotateSearch { .. } => CommandSlot::Heading,
            CommandSpec::MoveAtVelocity { .. } => CommandSlot::Velocity,
            CommandSpec::FindTarget { .. } => CommandSlot::FindTarget,
        }
    }
}

/// Completion test, evaluated once per control cycle.
pub type Predicate = Box<dyn Fn(&ControlFeedback) -> bool + Send + Sync>;

struct TokenInner {
    id: u64,
    spec: CommandSpec,
    state: Mutex<TokenState>,
    changed: Condvar,
    predicate: Option<Predicate>,
    deadline: Option<Instant>,
}

/// Handle to one issued command. Clones share state.
#[derive(Clone)]
pub struct ActionToken {
    inner: Arc<TokenInner>,
}

impl ActionToken {
    pub(crate) fn new(id: u64, spec: CommandSpec, predicate: Option<Predicate>, timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                id,
                spec,
                state: Mutex::new(TokenState::Issued),
                changed: Condvar::new(),
                predicate,
                deadline: timeout.map(|t| Instant::now() + t),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn spec(&self) -> CommandSpec {
        self.inner.spec
    }

    pub fn state(&self) -> TokenState {
        *self.inner.state.lock()
    }

    pub fn success(&self) -> bool {
        self.state() == TokenState::Succeeded
    }

    pub fn is_live(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Block until the token finishes or `timeout` elapses. Returns whether
    /// it succeeded. A timed out wait leaves the token running.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.is_terminal() {
            if self.inner.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        *state == TokenState::Succeeded
    }

    /// Idempotent; wakes every waiter.
    pub fn cancel(&self) {
        if self.finish(TokenState::Cancelled) {
            log::debug!("token {} ({:?}) cancelled", self.inner.id, self.inner.spec);
        }
    }

    pub(crate) fn start(&self) {
        let mut state = self.inner.state.lock();
        if *state == TokenState::Issued {
            *state = TokenState::Running;
            self.inner.changed.notify_all();
        }
    }

    /// Evaluate completion against this cycle's feedback. Returns the new
    /// state if the token finished.
    pub(crate) fn poll(&self, feedback: &ControlFeedback, now: Instant) -> Option<TokenState> {
        if !self.is_live() {
            return None;
        }

        if let Some(predicate) = &self.inner.predicate {
            if predicate(feedback) && self.finish(TokenState::Succeeded) {
                return Some(TokenState::Succeeded);
            }
        }

        match self.inner.deadline {
            Some(deadline) if now >= deadline && self.finish(TokenState::TimedOut) => {
                Some(TokenState::TimedOut)
            }
            _ => None,
        }
    }

    fn finish(&self, terminal: TokenState) -> bool {
        let mut state = self.inner.state.lock();
        if state.is_terminal() {
            return false;
        }
        *state = terminal;
        self.inner.changed.notify_all();
        true
    }

    pub(crate) fn downgrade(&self) -> WeakToken {
        WeakToken(Arc::downgrade(&self.inner))
    }
}

impl fmt::Debug for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionToken")
            .field("id", &self.inner.id)
            .field("spec", &self.inner.spec)
            .field("state", &self.state())
            .finish()
    }
}

#[derive(Clone)]
pub(crate) struct WeakToken(Weak<TokenInner>);

impl WeakToken {
    pub(crate) fn upgrade(&self) -> Option<ActionToken> {
        self.0.upgrade().map(|inner| ActionToken { inner })
    }

    pub(crate) fn is_live(&self) -> bool {
        self.upgrade().map_or(false, |token| token.is_live())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn running(spec: CommandSpec, predicate: Option<Predicate>, timeout: Option<Duration>) -> ActionToken {
        let token = ActionToken::new(1, spec, predicate, timeout);
        token.start();
        token
    }

    #[test]
    fn starts_issued_then_running() {
        let token = ActionToken::new(7, CommandSpec::DiveTo { depth: 1.0 }, None, None);
        assert_eq!(token.state(), TokenState::Issued);
        token.start();
        assert_eq!(token.state(), TokenState::Running);
        assert!(token.is_live());
        assert_eq!(token.spec().slot(), CommandSlot::Depth);
    }

    #[test]
    fn cancel_is_idempotent_and_terminal() {
        let token = running(CommandSpec::MoveAtVelocity { speed: 1.0 }, None, None);
        token.cancel();
        token.cancel();
        assert_eq!(token.state(), TokenState::Cancelled);
        assert!(!token.success());
    }

    #[test]
    fn cancel_after_success_is_noop() {
        let token = running(CommandSpec::FaceTo { heading: 0.0 }, Some(Box::new(|_| true)), None);
        assert_eq!(token.poll(&ControlFeedback::default(), Instant::now()), Some(TokenState::Succeeded));
        token.cancel();
        assert_eq!(token.state(), TokenState::Succeeded);
        assert!(token.success());
    }

    #[test]
    fn wait_times_out_without_cancelling() {
        let token = running(CommandSpec::DiveTo { depth: 2.0 }, None, None);
        assert!(!token.wait(Duration::from_millis(20)));
        assert_eq!(token.state(), TokenState::Running);
    }

    #[test]
    fn cancel_unblocks_waiter() {
        let token = running(CommandSpec::DiveTo { depth: 2.0 }, None, None);
        let waiter = {
            let token = token.clone();
            thread::spawn(move || {
                let started = Instant::now();
                let ok = token.wait(Duration::from_secs(10));
                (ok, started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        token.cancel();

        let (ok, waited) = waiter.join().unwrap();
        assert!(!ok);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn predicate_completes_and_wakes_waiter() {
        let token = running(
            CommandSpec::DiveTo { depth: 2.0 },
            Some(Box::new(|fb: &ControlFeedback| fb.depth_error.abs() <= 1.0)),
            None,
        );
        let waiter = {
            let token = token.clone();
            thread::spawn(move || token.wait(Duration::from_secs(10)))
        };

        let far = ControlFeedback { depth_error: 5.0, ..Default::default() };
        assert_eq!(token.poll(&far, Instant::now()), None);

        let near = ControlFeedback { depth_error: 0.5, ..Default::default() };
        assert_eq!(token.poll(&near, Instant::now()), Some(TokenState::Succeeded));
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn command_deadline_times_out_token() {
        let token = running(CommandSpec::FaceTo { heading: 90.0 }, None, Some(Duration::from_millis(10)));
        let later = Instant::now() + Duration::from_millis(50);
        assert_eq!(token.poll(&ControlFeedback::default(), later), Some(TokenState::TimedOut));
        assert!(!token.wait(Duration::from_millis(1)));
    }

    #[test]
    fn weak_handle_does_not_keep_token_alive() {
        let token = running(CommandSpec::MoveAtVelocity { speed: 1.0 }, None, None);
        let weak = token.downgrade();
        assert!(weak.is_live());
        drop(token);
        assert!(weak.upgrade().is_none());
        assert!(!weak.is_live());
    }
}
