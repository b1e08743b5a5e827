/**
 * Action Tokens
 *
 * Every motion command the mission issues comes back as a token:
 * 1. The registry tracks live tokens weakly and enforces one per slot
 * 2. The control cycle polls completion predicates and deadlines
 * 3. The interlock cancels the lot when the kill switch drops
 */

pub mod feedback;
pub mod planner;
pub mod registry;
pub mod token;

pub use feedback::ControlFeedback;
pub use planner::MotionPlanner;
pub use registry::TokenRegistry;
pub use token::{ActionToken, CommandSlot, CommandSpec, Predicate, TokenState};
