//! Rollout generation: work distribution, async double-buffering and the
//! per-step coordinator.

mod coordinator;
mod queue;

pub use coordinator::RolloutCoordinator;
pub use queue::{AsyncRolloutQueue, DataCache};
