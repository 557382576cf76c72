//! The narrow handle the Board and Planner use to wake the Scheduler,
//! breaking the Board<->Scheduler cyclic reference (§9 design note):
//! the Scheduler owns a `Board`, and the Board holds only this trigger
//! handle rather than a reference back to the Scheduler.

/// A coalescing wake-up signal. `trigger()` must never block; multiple
/// triggers before the Scheduler wakes collapse into a single cycle.
pub trait SchedulerHandle: Send + Sync {
    fn trigger(&self);
}

/// A handle that drops every trigger -- useful for tests and for any
/// direct Store/Board usage that never runs a scheduler loop.
pub struct NoopSchedulerHandle;

impl SchedulerHandle for NoopSchedulerHandle {
    fn trigger(&self) {}
}
