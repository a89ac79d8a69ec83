//! External readiness sources.

use crate::handle::SchedulerHandle;

/// Reports ambient activity not yet reflected in explicit triggers.
///
/// Polled once at the start of every cycle. A monitor may also trigger actors
/// through the handle; those triggers join the cycle being run.
pub trait Monitor {
    /// Return `true` if outside activity happened since the last poll.
    fn poll(&mut self, handle: &SchedulerHandle) -> bool;
}

impl<F> Monitor for F
where
    F: FnMut(&SchedulerHandle) -> bool,
{
    fn poll(&mut self, handle: &SchedulerHandle) -> bool {
        self(handle)
    }
}

/// A monitor that never reports activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMonitor;

impl Monitor for NullMonitor {
    fn poll(&mut self, _handle: &SchedulerHandle) -> bool {
        false
    }
}
