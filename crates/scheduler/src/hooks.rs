//! Optional instrumentation callbacks.

use std::panic::Location;
use std::time::Duration;

use tokenflow_actor::FiringError;

use crate::trigger::Targets;

/// A trigger request as seen by the scheduling thread.
#[derive(Debug, Clone, Copy)]
pub struct TriggerEvent<'a> {
    pub delay: Duration,
    pub targets: &'a Targets,
    pub origin: &'static Location<'static>,
}

/// The start of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStart {
    pub cycle: u64,
    pub all: bool,
}

type TriggerHook = Box<dyn FnMut(&TriggerEvent<'_>) + Send>;
type CycleHook = Box<dyn FnMut(&CycleStart) + Send>;
type FireErrorHook = Box<dyn FnMut(&FiringError) + Send>;

/// Callbacks invoked by the scheduler at fixed points of its state machine.
///
/// Hooks observe; they cannot change scheduling decisions.
#[derive(Default)]
pub struct SchedulerHooks {
    on_trigger: Option<TriggerHook>,
    on_cycle_start: Option<CycleHook>,
    on_fire_error: Option<FireErrorHook>,
}

impl SchedulerHooks {
    /// No hooks installed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for every trigger request, including dropped ones.
    #[must_use]
    pub fn on_trigger(mut self, hook: impl FnMut(&TriggerEvent<'_>) + Send + 'static) -> Self {
        self.on_trigger = Some(Box::new(hook));
        self
    }

    /// Called before the monitor is polled for a cycle.
    #[must_use]
    pub fn on_cycle_start(mut self, hook: impl FnMut(&CycleStart) + Send + 'static) -> Self {
        self.on_cycle_start = Some(Box::new(hook));
        self
    }

    /// Called for each actor whose firing failed.
    #[must_use]
    pub fn on_fire_error(mut self, hook: impl FnMut(&FiringError) + Send + 'static) -> Self {
        self.on_fire_error = Some(Box::new(hook));
        self
    }

    pub(crate) fn trigger(&mut self, event: &TriggerEvent<'_>) {
        if let Some(hook) = self.on_trigger.as_mut() {
            hook(event);
        }
    }

    pub(crate) fn cycle_start(&mut self, start: &CycleStart) {
        if let Some(hook) = self.on_cycle_start.as_mut() {
            hook(start);
        }
    }

    pub(crate) fn fire_error(&mut self, error: &FiringError) {
        if let Some(hook) = self.on_fire_error.as_mut() {
            hook(error);
        }
    }
}

impl std::fmt::Debug for SchedulerHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHooks")
            .field("on_trigger", &self.on_trigger.is_some())
            .field("on_cycle_start", &self.on_cycle_start.is_some())
            .field("on_fire_error", &self.on_fire_error.is_some())
            .finish()
    }
}
