//! The firing-cycle scheduler.
//!
//! # State machine
//!
//! The scheduler is **Idle** when no cycle timer is pending and **Active**
//! otherwise. A cycle polls the monitor, fires enabled actors, folds their
//! results, and then either re-arms an immediate cycle (something fired, or
//! the monitor saw activity) or arms a single heartbeat timer whose expiry
//! requests a full sweep.
//!
//! Trigger requests coalesce: actor-scoped triggers union into one pending set
//! and share a single immediate cycle. At most one immediate cycle and one
//! heartbeat are outstanding at any time. Delayed full sweeps are independent
//! of both.
//!
//! All state is owned by the scheduling thread. Other threads reach it through
//! a [`SchedulerHandle`].

use std::backtrace::Backtrace;
use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, Location, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokenflow_actor::{
    ActionResult, ActorError, ActorId, ActorManager, FiringError, panic_message,
};
use tokenflow_core::{Error, Result};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::handle::{Command, SchedulerHandle};
use crate::hooks::{CycleStart, SchedulerHooks, TriggerEvent};
use crate::monitor::{Monitor, NullMonitor};
use crate::timers::{TimerId, TimerQueue};
use crate::trigger::Targets;

/// What a timer does when it expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wakeup {
    Cycle { all: bool },
    Heartbeat,
    Halt,
}

/// Externally visible scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No cycle is scheduled; at most a heartbeat is armed.
    Idle,
    /// A cycle is scheduled.
    Active,
    /// `stop()` was called.
    Stopped,
}

/// What a cycle scheduled next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextCycle {
    /// Progress was made; another cycle runs as soon as possible.
    Immediate,
    /// Nothing happened; a heartbeat was armed.
    Heartbeat,
    /// The scheduler is stopping; nothing was scheduled.
    Stopped,
}

/// The outcome of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Cycle number, starting at 1.
    pub cycle: u64,
    /// Whether this was a full sweep.
    pub all: bool,
    /// The pending trigger set captured for this cycle.
    pub eligible: BTreeSet<ActorId>,
    /// Actors whose `fire()` was called, in firing order.
    pub touched: Vec<ActorId>,
    /// Actors whose firing failed.
    pub failed: Vec<ActorId>,
    /// Whether the monitor reported ambient activity.
    pub monitor_activity: bool,
    /// Merged results of every successful firing.
    pub result: ActionResult,
    /// The follow-up decision.
    pub next: NextCycle,
}

impl CycleReport {
    /// Whether the cycle counted as activity.
    #[must_use]
    pub const fn made_progress(&self) -> bool {
        self.result.did_fire() || self.monitor_activity
    }
}

/// What one call to [`Scheduler::step`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// No timer was due.
    Nothing,
    /// A cycle ran.
    Cycle(CycleReport),
    /// The heartbeat expired and requested a full sweep.
    Heartbeat,
    /// The scheduler has halted.
    Halted,
}

/// Counters accumulated over the scheduler's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub full_sweeps: u64,
    pub firing_cycles: u64,
    pub fire_errors: u64,
    pub heartbeats_armed: u64,
    pub heartbeats_expired: u64,
    pub triggers_dropped: u64,
}

#[derive(Default)]
struct Firing {
    total: ActionResult,
    touched: Vec<ActorId>,
    failed: Vec<ActorId>,
}

/// Drives actors through firing cycles.
pub struct Scheduler {
    config: SchedulerConfig,
    actors: ActorManager,
    monitor: Box<dyn Monitor + Send>,
    clock: Arc<dyn Clock>,
    hooks: SchedulerHooks,
    timers: TimerQueue<Wakeup>,
    pending: BTreeSet<ActorId>,
    unaddressed_pending: bool,
    immediate: Option<TimerId>,
    immediate_sweep: bool,
    heartbeat: Option<TimerId>,
    done: bool,
    halted: bool,
    cycle: u64,
    stats: SchedulerStats,
    handle: SchedulerHandle,
    commands: UnboundedReceiver<Command>,
}

impl Scheduler {
    /// Create an idle scheduler over a set of actors.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the configuration does not validate.
    pub fn new(actors: ActorManager, config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let (handle, commands) = SchedulerHandle::channel();
        Ok(Self {
            config,
            actors,
            monitor: Box::new(NullMonitor),
            clock: Arc::new(SystemClock),
            hooks: SchedulerHooks::default(),
            timers: TimerQueue::new(),
            pending: BTreeSet::new(),
            unaddressed_pending: false,
            immediate: None,
            immediate_sweep: false,
            heartbeat: None,
            done: false,
            halted: false,
            cycle: 0,
            stats: SchedulerStats::default(),
            handle,
            commands,
        })
    }

    /// Use a monitor polled at the start of every cycle.
    #[must_use]
    pub fn with_monitor(mut self, monitor: impl Monitor + Send + 'static) -> Self {
        self.monitor = Box::new(monitor);
        self
    }

    /// Use a different time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Install instrumentation hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: SchedulerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// A handle for triggering from other threads.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[must_use]
    pub const fn actors(&self) -> &ActorManager {
        &self.actors
    }

    /// Mutable access to the actor registry, for wiring and feeding inputs.
    ///
    /// Changes are only observed by cycles; callers trigger the actors they
    /// touched.
    pub fn actors_mut(&mut self) -> &mut ActorManager {
        &mut self.actors
    }

    #[must_use]
    pub const fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        if self.done || self.halted {
            Phase::Stopped
        } else if self.scheduled_cycles() > 0 {
            Phase::Active
        } else {
            Phase::Idle
        }
    }

    /// Number of cycle timers waiting to run, immediate and delayed.
    #[must_use]
    pub fn scheduled_cycles(&self) -> usize {
        self.timers
            .payloads()
            .filter(|wakeup| matches!(wakeup, Wakeup::Cycle { .. }))
            .count()
    }

    /// Whether an immediate cycle is outstanding.
    #[must_use]
    pub fn has_immediate_cycle(&self) -> bool {
        self.immediate.is_some_and(|id| self.timers.is_pending(id))
    }

    /// Whether a heartbeat is armed.
    #[must_use]
    pub fn is_heartbeat_armed(&self) -> bool {
        self.heartbeat.is_some_and(|id| self.timers.is_pending(id))
    }

    /// Actors waiting for the next non-sweep cycle.
    #[must_use]
    pub const fn pending_triggers(&self) -> &BTreeSet<ActorId> {
        &self.pending
    }

    /// Whether `stop()` has been called.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.done
    }

    /// Request a future cycle.
    ///
    /// - `delay > 0`: an independent full sweep after `delay`.
    /// - `delay == 0`, [`Targets::All`]: a full sweep as soon as possible,
    ///   replacing any outstanding immediate cycle.
    /// - `delay == 0`, [`Targets::Actors`]: union into the pending set and
    ///   schedule an immediate cycle unless one is outstanding. While the
    ///   pending set holds nothing but the "no actor" marker, requests are
    ///   dropped. An empty set still schedules a cycle.
    ///
    /// Ignored after `stop()`.
    #[track_caller]
    pub fn trigger(&mut self, delay: Duration, targets: Targets) {
        self.apply_trigger(delay, targets, Location::caller());
    }

    /// Mark the scheduler terminated and halt once already-due work drains.
    ///
    /// Idempotent.
    pub fn stop(&mut self) {
        if !self.done {
            info!("Scheduler stopping");
            self.timers
                .schedule_after(self.clock.now(), Duration::ZERO, Wakeup::Halt);
        }
        self.done = true;
    }

    /// Run the pre-migration hook and exclude the actor from cycles.
    ///
    /// # Errors
    ///
    /// Returns the registry's error.
    pub fn begin_migration(&mut self, id: &ActorId) -> std::result::Result<(), ActorError> {
        self.actors.begin_migration(id)
    }

    /// Re-enable a migrated actor and trigger it.
    ///
    /// # Errors
    ///
    /// Returns the registry's error; the actor is not triggered then.
    #[track_caller]
    pub fn complete_migration(&mut self, id: &ActorId) -> std::result::Result<(), ActorError> {
        self.actors.complete_migration(id)?;
        self.apply_trigger(
            Duration::ZERO,
            Targets::from(id.clone()),
            Location::caller(),
        );
        Ok(())
    }

    /// Process hand-off commands, then at most one due timer.
    pub fn step(&mut self) -> Step {
        self.drain_commands();
        if self.halted {
            return Step::Halted;
        }

        let Some((_, wakeup)) = self.timers.pop_due(self.clock.now()) else {
            return Step::Nothing;
        };

        match wakeup {
            Wakeup::Cycle { all } => Step::Cycle(self.loop_once(all)),
            Wakeup::Heartbeat => {
                self.heartbeat = None;
                self.stats.heartbeats_expired = self.stats.heartbeats_expired.saturating_add(1);
                debug!("Heartbeat expired");
                self.apply_trigger(Duration::ZERO, Targets::All, Location::caller());
                Step::Heartbeat
            }
            Wakeup::Halt => {
                self.halted = true;
                info!("Scheduler halted");
                Step::Halted
            }
        }
    }

    /// Process due timers, up to `max_cycles_per_turn`, returning the cycles run.
    pub fn run_due(&mut self) -> Vec<CycleReport> {
        let mut reports = Vec::new();
        for _ in 0..self.config.max_cycles_per_turn {
            match self.step() {
                Step::Nothing | Step::Halted => break,
                Step::Heartbeat => {}
                Step::Cycle(report) => reports.push(report),
            }
        }
        reports
    }

    /// Run exactly one cycle.
    pub fn loop_once(&mut self, all: bool) -> CycleReport {
        self.cycle = self.cycle.saturating_add(1);
        let cycle = self.cycle;
        self.stats.cycles = self.stats.cycles.saturating_add(1);
        if all {
            self.stats.full_sweeps = self.stats.full_sweeps.saturating_add(1);
        }
        self.hooks.cycle_start(&CycleStart { cycle, all });

        let monitor_activity = self.monitor.poll(&self.handle);
        // Triggers raised by the monitor join this cycle.
        self.drain_commands();

        let eligible = std::mem::take(&mut self.pending);
        self.unaddressed_pending = false;
        match self.immediate {
            Some(id) if !self.timers.is_pending(id) => self.immediate = None,
            // A scoped cycle has nothing left to serve once the set is taken.
            Some(id) if !self.immediate_sweep => {
                self.timers.cancel(id);
                self.immediate = None;
            }
            _ => {}
        }

        let only = (!all && self.config.restrict_to_triggered).then_some(&eligible);
        let firing = self.fire_actors(only);
        if firing.total.did_fire() {
            self.stats.firing_cycles = self.stats.firing_cycles.saturating_add(1);
        }

        let next = if self.done {
            NextCycle::Stopped
        } else if firing.total.did_fire() {
            self.cancel_heartbeat();
            self.pending.extend(firing.total.affected().iter().cloned());
            self.schedule_immediate(false);
            NextCycle::Immediate
        } else if monitor_activity {
            self.cancel_heartbeat();
            self.schedule_immediate(true);
            NextCycle::Immediate
        } else {
            self.arm_heartbeat();
            NextCycle::Heartbeat
        };

        debug!(
            cycle,
            all,
            eligible = eligible.len(),
            touched = firing.touched.len(),
            failed = firing.failed.len(),
            did_fire = firing.total.did_fire(),
            monitor_activity,
            next = ?next,
            "Cycle complete"
        );

        CycleReport {
            cycle,
            all,
            eligible,
            touched: firing.touched,
            failed: firing.failed,
            monitor_activity,
            result: firing.total,
            next,
        }
    }

    /// Block the calling thread, processing timers and commands until stopped.
    ///
    /// Starts with a full sweep when nothing is scheduled yet.
    ///
    /// # Errors
    ///
    /// Returns `Error::RuntimeStartFailed` when called from inside a tokio
    /// runtime (use [`Scheduler::run_async`] there) or when the runtime cannot
    /// be built, or the run loop's own error.
    pub fn run(&mut self) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::runtime_start_failed(
                "run() called from inside a tokio runtime; use run_async",
            ));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| Error::runtime_start_failed(e.to_string()))?;
        runtime.block_on(self.run_async())
    }

    /// Process timers and commands until stopped.
    ///
    /// Sleeps with tokio timers, so it expects a clock that follows real time.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvariantViolated` if the command channel closes while
    /// the scheduler still holds a sender.
    pub async fn run_async(&mut self) -> Result<()> {
        info!(heartbeat_ms = self.heartbeat_ms(), "Scheduler running");
        self.drain_commands();
        if !self.done && self.scheduled_cycles() == 0 {
            self.schedule_immediate(true);
        }

        loop {
            let mut processed = 0usize;
            while processed < self.config.max_cycles_per_turn {
                match self.step() {
                    Step::Nothing => break,
                    Step::Halted => return Ok(()),
                    Step::Cycle(_) | Step::Heartbeat => processed = processed.saturating_add(1),
                }
            }
            if processed > 0 {
                tokio::task::yield_now().await;
                continue;
            }

            let wait = self
                .timers
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(self.clock.now()));
            let received = match wait {
                Some(wait) => {
                    tokio::select! {
                        command = self.commands.recv() => Some(command),
                        () = tokio::time::sleep(wait) => None,
                    }
                }
                None => Some(self.commands.recv().await),
            };
            match received {
                Some(Some(command)) => self.apply(command),
                Some(None) => {
                    error!("Command channel closed while the scheduler owns a sender");
                    return Err(Error::invariant_violated("command channel closed"));
                }
                None => {}
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Trigger {
                delay,
                targets,
                origin,
            } => self.apply_trigger(delay, targets, origin),
            Command::Stop => self.stop(),
        }
    }

    fn apply_trigger(
        &mut self,
        delay: Duration,
        targets: Targets,
        origin: &'static Location<'static>,
    ) {
        self.hooks.trigger(&TriggerEvent {
            delay,
            targets: &targets,
            origin,
        });
        if self.config.trace_triggers {
            debug!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                targets = %targets,
                file = origin.file(),
                line = origin.line(),
                "Trigger requested"
            );
            trace!(backtrace = %Backtrace::capture(), "Trigger provenance");
        }

        if self.done {
            debug!(targets = %targets, "Ignoring trigger after stop");
            return;
        }

        if !delay.is_zero() {
            debug!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "Delayed sweep scheduled");
            self.timers
                .schedule_after(self.clock.now(), delay, Wakeup::Cycle { all: true });
            return;
        }

        match targets {
            Targets::All => self.schedule_immediate(true),
            Targets::Actors(ids) => {
                self.unaddressed_pending |= ids.contains(&None);
                self.pending.extend(ids.into_iter().flatten());
                if self.pending.is_empty() && self.unaddressed_pending {
                    self.stats.triggers_dropped = self.stats.triggers_dropped.saturating_add(1);
                    debug!("Ignoring trigger with no addressable actor");
                    return;
                }
                self.schedule_immediate(false);
            }
        }
    }

    /// Ensure an immediate cycle is outstanding.
    ///
    /// A full sweep replaces any outstanding immediate cycle; a scoped cycle
    /// reuses one.
    fn schedule_immediate(&mut self, all: bool) {
        if !all && self.has_immediate_cycle() {
            return;
        }
        if let Some(previous) = self.immediate.take() {
            self.timers.cancel(previous);
        }
        let id = self
            .timers
            .schedule_after(self.clock.now(), Duration::ZERO, Wakeup::Cycle { all });
        self.immediate = Some(id);
        self.immediate_sweep = all;
    }

    fn arm_heartbeat(&mut self) {
        self.cancel_heartbeat();
        let id = self.timers.schedule_after(
            self.clock.now(),
            self.config.heartbeat,
            Wakeup::Heartbeat,
        );
        self.heartbeat = Some(id);
        self.stats.heartbeats_armed = self.stats.heartbeats_armed.saturating_add(1);
    }

    fn cancel_heartbeat(&mut self) {
        if let Some(id) = self.heartbeat.take() {
            self.timers.cancel(id);
        }
    }

    fn fire_actors(&mut self, only: Option<&BTreeSet<ActorId>>) -> Firing {
        let mut firing = Firing::default();

        for id in self.actors.enabled_actors() {
            if only.is_some_and(|eligible| !eligible.contains(&id)) {
                trace!(actor_id = %id, "Not triggered, skipping");
                continue;
            }

            let actors = &mut self.actors;
            let outcome = catch_unwind(AssertUnwindSafe(|| actors.fire_actor(&id)))
                .unwrap_or_else(|payload| {
                    Err(FiringError::panicked(id.clone(), panic_message(payload.as_ref())))
                });
            firing.touched.push(id.clone());

            match outcome {
                Ok(result) => {
                    trace!(actor_id = %id, did_fire = result.did_fire(), "Fired actor");
                    firing.total.merge(result);
                }
                Err(e) => {
                    self.stats.fire_errors = self.stats.fire_errors.saturating_add(1);
                    if self.config.trace_triggers {
                        warn!(actor_id = %id, error = %error_chain(&e), "Actor firing failed");
                    } else {
                        warn!(actor_id = %id, error = %e, "Actor firing failed");
                    }
                    self.hooks.fire_error(&e);
                    firing.failed.push(id);
                }
            }
        }

        firing
    }

    fn heartbeat_ms(&self) -> u64 {
        u64::try_from(self.config.heartbeat.as_millis()).unwrap_or(u64::MAX)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("actors", &self.actors)
            .field("phase", &self.phase())
            .field("pending", &self.pending)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
