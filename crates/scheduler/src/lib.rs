//! # tokenflow-scheduler
//!
//! Single-threaded cooperative scheduler for tokenflow actors.
//!
//! The scheduler repeatedly fires ready actors until no more progress is
//! possible, then idles until a trigger, monitor activity or the heartbeat
//! wakes it again. Transport threads hand work to it through a
//! [`SchedulerHandle`].

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod clock;
pub mod config;
pub mod handle;
pub mod hooks;
pub mod monitor;
pub mod scheduler;
pub mod timers;
pub mod trigger;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use handle::SchedulerHandle;
pub use hooks::{CycleStart, SchedulerHooks, TriggerEvent};
pub use monitor::{Monitor, NullMonitor};
pub use scheduler::{CycleReport, NextCycle, Phase, Scheduler, SchedulerStats, Step};
pub use timers::{TimerId, TimerQueue};
pub use tokenflow_core::{Error, Result};
pub use trigger::Targets;
