//! Thread-safe hand-off into the scheduling thread.
//!
//! Transport threads and monitors never touch scheduler state directly. They
//! send commands through a [`SchedulerHandle`]; the scheduler drains the
//! channel on its own thread before each step.

use std::panic::Location;
use std::time::Duration;

use tokenflow_actor::ActorId;
use tokenflow_core::{Error, Result};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::trigger::Targets;

/// A request funneled onto the scheduling thread.
#[derive(Debug)]
pub(crate) enum Command {
    Trigger {
        delay: Duration,
        targets: Targets,
        origin: &'static Location<'static>,
    },
    Stop,
}

/// Cloneable, `Send` handle for requesting cycles from any thread.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: UnboundedSender<Command>,
}

impl SchedulerHandle {
    pub(crate) fn channel() -> (Self, UnboundedReceiver<Command>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    /// Request a cycle after `delay` for the given targets.
    ///
    /// # Errors
    ///
    /// Returns `Error::SchedulerClosed` if the scheduler has been dropped.
    #[track_caller]
    pub fn trigger(&self, delay: Duration, targets: Targets) -> Result<()> {
        self.send(Command::Trigger {
            delay,
            targets,
            origin: Location::caller(),
        })
    }

    /// Request an immediate cycle for specific actors.
    ///
    /// # Errors
    ///
    /// Returns `Error::SchedulerClosed` if the scheduler has been dropped.
    #[track_caller]
    pub fn trigger_actors(&self, ids: impl IntoIterator<Item = ActorId>) -> Result<()> {
        self.trigger(Duration::ZERO, Targets::actors(ids))
    }

    /// Request an immediate full sweep.
    ///
    /// # Errors
    ///
    /// Returns `Error::SchedulerClosed` if the scheduler has been dropped.
    #[track_caller]
    pub fn trigger_all(&self) -> Result<()> {
        self.trigger(Duration::ZERO, Targets::All)
    }

    /// Ask the scheduler to stop.
    ///
    /// # Errors
    ///
    /// Returns `Error::SchedulerClosed` if the scheduler has been dropped.
    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// Whether the scheduler on the other end is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| Error::SchedulerClosed)
    }
}
