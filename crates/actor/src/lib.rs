//! # tokenflow-actor
//!
//! Dataflow actors for the tokenflow runtime.
//!
//! An actor owns named input and output ports and a prioritized table of
//! guarded actions. Each call to `fire()` runs at most one action: the first
//! whose input condition holds and whose guard passes. The [`ActorManager`]
//! owns the actors on one runtime and wires output ports to input ports.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod action;
pub mod actor;
pub mod errors;
pub mod id;
pub mod manager;
pub mod port;
pub mod result;
pub mod token;

pub use action::{
    Action, ActionFailure, Condition, ExceptionHandler, FailureCause, Production, Recovery,
};
pub use actor::{Actor, ActorState, ActorType, ActorTypeBuilder, DynActor};
pub use errors::{
    ActionError, ActorError, FiringError, GuardError, MigrationError, panic_message,
};
pub use id::ActorId;
pub use manager::{ActorManager, ActorStatus};
pub use port::{Port, PortAddr, PortDirection, Ports};
pub use result::ActionResult;
pub use token::{Token, TokenKind};
