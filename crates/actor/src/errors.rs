//! Actor error types.
//!
//! Guard and action errors stay inside an actor's decision logic. A
//! `FiringError` is what escapes one `fire()` call; the scheduler contains it.
//! `ActorError` covers registry, wiring and type declaration failures.

use std::any::Any;

use thiserror::Error;

use crate::id::ActorId;
use crate::port::{PortAddr, PortDirection};
use crate::token::TokenKind;

/// A guard predicate could not be evaluated.
///
/// Treated as "guard false": logged, the action does not fire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("guard failed: {reason}")]
pub struct GuardError {
    reason: String,
}

impl GuardError {
    /// Create a guard error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The failure reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// An action body failed after its condition and guard passed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The body reported a failure.
    #[error("action failed: {0}")]
    Failed(String),

    /// The body received a token it cannot handle.
    #[error("unexpected {kind} token on port '{port}'")]
    UnexpectedToken { port: String, kind: TokenKind },

    /// The body produced a different number of tokens than declared outputs.
    #[error("action '{action}' produced {actual} tokens for {expected} output ports")]
    ProductionArity {
        action: String,
        expected: usize,
        actual: usize,
    },
}

impl ActionError {
    /// Create a generic body failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    /// Create an unexpected token error.
    pub fn unexpected_token(port: impl Into<String>, kind: TokenKind) -> Self {
        Self::UnexpectedToken {
            port: port.into(),
            kind,
        }
    }
}

/// Any failure escaping a single actor's `fire()` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FiringError {
    /// The action body (or its exception handler) failed.
    #[error("actor {actor} action '{action}' failed: {source}")]
    Action {
        actor: ActorId,
        action: String,
        #[source]
        source: ActionError,
    },

    /// A control token reached an action and the handler did not absorb it.
    #[error("actor {actor} action '{action}' received {kind} token")]
    ControlToken {
        actor: ActorId,
        action: String,
        kind: TokenKind,
    },

    /// The actor panicked while firing.
    #[error("actor {actor} panicked while firing: {message}")]
    Panicked { actor: ActorId, message: String },

    /// The actor is not registered.
    #[error("actor {0} not found")]
    UnknownActor(ActorId),
}

impl FiringError {
    /// Create an action failure.
    pub fn action(actor: ActorId, action: impl Into<String>, source: ActionError) -> Self {
        Self::Action {
            actor,
            action: action.into(),
            source,
        }
    }

    /// Create a control token failure.
    pub fn control_token(actor: ActorId, action: impl Into<String>, kind: TokenKind) -> Self {
        Self::ControlToken {
            actor,
            action: action.into(),
            kind,
        }
    }

    /// Create a panic failure.
    pub fn panicked(actor: ActorId, message: impl Into<String>) -> Self {
        Self::Panicked {
            actor,
            message: message.into(),
        }
    }

    /// The actor this failure belongs to.
    #[must_use]
    pub const fn actor(&self) -> &ActorId {
        match self {
            Self::Action { actor, .. }
            | Self::ControlToken { actor, .. }
            | Self::Panicked { actor, .. }
            | Self::UnknownActor(actor) => actor,
        }
    }
}

/// Text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// A migration hook failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("migration failed: {reason}")]
pub struct MigrationError {
    reason: String,
}

impl MigrationError {
    /// Create a migration error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Registry, wiring and declaration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActorError {
    /// The actor is not registered.
    #[error("actor not found: {0}")]
    NotFound(ActorId),

    /// An actor with this ID is already registered.
    #[error("actor already registered: {0}")]
    AlreadyRegistered(ActorId),

    /// The port does not exist on the actor.
    #[error("unknown port: {0}")]
    UnknownPort(PortAddr),

    /// The port exists but has the wrong direction.
    #[error("port {addr} is not an {expected} port")]
    WrongDirection {
        addr: PortAddr,
        expected: PortDirection,
    },

    /// An actor type declaration is inconsistent.
    #[error("invalid actor type '{type_name}': {reason}")]
    InvalidType { type_name: String, reason: String },

    /// The actor is not in a state that allows the operation.
    #[error("actor {actor} is {status}, expected {expected}")]
    InvalidStatus {
        actor: ActorId,
        status: String,
        expected: String,
    },

    /// A migration hook failed.
    #[error("actor {actor}: {source}")]
    Migration {
        actor: ActorId,
        #[source]
        source: MigrationError,
    },
}

impl ActorError {
    /// Create an invalid type error.
    pub fn invalid_type(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidType {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a wrong direction error.
    pub const fn wrong_direction(addr: PortAddr, expected: PortDirection) -> Self {
        Self::WrongDirection { addr, expected }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_name_actor_in_firing_error() {
        let err = FiringError::action(
            ActorId::from_string("join-1"),
            "append",
            ActionError::failed("bad line"),
        );
        assert_eq!(err.actor().as_str(), "join-1");
        assert!(err.to_string().contains("append"));
        assert!(err.to_string().contains("bad line"));
    }

    #[test]
    fn should_describe_production_arity() {
        let err = ActionError::ProductionArity {
            action: "produce".to_string(),
            expected: 1,
            actual: 2,
        };
        assert!(err.to_string().contains("2 tokens for 1 output"));
    }

    #[test]
    fn should_describe_wrong_direction() {
        let err = ActorError::wrong_direction(PortAddr::new("a", "out"), PortDirection::Input);
        assert_eq!(err.to_string(), "port a.out is not an input port");
    }
}
