//! Actors and the action selection algorithm.
//!
//! An [`ActorType`] is built once per kind of actor: its declared ports, its
//! actions in priority order, and an optional exception handler. Every
//! [`Actor`] instance shares the type through an `Arc` and owns its ports and
//! field state.
//!
//! # Selection
//!
//! `fire()` walks the actions in priority order and fires the first one whose
//! condition holds and whose guard passes. At most one action fires per call.
//! A guard that errors or panics counts as "guard false". A panicking body is
//! handed to the exception handler like a failing one. When the tokens to
//! consume include a control token, the body is skipped and the exception
//! handler decides.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use itertools::Itertools;
use tracing::{trace, warn};

use crate::action::{Action, ActionFailure, ExceptionHandler, FailureCause, Production, Recovery};
use crate::errors::{
    ActionError, ActorError, FiringError, GuardError, MigrationError, panic_message,
};
use crate::id::ActorId;
use crate::port::{PortAddr, PortDirection, Ports};
use crate::result::ActionResult;
use crate::token::Token;

/// Field state of an actor, with migration lifecycle hooks.
pub trait ActorState: Send + 'static {
    /// Called before the actor's transport resources are detached.
    fn will_migrate(&mut self) {}

    /// Called after the actor is reattached; re-establish external connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor cannot resume on this runtime.
    fn did_migrate(&mut self) -> Result<(), MigrationError> {
        Ok(())
    }
}

/// Declaration shared by all actors of one kind.
pub struct ActorType<S> {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    actions: Vec<Action<S>>,
    handler: Option<Box<dyn ExceptionHandler<S>>>,
}

impl<S: ActorState> ActorType<S> {
    /// Start declaring an actor type.
    pub fn builder(name: impl Into<String>) -> ActorTypeBuilder<S> {
        ActorTypeBuilder {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            actions: Vec::new(),
            handler: None,
        }
    }

    /// Type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Actions in priority order.
    #[must_use]
    pub fn actions(&self) -> &[Action<S>] {
        &self.actions
    }

    /// Declared input port names.
    #[must_use]
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Declared output port names.
    #[must_use]
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn new_ports(&self) -> Ports {
        Ports::from_names(
            self.inputs.iter().map(String::as_str),
            self.outputs.iter().map(String::as_str),
        )
    }
}

impl<S> std::fmt::Debug for ActorType<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorType")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("actions", &self.actions)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Builder for [`ActorType`].
pub struct ActorTypeBuilder<S> {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    actions: Vec<Action<S>>,
    handler: Option<Box<dyn ExceptionHandler<S>>>,
}

impl<S: ActorState> ActorTypeBuilder<S> {
    /// Declare an input port.
    #[must_use]
    pub fn input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    /// Declare an output port.
    #[must_use]
    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    /// Append an action; earlier actions have higher priority.
    #[must_use]
    pub fn action(mut self, action: Action<S>) -> Self {
        self.actions.push(action);
        self
    }

    /// Install an exception handler closure.
    #[must_use]
    pub fn on_exception<F>(self, handler: F) -> Self
    where
        F: Fn(&mut S, ActionFailure<'_, S>) -> Result<Recovery, ActionError>
            + Send
            + Sync
            + 'static,
    {
        self.exception_handler(handler)
    }

    /// Install an exception handler.
    #[must_use]
    pub fn exception_handler(mut self, handler: impl ExceptionHandler<S> + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Validate the declaration and build the shared type.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::InvalidType` if there are no actions, a port or
    /// action name is duplicated, or an action refers to a port that is not
    /// declared with the matching direction.
    pub fn build(self) -> Result<Arc<ActorType<S>>, ActorError> {
        let invalid = |reason: String| ActorError::invalid_type(&self.name, reason);

        if self.actions.is_empty() {
            return Err(invalid("no actions declared".to_string()));
        }
        if let Some(port) = self.inputs.iter().chain(&self.outputs).duplicates().next() {
            return Err(invalid(format!("port '{port}' declared twice")));
        }
        if let Some(name) = self.actions.iter().map(Action::name).duplicates().next() {
            return Err(invalid(format!("action '{name}' declared twice")));
        }

        for action in &self.actions {
            let condition = action.condition();
            if let Some(port) = condition.inputs().iter().duplicates().next() {
                return Err(invalid(format!(
                    "action '{}' consumes port '{port}' twice",
                    action.name()
                )));
            }
            if let Some(port) = condition.inputs().iter().find(|p| !self.inputs.contains(p)) {
                return Err(invalid(format!(
                    "action '{}' consumes undeclared input '{port}'",
                    action.name()
                )));
            }
            if let Some(port) = condition.outputs().iter().find(|p| !self.outputs.contains(p)) {
                return Err(invalid(format!(
                    "action '{}' produces to undeclared output '{port}'",
                    action.name()
                )));
            }
        }

        Ok(Arc::new(ActorType {
            name: self.name,
            inputs: self.inputs,
            outputs: self.outputs,
            actions: self.actions,
            handler: self.handler,
        }))
    }
}

/// Object-safe view of an actor, used by the registry and the scheduler.
pub trait DynActor: Send {
    /// Actor identity.
    fn id(&self) -> &ActorId;

    /// Name of the actor type.
    fn type_name(&self) -> &str;

    /// Attempt to fire one action.
    ///
    /// # Errors
    ///
    /// Returns a `FiringError` when an action failed and no exception handler
    /// absorbed the failure.
    fn fire(&mut self) -> Result<ActionResult, FiringError>;

    /// The actor's ports.
    fn ports(&self) -> &Ports;

    /// The actor's ports, mutably.
    fn ports_mut(&mut self) -> &mut Ports;

    /// Run the pre-migration hook.
    fn will_migrate(&mut self);

    /// Run the post-migration hook.
    ///
    /// # Errors
    ///
    /// Returns the hook's error.
    fn did_migrate(&mut self) -> Result<(), MigrationError>;

    /// Downcast support for inspecting concrete state.
    fn as_any(&self) -> &dyn Any;
}

/// An actor instance: identity, ports, field state and a shared type.
pub struct Actor<S> {
    id: ActorId,
    kind: Arc<ActorType<S>>,
    ports: Ports,
    state: S,
}

impl<S: ActorState> Actor<S> {
    /// Create an actor with a fresh ID.
    pub fn new(kind: Arc<ActorType<S>>, state: S) -> Self {
        Self::with_id(ActorId::new(), kind, state)
    }

    /// Create an actor with a given ID.
    pub fn with_id(id: impl Into<ActorId>, kind: Arc<ActorType<S>>, state: S) -> Self {
        let ports = kind.new_ports();
        Self {
            id: id.into(),
            kind,
            ports,
            state,
        }
    }

    /// Field state.
    #[must_use]
    pub const fn state(&self) -> &S {
        &self.state
    }

    /// Field state, mutably.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// The shared type declaration.
    #[must_use]
    pub fn kind(&self) -> &Arc<ActorType<S>> {
        &self.kind
    }

    /// Push a token onto one of this actor's input ports.
    ///
    /// # Errors
    ///
    /// Returns an error if the port does not exist or is not an input.
    pub fn push_input(&mut self, port: &str, token: Token) -> Result<(), ActorError> {
        let addr = PortAddr::new(self.id.clone(), port);
        let target = self.ports.get_mut(port).ok_or_else(|| ActorError::UnknownPort(addr.clone()))?;
        if target.direction() != PortDirection::Input {
            return Err(ActorError::wrong_direction(addr, PortDirection::Input));
        }
        target.push(token);
        Ok(())
    }

    /// Take every token waiting on one of this actor's output ports.
    ///
    /// # Errors
    ///
    /// Returns an error if the port does not exist or is not an output.
    pub fn drain_output(&mut self, port: &str) -> Result<Vec<Token>, ActorError> {
        let addr = PortAddr::new(self.id.clone(), port);
        let source = self.ports.get_mut(port).ok_or_else(|| ActorError::UnknownPort(addr.clone()))?;
        if source.direction() != PortDirection::Output {
            return Err(ActorError::wrong_direction(addr, PortDirection::Output));
        }
        Ok(source.drain())
    }

    fn run_handler(
        &mut self,
        action: &Action<S>,
        args: Vec<Token>,
        cause: FailureCause,
    ) -> Result<Option<Production>, FiringError> {
        let Some(handler) = self.kind.handler.as_ref() else {
            return Err(self.reraise(action, cause));
        };

        let failure = ActionFailure::new(action, args, cause);
        match handler.handle(&mut self.state, failure) {
            Ok(Recovery::Absorbed) => Ok(None),
            Ok(Recovery::Fired(production)) => action
                .check_production(production)
                .map(Some)
                .map_err(|e| FiringError::action(self.id.clone(), action.name(), e)),
            Err(e) => Err(FiringError::action(self.id.clone(), action.name(), e)),
        }
    }

    fn reraise(&self, action: &Action<S>, cause: FailureCause) -> FiringError {
        match cause {
            FailureCause::ControlToken(kind) => {
                FiringError::control_token(self.id.clone(), action.name(), kind)
            }
            FailureCause::Body(e) => FiringError::action(self.id.clone(), action.name(), e),
        }
    }

    fn emit(&mut self, action: &Action<S>, production: Production) -> ActionResult {
        let mut produced: BTreeMap<PortAddr, Vec<Token>> = BTreeMap::new();
        for (name, token) in action
            .condition()
            .outputs()
            .iter()
            .zip(production.into_tokens())
        {
            if let Some(port) = self.ports.get_mut(name) {
                port.push(token.clone());
            }
            produced
                .entry(PortAddr::new(self.id.clone(), name.clone()))
                .or_default()
                .push(token);
        }
        ActionResult::fired(self.id.clone(), produced)
    }
}

impl<S: ActorState> DynActor for Actor<S> {
    fn id(&self) -> &ActorId {
        &self.id
    }

    fn type_name(&self) -> &str {
        self.kind.name()
    }

    fn fire(&mut self) -> Result<ActionResult, FiringError> {
        let kind = Arc::clone(&self.kind);

        for action in kind.actions() {
            let Some(peeked) = action.condition().peek(&self.ports) else {
                trace!(actor_id = %self.id, action = action.name(), "condition not met");
                continue;
            };

            let control = peeked.iter().find(|t| t.is_control()).map(|t| t.kind());

            if control.is_none() {
                let verdict = catch_unwind(AssertUnwindSafe(|| {
                    action.check_guard(&self.state, &peeked)
                }))
                .unwrap_or_else(|payload| {
                    Err(GuardError::new(format!(
                        "guard panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                });
                match verdict {
                    Ok(true) => {}
                    Ok(false) => {
                        trace!(actor_id = %self.id, action = action.name(), "guard rejected");
                        continue;
                    }
                    Err(e) => {
                        warn!(
                            actor_id = %self.id,
                            actor_type = self.kind.name(),
                            action = action.name(),
                            error = %e,
                            "Guard evaluation failed, treating action as not eligible"
                        );
                        continue;
                    }
                }
            }

            let args = action.condition().consume(&mut self.ports);
            let outcome = match control {
                Some(token_kind) => Err((args, FailureCause::ControlToken(token_kind))),
                None => catch_unwind(AssertUnwindSafe(|| {
                    action.invoke(&mut self.state, args.clone())
                }))
                .unwrap_or_else(|payload| {
                    Err(ActionError::failed(format!(
                        "action panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                })
                .map_err(|e| (args, FailureCause::Body(e))),
            };

            let production = match outcome {
                Ok(production) => production,
                Err((args, cause)) => match self.run_handler(action, args, cause)? {
                    Some(production) => production,
                    None => {
                        trace!(actor_id = %self.id, action = action.name(), "failure absorbed");
                        return Ok(ActionResult::idle());
                    }
                },
            };

            trace!(actor_id = %self.id, action = action.name(), "fired");
            return Ok(self.emit(action, production));
        }

        Ok(ActionResult::idle())
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut Ports {
        &mut self.ports
    }

    fn will_migrate(&mut self) {
        self.state.will_migrate();
    }

    fn did_migrate(&mut self) -> Result<(), MigrationError> {
        self.state.did_migrate()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<S> std::fmt::Debug for Actor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("type", &self.kind.name)
            .field("ports", &self.ports)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::indexing_slicing)]

    use super::*;
    use crate::errors::GuardError;
    use crate::token::TokenKind;

    #[derive(Default)]
    struct Picker {
        picked: Vec<String>,
    }

    impl ActorState for Picker {}

    fn record(name: &'static str) -> Action<Picker> {
        Action::new(name, move |state: &mut Picker, _args: Vec<Token>| {
            state.picked.push(name.to_string());
            Ok(Production::none())
        })
    }

    fn picker() -> Actor<Picker> {
        let kind = ActorType::builder("Picker")
            .input("in")
            .action(
                record("consume_b")
                    .inputs(["in"])
                    .when(|_, tokens| tokens.first().and_then(|t| t.as_str()) == Some("special")),
            )
            .action(record("consume_a").inputs(["in"]))
            .build()
            .unwrap();
        Actor::with_id("picker", kind, Picker::default())
    }

    #[test]
    fn test_first_eligible_action_wins() {
        let mut actor = picker();
        for value in ["x", "special", "y"] {
            actor.push_input("in", Token::data(value)).unwrap();
            let result = actor.fire().unwrap();
            assert!(result.did_fire());
        }
        assert_eq!(actor.state().picked, vec!["consume_a", "consume_b", "consume_a"]);
    }

    #[test]
    fn test_nothing_fires_without_tokens() {
        let mut actor = picker();
        let result = actor.fire().unwrap();
        assert_eq!(result, ActionResult::idle());
        assert!(actor.state().picked.is_empty());
    }

    #[test]
    fn test_guard_error_skips_to_next_action() {
        let kind = ActorType::builder("Faulty")
            .input("in")
            .action(record("broken").inputs(["in"]).guard(|_, _| Err(GuardError::new("boom"))))
            .action(record("fallback").inputs(["in"]))
            .build()
            .unwrap();
        let mut actor = Actor::with_id("faulty", kind, Picker::default());
        actor.push_input("in", Token::data(1)).unwrap();

        let result = actor.fire().unwrap();
        assert!(result.did_fire());
        assert_eq!(actor.state().picked, vec!["fallback"]);
    }

    #[test]
    fn test_guard_panic_skips_to_next_action() {
        let kind = ActorType::builder("Risky")
            .input("in")
            .action(
                record("risky")
                    .inputs(["in"])
                    .when(|_, tokens| tokens[5].as_str() == Some("y")),
            )
            .action(record("fallback").inputs(["in"]))
            .build()
            .unwrap();
        let mut actor = Actor::with_id("risky", kind, Picker::default());
        actor.push_input("in", Token::data("y")).unwrap();

        let result = actor.fire().unwrap();
        assert!(result.did_fire());
        assert_eq!(actor.state().picked, vec!["fallback"]);
        assert_eq!(actor.ports().pending("in"), 0);
    }

    fn explode() -> Action<Picker> {
        Action::new("explode", |_: &mut Picker, _: Vec<Token>| -> Result<Production, ActionError> {
            panic!("lost the plot")
        })
        .inputs(["in"])
    }

    #[test]
    fn test_body_panic_goes_to_handler() {
        let kind = ActorType::builder("Shaky")
            .input("in")
            .action(explode())
            .on_exception(|state: &mut Picker, failure| {
                match failure.cause() {
                    FailureCause::Body(ActionError::Failed(reason)) => {
                        state.picked.push(reason.clone());
                    }
                    other => panic!("unexpected cause {other:?}"),
                }
                Ok(Recovery::Absorbed)
            })
            .build()
            .unwrap();
        let mut actor = Actor::with_id("shaky", kind, Picker::default());
        actor.push_input("in", Token::data(1)).unwrap();

        let result = actor.fire().unwrap();
        assert!(!result.did_fire());
        assert_eq!(actor.state().picked, vec!["action panicked: lost the plot"]);
    }

    #[test]
    fn test_body_panic_without_handler_is_action_error() {
        let kind = ActorType::builder("Shaky")
            .input("in")
            .action(explode())
            .build()
            .unwrap();
        let mut actor = Actor::with_id("shaky", kind, Picker::default());
        actor.push_input("in", Token::data(1)).unwrap();

        let err = actor.fire().unwrap_err();
        assert!(matches!(err, FiringError::Action { .. }));
        assert_eq!(actor.ports().pending("in"), 0);
    }

    #[test]
    fn test_body_error_without_handler_is_reraised() {
        let kind = ActorType::builder("Failing")
            .input("in")
            .action(
                Action::new("explode", |_: &mut Picker, _: Vec<Token>| {
                    Err(ActionError::failed("nope"))
                })
                .inputs(["in"]),
            )
            .build()
            .unwrap();
        let mut actor = Actor::with_id("failing", kind, Picker::default());
        actor.push_input("in", Token::data(1)).unwrap();

        let err = actor.fire().unwrap_err();
        assert!(matches!(err, FiringError::Action { .. }));
        // The token was consumed even though the body failed.
        assert_eq!(actor.ports().pending("in"), 0);
    }

    #[test]
    fn test_control_token_skips_body_and_reraises_by_default() {
        let mut actor = picker();
        actor.push_input("in", Token::EndOfStream).unwrap();

        let err = actor.fire().unwrap_err();
        assert_eq!(
            err,
            FiringError::control_token(ActorId::from("picker"), "consume_b", TokenKind::EndOfStream)
        );
        assert!(actor.state().picked.is_empty());
    }

    #[test]
    fn test_handler_can_absorb_failure() {
        let kind = ActorType::builder("Absorbing")
            .input("in")
            .action(record("consume").inputs(["in"]))
            .on_exception(|_: &mut Picker, _failure| Ok(Recovery::Absorbed))
            .build()
            .unwrap();
        let mut actor = Actor::with_id("absorbing", kind, Picker::default());
        actor.push_input("in", Token::exception("upstream")).unwrap();

        let result = actor.fire().unwrap();
        assert!(!result.did_fire());
        assert_eq!(actor.ports().pending("in"), 0);
    }

    #[test]
    fn test_handler_can_run_the_action_itself() {
        let kind = ActorType::builder("Passthrough")
            .input("in")
            .action(record("consume").inputs(["in"]))
            .on_exception(|state: &mut Picker, failure| {
                let action = failure.action();
                action.invoke(state, failure.into_args()).map(Recovery::Fired)
            })
            .build()
            .unwrap();
        let mut actor = Actor::with_id("pass", kind, Picker::default());
        actor.push_input("in", Token::EndOfStream).unwrap();

        let result = actor.fire().unwrap();
        assert!(result.did_fire());
        assert_eq!(actor.state().picked, vec!["consume"]);
    }

    #[test]
    fn test_production_lands_on_output_port() {
        let kind = ActorType::builder("Echo")
            .input("in")
            .output("out")
            .action(
                Action::new("echo", |_: &mut Picker, args: Vec<Token>| Ok(Production::new(args)))
                    .inputs(["in"])
                    .outputs(["out"]),
            )
            .build()
            .unwrap();
        let mut actor = Actor::with_id("echo", kind, Picker::default());
        actor.push_input("in", Token::data("hi")).unwrap();

        let result = actor.fire().unwrap();
        assert_eq!(result.produced_on(&PortAddr::new("echo", "out")), &[Token::data("hi")]);
        assert_eq!(actor.drain_output("out").unwrap(), vec![Token::data("hi")]);
    }

    #[test]
    fn test_wrong_arity_is_a_firing_error() {
        let kind = ActorType::builder("Mute")
            .input("in")
            .output("out")
            .action(
                Action::new("mute", |_: &mut Picker, _: Vec<Token>| Ok(Production::none()))
                    .inputs(["in"])
                    .outputs(["out"]),
            )
            .build()
            .unwrap();
        let mut actor = Actor::with_id("mute", kind, Picker::default());
        actor.push_input("in", Token::data(1)).unwrap();

        let err = actor.fire().unwrap_err();
        assert!(matches!(
            err,
            FiringError::Action {
                source: ActionError::ProductionArity { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_build_rejects_undeclared_ports() {
        let result = ActorType::builder("Broken")
            .input("in")
            .action(record("x").inputs(["missing"]))
            .build();
        assert!(matches!(result, Err(ActorError::InvalidType { .. })));

        let result = ActorType::builder("Broken")
            .input("in")
            .action(record("x").inputs(["in"]).outputs(["in"]))
            .build();
        assert!(matches!(result, Err(ActorError::InvalidType { .. })));
    }

    #[test]
    fn test_build_rejects_duplicates_and_empty_tables() {
        assert!(ActorType::<Picker>::builder("Empty").build().is_err());
        assert!(ActorType::builder("Dup")
            .input("p")
            .output("p")
            .action(record("x"))
            .build()
            .is_err());
        assert!(ActorType::builder("Dup")
            .action(record("x"))
            .action(record("x"))
            .build()
            .is_err());
    }

    #[test]
    fn test_push_input_rejects_output_port() {
        let kind = ActorType::builder("Out")
            .output("out")
            .action(record("x"))
            .build()
            .unwrap();
        let mut actor = Actor::with_id("out", kind, Picker::default());
        let err = actor.push_input("out", Token::data(1)).unwrap_err();
        assert!(matches!(err, ActorError::WrongDirection { .. }));
        assert!(matches!(
            actor.push_input("nope", Token::data(1)),
            Err(ActorError::UnknownPort(_))
        ));
    }
}
