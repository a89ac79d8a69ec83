//! Actions: named transitions gated by a port condition and a guard.
//!
//! An [`Action`] is a fixed record built once per actor type. Its
//! [`Condition`] names the input ports that must each hold a token and the
//! output ports the body produces to. The guard sees the actor state and the
//! head tokens that would be consumed; it runs only when the condition holds.

use crate::errors::{ActionError, GuardError};
use crate::port::{Port, Ports};
use crate::token::{Token, TokenKind};

/// Guard predicate over actor state and the tokens that would be consumed.
pub type GuardFn<S> = dyn Fn(&S, &[&Token]) -> Result<bool, GuardError> + Send + Sync;

/// Action body: consumes the input tokens and returns the production.
pub type BodyFn<S> = dyn Fn(&mut S, Vec<Token>) -> Result<Production, ActionError> + Send + Sync;

/// Structural port requirement of an action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Condition {
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl Condition {
    /// Create a condition over the given input and output port names.
    pub fn new<I, O>(inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
        }
    }

    /// Input ports that must each hold at least one token.
    #[must_use]
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Output ports the production is written to, in order.
    #[must_use]
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Whether every input port has a pending token.
    ///
    /// Output ports always have room; queues are unbounded.
    #[must_use]
    pub fn is_satisfied(&self, ports: &Ports) -> bool {
        self.inputs.iter().all(|name| ports.pending(name) > 0)
    }

    /// Head tokens of the input ports, or `None` if the condition does not hold.
    #[must_use]
    pub fn peek<'p>(&self, ports: &'p Ports) -> Option<Vec<&'p Token>> {
        self.inputs
            .iter()
            .map(|name| ports.get(name).and_then(Port::peek))
            .collect()
    }

    /// Remove the head token of every input port, in declared order.
    pub fn consume(&self, ports: &mut Ports) -> Vec<Token> {
        self.inputs
            .iter()
            .filter_map(|name| ports.get_mut(name).and_then(Port::pop))
            .collect()
    }
}

/// Tokens produced by one action, one per declared output port, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Production(Vec<Token>);

impl Production {
    /// An empty production, for actions without outputs.
    #[must_use]
    pub const fn none() -> Self {
        Self(Vec::new())
    }

    /// A production with a single token.
    #[must_use]
    pub fn one(token: Token) -> Self {
        Self(vec![token])
    }

    /// A production from an ordered list of tokens.
    #[must_use]
    pub const fn new(tokens: Vec<Token>) -> Self {
        Self(tokens)
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the production is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the tokens.
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    /// Take the tokens.
    #[must_use]
    pub fn into_tokens(self) -> Vec<Token> {
        self.0
    }
}

impl From<Vec<Token>> for Production {
    fn from(tokens: Vec<Token>) -> Self {
        Self(tokens)
    }
}

/// A guarded, prioritized transition of an actor with state `S`.
pub struct Action<S> {
    name: String,
    condition: Condition,
    guard: Option<Box<GuardFn<S>>>,
    body: Box<BodyFn<S>>,
}

impl<S> Action<S> {
    /// Create an action with no ports and no guard.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut S, Vec<Token>) -> Result<Production, ActionError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            condition: Condition::default(),
            guard: None,
            body: Box::new(body),
        }
    }

    /// Set the input ports this action consumes from.
    #[must_use]
    pub fn inputs<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.condition.inputs = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the output ports this action produces to.
    #[must_use]
    pub fn outputs<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.condition.outputs = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set a fallible guard.
    #[must_use]
    pub fn guard<G>(mut self, guard: G) -> Self
    where
        G: Fn(&S, &[&Token]) -> Result<bool, GuardError> + Send + Sync + 'static,
    {
        self.guard = Some(Box::new(guard));
        self
    }

    /// Set an infallible guard.
    #[must_use]
    pub fn when<G>(self, guard: G) -> Self
    where
        G: Fn(&S, &[&Token]) -> bool + Send + Sync + 'static,
    {
        self.guard(move |state, tokens| Ok(guard(state, tokens)))
    }

    /// Action name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Structural condition.
    #[must_use]
    pub const fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Whether a guard is attached.
    #[must_use]
    pub const fn has_guard(&self) -> bool {
        self.guard.is_some()
    }

    /// Evaluate the guard; an absent guard always passes.
    ///
    /// # Errors
    ///
    /// Returns the guard's own error if it cannot be evaluated.
    pub fn check_guard(&self, state: &S, tokens: &[&Token]) -> Result<bool, GuardError> {
        self.guard.as_ref().map_or(Ok(true), |guard| guard(state, tokens))
    }

    /// Run the body on consumed tokens and check the production arity.
    ///
    /// # Errors
    ///
    /// Returns the body's error, or `ActionError::ProductionArity` if the
    /// production does not match the declared outputs.
    pub fn invoke(&self, state: &mut S, args: Vec<Token>) -> Result<Production, ActionError> {
        (self.body)(state, args).and_then(|production| self.check_production(production))
    }

    /// Check that a production has one token per declared output.
    ///
    /// # Errors
    ///
    /// Returns `ActionError::ProductionArity` on mismatch.
    pub fn check_production(&self, production: Production) -> Result<Production, ActionError> {
        if production.len() == self.condition.outputs.len() {
            Ok(production)
        } else {
            Err(ActionError::ProductionArity {
                action: self.name.clone(),
                expected: self.condition.outputs.len(),
                actual: production.len(),
            })
        }
    }
}

impl<S> std::fmt::Debug for Action<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("condition", &self.condition)
            .field("guarded", &self.guard.is_some())
            .finish_non_exhaustive()
    }
}

/// Why an action was handed to the exception handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// A control token was among the consumed tokens; the body did not run.
    ControlToken(TokenKind),
    /// The body returned an error.
    Body(ActionError),
}

/// Context handed to an exception handler.
#[derive(Debug)]
pub struct ActionFailure<'a, S> {
    action: &'a Action<S>,
    args: Vec<Token>,
    cause: FailureCause,
}

impl<'a, S> ActionFailure<'a, S> {
    pub(crate) const fn new(action: &'a Action<S>, args: Vec<Token>, cause: FailureCause) -> Self {
        Self {
            action,
            args,
            cause,
        }
    }

    /// The action whose firing failed.
    #[must_use]
    pub const fn action(&self) -> &'a Action<S> {
        self.action
    }

    /// The tokens the action consumed.
    #[must_use]
    pub fn args(&self) -> &[Token] {
        &self.args
    }

    /// Take the consumed tokens.
    #[must_use]
    pub fn into_args(self) -> Vec<Token> {
        self.args
    }

    /// Why the handler was invoked.
    #[must_use]
    pub const fn cause(&self) -> &FailureCause {
        &self.cause
    }

    /// Whether the consumed tokens include an end-of-stream marker.
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        self.cause == FailureCause::ControlToken(TokenKind::EndOfStream)
    }
}

/// Outcome of a handled action failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery {
    /// The failure was absorbed; the firing counts as no effect.
    Absorbed,
    /// The handler completed a composite action with this production.
    Fired(Production),
}

/// Per-actor-type recovery strategy for action failures.
///
/// Without one, failures escape `fire()` as a `FiringError`.
pub trait ExceptionHandler<S>: Send + Sync {
    /// Handle a failed action.
    ///
    /// # Errors
    ///
    /// Returning an error re-raises it to the scheduler.
    fn handle(&self, state: &mut S, failure: ActionFailure<'_, S>) -> Result<Recovery, ActionError>;
}

impl<S, F> ExceptionHandler<S> for F
where
    F: Fn(&mut S, ActionFailure<'_, S>) -> Result<Recovery, ActionError> + Send + Sync,
{
    fn handle(&self, state: &mut S, failure: ActionFailure<'_, S>) -> Result<Recovery, ActionError> {
        self(state, failure)
    }
}
