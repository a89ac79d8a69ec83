//! Ports: named, directed FIFO token queues owned by one actor.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::id::ActorId;
use crate::token::Token;

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Fully qualified port address: actor plus port name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortAddr {
    pub actor: ActorId,
    pub port: String,
}

impl PortAddr {
    /// Create a port address.
    pub fn new(actor: impl Into<ActorId>, port: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            port: port.into(),
        }
    }
}

impl std::fmt::Display for PortAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.actor, self.port)
    }
}

/// A single port with its pending tokens.
///
/// Queues are unbounded; backpressure belongs to the transport.
#[derive(Debug, Clone)]
pub struct Port {
    name: String,
    direction: PortDirection,
    queue: VecDeque<Token>,
}

impl Port {
    /// Create an empty port.
    pub fn new(name: impl Into<String>, direction: PortDirection) -> Self {
        Self {
            name: name.into(),
            direction,
            queue: VecDeque::new(),
        }
    }

    /// Port name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Port direction.
    #[must_use]
    pub const fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Append a token at the tail.
    pub fn push(&mut self, token: Token) {
        self.queue.push_back(token);
    }

    /// Remove the token at the head.
    pub fn pop(&mut self) -> Option<Token> {
        self.queue.pop_front()
    }

    /// Look at the token at the head without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&Token> {
        self.queue.front()
    }

    /// Number of pending tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Remove every pending token, head first.
    pub fn drain(&mut self) -> Vec<Token> {
        self.queue.drain(..).collect()
    }
}

/// The ports of one actor, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Ports {
    ports: BTreeMap<String, Port>,
}

impl Ports {
    /// Build the port set from input and output names.
    pub fn from_names<'a>(
        inputs: impl IntoIterator<Item = &'a str>,
        outputs: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let ports = inputs
            .into_iter()
            .map(|name| Port::new(name, PortDirection::Input))
            .chain(
                outputs
                    .into_iter()
                    .map(|name| Port::new(name, PortDirection::Output)),
            )
            .map(|port| (port.name.clone(), port))
            .collect();
        Self { ports }
    }

    /// Look up a port by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Port> {
        self.ports.get(name)
    }

    /// Look up a port by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.ports.get_mut(name)
    }

    /// Look up a port by name and direction.
    #[must_use]
    pub fn get_directed(&self, name: &str, direction: PortDirection) -> Option<&Port> {
        self.get(name).filter(|port| port.direction == direction)
    }

    /// Iterate over all ports in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    /// Iterate over output ports that have pending tokens.
    pub fn pending_outputs_mut(&mut self) -> impl Iterator<Item = &mut Port> {
        self.ports
            .values_mut()
            .filter(|port| port.direction == PortDirection::Output && !port.is_empty())
    }

    /// Number of tokens waiting on the named port, zero if it does not exist.
    #[must_use]
    pub fn pending(&self, name: &str) -> usize {
        self.get(name).map_or(0, Port::len)
    }
}
