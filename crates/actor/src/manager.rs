//! Registry of live actors and the local port wiring between them.
//!
//! The manager owns every actor on this runtime. The scheduler asks it for a
//! snapshot of the enabled actors at the start of a cycle and fires them one
//! by one through [`ActorManager::fire_actor`], which also delivers produced
//! tokens along local connections.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::actor::DynActor;
use crate::errors::{ActorError, FiringError};
use crate::id::ActorId;
use crate::port::{PortAddr, PortDirection};
use crate::result::ActionResult;
use crate::token::Token;

/// Lifecycle status of a registered actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorStatus {
    /// Takes part in firing cycles.
    Enabled,
    /// Temporarily excluded from cycles.
    Paused,
    /// Being moved to another runtime.
    Migrating,
    /// About to be destroyed.
    Terminating,
}

impl ActorStatus {
    /// Whether the actor takes part in firing cycles.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl std::fmt::Display for ActorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enabled => write!(f, "enabled"),
            Self::Paused => write!(f, "paused"),
            Self::Migrating => write!(f, "migrating"),
            Self::Terminating => write!(f, "terminating"),
        }
    }
}

struct Entry {
    actor: Box<dyn DynActor>,
    status: ActorStatus,
}

/// Live registry of actors on this runtime.
#[derive(Default)]
pub struct ActorManager {
    actors: BTreeMap<ActorId, Entry>,
    /// Registration order; iteration order of `enabled_actors`.
    order: Vec<ActorId>,
    /// Output port -> connected input ports.
    connections: BTreeMap<PortAddr, Vec<PortAddr>>,
}

impl ActorManager {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actor, enabled.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::AlreadyRegistered` if the ID is taken.
    pub fn add(&mut self, actor: impl DynActor + 'static) -> Result<ActorId, ActorError> {
        self.add_boxed(Box::new(actor))
    }

    /// Register a boxed actor, enabled.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::AlreadyRegistered` if the ID is taken.
    pub fn add_boxed(&mut self, actor: Box<dyn DynActor>) -> Result<ActorId, ActorError> {
        let id = actor.id().clone();
        if self.actors.contains_key(&id) {
            return Err(ActorError::AlreadyRegistered(id));
        }
        debug!(actor_id = %id, actor_type = actor.type_name(), "Actor registered");
        self.actors.insert(
            id.clone(),
            Entry {
                actor,
                status: ActorStatus::Enabled,
            },
        );
        self.order.push(id.clone());
        Ok(id)
    }

    /// Remove an actor and every connection touching it.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::NotFound` if the actor is not registered.
    pub fn remove(&mut self, id: &ActorId) -> Result<Box<dyn DynActor>, ActorError> {
        let entry = self
            .actors
            .remove(id)
            .ok_or_else(|| ActorError::NotFound(id.clone()))?;
        self.order.retain(|other| other != id);
        self.connections.retain(|from, targets| {
            targets.retain(|to| &to.actor != id);
            &from.actor != id && !targets.is_empty()
        });
        debug!(actor_id = %id, "Actor removed");
        Ok(entry.actor)
    }

    /// Number of registered actors, in any status.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Whether no actors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Whether an actor is registered.
    #[must_use]
    pub fn contains(&self, id: &ActorId) -> bool {
        self.actors.contains_key(id)
    }

    /// Borrow an actor.
    #[must_use]
    pub fn get(&self, id: &ActorId) -> Option<&dyn DynActor> {
        self.actors.get(id).map(|entry| entry.actor.as_ref())
    }

    /// Borrow an actor's concrete type.
    #[must_use]
    pub fn get_as<A: DynActor + 'static>(&self, id: &ActorId) -> Option<&A> {
        self.get(id).and_then(|actor| actor.as_any().downcast_ref::<A>())
    }

    /// Current status of an actor.
    #[must_use]
    pub fn status(&self, id: &ActorId) -> Option<ActorStatus> {
        self.actors.get(id).map(|entry| entry.status)
    }

    /// Snapshot of enabled actors in registration order.
    ///
    /// The snapshot is owned, so registrations and removals made while a cycle
    /// walks it are not observed by that cycle.
    #[must_use]
    pub fn enabled_actors(&self) -> Vec<ActorId> {
        self.order
            .iter()
            .filter(|id| self.status(id).is_some_and(ActorStatus::is_enabled))
            .cloned()
            .collect()
    }

    /// Exclude an actor from cycles.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::NotFound` if the actor is not registered.
    pub fn pause(&mut self, id: &ActorId) -> Result<(), ActorError> {
        self.set_status(id, ActorStatus::Paused)
    }

    /// Re-include a paused actor in cycles.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor is not registered or is not paused.
    pub fn resume(&mut self, id: &ActorId) -> Result<(), ActorError> {
        self.expect_status(id, ActorStatus::Paused)?;
        self.set_status(id, ActorStatus::Enabled)
    }

    /// Mark an actor as pending destruction.
    ///
    /// # Errors
    ///
    /// Returns `ActorError::NotFound` if the actor is not registered.
    pub fn mark_terminating(&mut self, id: &ActorId) -> Result<(), ActorError> {
        self.set_status(id, ActorStatus::Terminating)
    }

    /// Run the pre-migration hook and exclude the actor from cycles.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor is not registered or not enabled.
    pub fn begin_migration(&mut self, id: &ActorId) -> Result<(), ActorError> {
        self.expect_status(id, ActorStatus::Enabled)?;
        let entry = self.entry_mut(id)?;
        entry.actor.will_migrate();
        entry.status = ActorStatus::Migrating;
        info!(actor_id = %id, "Actor migrating");
        Ok(())
    }

    /// Run the post-migration hook and re-enable the actor.
    ///
    /// On hook failure the actor stays `Migrating`.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor is not migrating or the hook fails.
    pub fn complete_migration(&mut self, id: &ActorId) -> Result<(), ActorError> {
        self.expect_status(id, ActorStatus::Migrating)?;
        let entry = self.entry_mut(id)?;
        entry
            .actor
            .did_migrate()
            .map_err(|source| ActorError::Migration {
                actor: id.clone(),
                source,
            })?;
        entry.status = ActorStatus::Enabled;
        info!(actor_id = %id, "Actor migration complete");
        Ok(())
    }

    /// Connect an output port to an input port.
    ///
    /// An output may feed several inputs; each receives every token.
    ///
    /// # Errors
    ///
    /// Returns an error if either port is unknown or has the wrong direction.
    pub fn connect(&mut self, from: PortAddr, to: PortAddr) -> Result<(), ActorError> {
        self.check_port(&from, PortDirection::Output)?;
        self.check_port(&to, PortDirection::Input)?;
        let targets = self.connections.entry(from).or_default();
        if !targets.contains(&to) {
            targets.push(to);
        }
        Ok(())
    }

    /// Input ports fed by an output port.
    #[must_use]
    pub fn connections_from(&self, from: &PortAddr) -> &[PortAddr] {
        self.connections
            .get(from)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Append a token to an input port from outside the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is unknown or not an input.
    pub fn push_input(&mut self, to: &PortAddr, token: Token) -> Result<(), ActorError> {
        self.check_port(to, PortDirection::Input)?;
        let entry = self.entry_mut(&to.actor)?;
        entry
            .actor
            .ports_mut()
            .get_mut(&to.port)
            .ok_or_else(|| ActorError::UnknownPort(to.clone()))?
            .push(token);
        Ok(())
    }

    /// Take every token waiting on an output port.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is unknown or not an output.
    pub fn drain_output(&mut self, from: &PortAddr) -> Result<Vec<Token>, ActorError> {
        self.check_port(from, PortDirection::Output)?;
        let entry = self.entry_mut(&from.actor)?;
        Ok(entry
            .actor
            .ports_mut()
            .get_mut(&from.port)
            .map(crate::port::Port::drain)
            .unwrap_or_default())
    }

    /// Fire one actor and deliver its production along local connections.
    ///
    /// Downstream actors that receive tokens are added to the result's
    /// affected set.
    ///
    /// # Errors
    ///
    /// Returns the actor's `FiringError`, or `FiringError::UnknownActor`.
    pub fn fire_actor(&mut self, id: &ActorId) -> Result<ActionResult, FiringError> {
        let entry = self
            .actors
            .get_mut(id)
            .ok_or_else(|| FiringError::UnknownActor(id.clone()))?;
        let mut result = entry.actor.fire()?;
        if result.did_fire() {
            for downstream in self.deliver(id) {
                result.add_affected(downstream);
            }
        }
        Ok(result)
    }

    /// Move pending tokens from an actor's connected outputs to their targets.
    fn deliver(&mut self, id: &ActorId) -> BTreeSet<ActorId> {
        let mut outgoing: Vec<(PortAddr, Vec<Token>)> = Vec::new();
        if let Some(entry) = self.actors.get_mut(id) {
            for port in entry.actor.ports_mut().pending_outputs_mut() {
                let addr = PortAddr::new(id.clone(), port.name());
                if self.connections.contains_key(&addr) {
                    outgoing.push((addr, port.drain()));
                }
            }
        }

        let mut reached = BTreeSet::new();
        for (from, tokens) in outgoing {
            let targets = self.connections.get(&from).cloned().unwrap_or_default();
            for to in targets {
                let Some(port) = self
                    .actors
                    .get_mut(&to.actor)
                    .and_then(|entry| entry.actor.ports_mut().get_mut(&to.port))
                else {
                    continue;
                };
                for token in &tokens {
                    port.push(token.clone());
                }
                reached.insert(to.actor);
            }
        }
        reached
    }

    fn check_port(&self, addr: &PortAddr, direction: PortDirection) -> Result<(), ActorError> {
        let actor = self
            .get(&addr.actor)
            .ok_or_else(|| ActorError::NotFound(addr.actor.clone()))?;
        let port = actor
            .ports()
            .get(&addr.port)
            .ok_or_else(|| ActorError::UnknownPort(addr.clone()))?;
        if port.direction() == direction {
            Ok(())
        } else {
            Err(ActorError::wrong_direction(addr.clone(), direction))
        }
    }

    fn expect_status(&self, id: &ActorId, expected: ActorStatus) -> Result<(), ActorError> {
        let status = self
            .status(id)
            .ok_or_else(|| ActorError::NotFound(id.clone()))?;
        if status == expected {
            Ok(())
        } else {
            Err(ActorError::InvalidStatus {
                actor: id.clone(),
                status: status.to_string(),
                expected: expected.to_string(),
            })
        }
    }

    fn set_status(&mut self, id: &ActorId, status: ActorStatus) -> Result<(), ActorError> {
        self.entry_mut(id)?.status = status;
        debug!(actor_id = %id, status = %status, "Actor status changed");
        Ok(())
    }

    fn entry_mut(&mut self, id: &ActorId) -> Result<&mut Entry, ActorError> {
        self.actors
            .get_mut(id)
            .ok_or_else(|| ActorError::NotFound(id.clone()))
    }
}

impl std::fmt::Debug for ActorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorManager")
            .field("actors", &self.order)
            .field("connections", &self.connections)
            .finish()
    }
}
