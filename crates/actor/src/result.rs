//! Outcome of firing attempts.

use std::collections::{BTreeMap, BTreeSet};

use crate::id::ActorId;
use crate::port::PortAddr;
use crate::token::Token;

/// The outcome of one or more firing attempts.
///
/// `merge` folds per-actor results into a cycle-level result. It is
/// associative and has [`ActionResult::idle`] as identity. It is commutative
/// whenever the merged results write disjoint ports, which holds within one
/// cycle because each actor fires at most once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionResult {
    did_fire: bool,
    production: BTreeMap<PortAddr, Vec<Token>>,
    affected: BTreeSet<ActorId>,
}

impl ActionResult {
    /// The identity result: nothing fired, nothing produced.
    #[must_use]
    pub fn idle() -> Self {
        Self::default()
    }

    /// A result for an actor that fired an action.
    #[must_use]
    pub fn fired(actor: ActorId, production: BTreeMap<PortAddr, Vec<Token>>) -> Self {
        Self {
            did_fire: true,
            production,
            affected: BTreeSet::from([actor]),
        }
    }

    /// Whether any action fired.
    #[must_use]
    pub const fn did_fire(&self) -> bool {
        self.did_fire
    }

    /// Tokens produced, per output port, in production order.
    #[must_use]
    pub const fn production(&self) -> &BTreeMap<PortAddr, Vec<Token>> {
        &self.production
    }

    /// Tokens produced on one output port.
    #[must_use]
    pub fn produced_on(&self, addr: &PortAddr) -> &[Token] {
        self.production.get(addr).map(Vec::as_slice).unwrap_or_default()
    }

    /// Actors whose state or input queues this result touched.
    #[must_use]
    pub const fn affected(&self) -> &BTreeSet<ActorId> {
        &self.affected
    }

    /// Mark another actor as affected.
    pub fn add_affected(&mut self, actor: ActorId) {
        self.affected.insert(actor);
    }

    /// Fold another result into this one.
    ///
    /// Tokens for a port both sides wrote land after this result's own.
    pub fn merge(&mut self, other: Self) {
        self.did_fire |= other.did_fire;
        for (addr, tokens) in other.production {
            self.production.entry(addr).or_default().extend(tokens);
        }
        self.affected.extend(other.affected);
    }

    /// Merge two results by value.
    #[must_use]
    pub fn merged(mut self, other: Self) -> Self {
        self.merge(other);
        self
    }
}

impl FromIterator<Self> for ActionResult {
    fn from_iter<I: IntoIterator<Item = Self>>(iter: I) -> Self {
        iter.into_iter().fold(Self::idle(), Self::merged)
    }
}
