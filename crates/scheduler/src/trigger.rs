//! Trigger targets.

use std::collections::BTreeSet;

use tokenflow_actor::ActorId;

/// Which actors a trigger addresses.
///
/// `None` entries in an actor set stand for events with no addressable actor.
/// They are never scheduled; a set holding only `None` wakes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets {
    /// A full sweep over every enabled actor.
    All,
    /// Only the listed actors.
    Actors(BTreeSet<Option<ActorId>>),
}

impl Targets {
    /// Address a set of actors.
    pub fn actors(ids: impl IntoIterator<Item = ActorId>) -> Self {
        Self::Actors(ids.into_iter().map(Some).collect())
    }

    /// A trigger that carries only the "no actor" marker.
    #[must_use]
    pub fn unaddressed() -> Self {
        Self::Actors(BTreeSet::from([None]))
    }

    /// Whether this is a full sweep.
    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Addressable actor IDs, without the "no actor" marker.
    pub fn ids(&self) -> impl Iterator<Item = &ActorId> {
        let ids = match self {
            Self::All => None,
            Self::Actors(ids) => Some(ids.iter().flatten()),
        };
        ids.into_iter().flatten()
    }
}

impl From<ActorId> for Targets {
    fn from(id: ActorId) -> Self {
        Self::actors([id])
    }
}

impl FromIterator<ActorId> for Targets {
    fn from_iter<I: IntoIterator<Item = ActorId>>(iter: I) -> Self {
        Self::actors(iter)
    }
}

impl FromIterator<Option<ActorId>> for Targets {
    fn from_iter<I: IntoIterator<Item = Option<ActorId>>>(iter: I) -> Self {
        Self::Actors(iter.into_iter().collect())
    }
}

impl std::fmt::Display for Targets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "ALL"),
            Self::Actors(ids) => {
                let names: Vec<&str> = ids
                    .iter()
                    .map(|id| id.as_ref().map_or("<none>", ActorId::as_str))
                    .collect();
                write!(f, "{{{}}}", names.join(", "))
            }
        }
    }
}
