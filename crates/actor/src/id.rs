//! Actor identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an actor instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    /// Create a new unique actor ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("actor-{}", Uuid::new_v4()))
    }

    /// Create an actor ID from an existing string.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActorId {
    fn from(id: &str) -> Self {
        Self::from_string(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_id_generation() {
        let id1 = ActorId::new();
        let id2 = ActorId::new();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("actor-"));
    }

    #[test]
    fn test_actor_id_display() {
        let id = ActorId::from_string("join-1");
        assert_eq!(format!("{id}"), "join-1");
    }
}
