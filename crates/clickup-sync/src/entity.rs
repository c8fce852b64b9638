//! Entity types shared between the enqueue and dispatch paths.
//!
//! The host CMS is only visible through [`EntityProvider`]: change hooks hand
//! the sync engine either a bare id or a snapshot they already hold, and the
//! provider resolves ids to the current entity state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of content-management entity eligible for sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Post,
    Term,
}

impl EntityType {
    /// Returns the canonical storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Term => "term",
        }
    }
}

impl TryFrom<&str> for EntityType {
    type Error = ParseEntityTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "post" => Ok(Self::Post),
            "term" => Ok(Self::Term),
            _ => Err(ParseEntityTypeError(value.to_owned())),
        }
    }
}

/// Raised when a stored entity type string is not a known variant.
#[derive(Debug, Error)]
#[error("unknown entity type '{0}'")]
pub struct ParseEntityTypeError(pub String);

/// How a change hook refers to the entity it fired for.
///
/// Deletion hooks pass [`EntityRef::Snapshot`] with the last-known state,
/// since the entity is no longer loadable by id once the hook runs.
#[derive(Debug, Clone)]
pub enum EntityRef {
    /// Resolve the current state through the [`EntityProvider`].
    Id(i64),
    /// Use this state as-is, without a provider lookup.
    Snapshot(EntitySnapshot),
}

impl From<i64> for EntityRef {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<EntitySnapshot> for EntityRef {
    fn from(snapshot: EntitySnapshot) -> Self {
        Self::Snapshot(snapshot)
    }
}

/// Point-in-time view of one entity, as the host CMS sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_type: EntityType,
    pub id: i64,
    /// Concrete subtype: the post type for posts, the taxonomy for terms.
    /// List mappings are keyed by this value.
    pub subtype: String,
    /// Display name; becomes the remote task name.
    pub name: String,
    /// Raw attribute values keyed by attribute name. Date-like attributes
    /// carry epoch milliseconds rendered as a decimal string. An absent key
    /// means the attribute has no value for this entity.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl EntitySnapshot {
    pub fn new(
        entity_type: EntityType,
        id: i64,
        subtype: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            id,
            subtype: subtype.into(),
            name: name.into(),
            attributes: HashMap::new(),
        }
    }

    /// Builder-style attribute insertion, mostly for adapters and tests.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Read access to current entity state, implemented by the host adapter.
pub trait EntityProvider {
    /// Returns the current snapshot for the entity, or `None` when the
    /// entity no longer exists. A `None` makes the enqueue path a silent
    /// no-op, which covers deletion hooks firing after removal.
    fn snapshot(&self, entity_type: EntityType, entity_id: i64) -> Option<EntitySnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_round_trips_through_storage_form() {
        for entity_type in [EntityType::Post, EntityType::Term] {
            assert_eq!(
                EntityType::try_from(entity_type.as_str()).unwrap(),
                entity_type
            );
        }
    }

    #[test]
    fn unknown_entity_type_is_rejected() {
        assert!(EntityType::try_from("page").is_err());
    }

    #[test]
    fn snapshot_builder_sets_attributes() {
        let snapshot = EntitySnapshot::new(EntityType::Post, 7, "article", "Hello")
            .with_attribute("status", "Published");
        assert_eq!(snapshot.attributes.get("status").unwrap(), "Published");
    }
}
