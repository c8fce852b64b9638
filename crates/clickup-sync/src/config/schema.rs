//! Settings structures for the sync engine.
//!
//! Loaded once at startup and treated as read-only afterwards. Mappings
//! use `BTreeMap` so that field iteration, and therefore the order of
//! generated custom-field calls, is deterministic.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::entity::EntityType;

fn default_version() -> String {
    "1.0".to_string()
}

/// Default call budget per dispatch cycle. ClickUp enforces roughly 100
/// calls per minute per key; the default stays far below that so a shared
/// key is not starved.
fn default_requests_per_minute() -> usize {
    1
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_purge_interval_secs() -> u64 {
    86_400
}

fn default_retain_days() -> u32 {
    30
}

/// Root settings object.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_version")]
    pub version: String,

    /// ClickUp API key, sent as the `Authorization` header.
    pub api_key: String,

    /// Jobs dispatched per sync cycle.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: usize,

    /// Seconds between dispatch cycles.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Seconds between retention purges.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    /// Days to keep terminal queue rows.
    #[serde(default = "default_retain_days")]
    pub queue_retain_days: u32,

    /// Days to keep log rows.
    #[serde(default = "default_retain_days")]
    pub log_retain_days: u32,

    /// List mappings keyed by post type.
    #[serde(default)]
    pub post_lists: BTreeMap<String, ListMapping>,

    /// List mappings keyed by taxonomy.
    #[serde(default)]
    pub term_lists: BTreeMap<String, ListMapping>,
}

impl SyncConfig {
    /// Returns the list mapping for an entity subtype, or `None` when the
    /// subtype is not under sync. Unmapped subtypes are normal, not an
    /// error: most installations sync a handful of post types.
    pub fn list_for(&self, entity_type: EntityType, subtype: &str) -> Option<&ListMapping> {
        match entity_type {
            EntityType::Post => self.post_lists.get(subtype),
            EntityType::Term => self.term_lists.get(subtype),
        }
    }
}

/// Maps one entity subtype to a ClickUp list and its custom fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ListMapping {
    /// Target list: new tasks for this subtype are created here.
    pub list_id: String,

    /// Custom-field mappings keyed by local attribute name.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldMapping>,
}

/// Maps one local attribute to a ClickUp custom field.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    /// ClickUp custom field id.
    pub id: String,

    /// ClickUp field type; drives body shaping and dropdown matching.
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Known options for `drop_down` fields.
    #[serde(default)]
    pub options: Vec<DropdownOption>,
}

/// A single dropdown option as configured from the remote field.
#[derive(Debug, Clone, Deserialize)]
pub struct DropdownOption {
    pub id: String,
    pub label: String,
}

/// ClickUp custom field types this engine knows how to shape values for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Url,
    Checkbox,
    Date,
    Number,
    Money,
    DropDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config: SyncConfig = serde_json::from_str(r#"{ "api_key": "pk_123" }"#).unwrap();

        assert_eq!(config.version, "1.0");
        assert_eq!(config.requests_per_minute, 1);
        assert_eq!(config.sync_interval_secs, 60);
        assert_eq!(config.purge_interval_secs, 86_400);
        assert_eq!(config.queue_retain_days, 30);
        assert_eq!(config.log_retain_days, 30);
        assert!(config.post_lists.is_empty());
    }

    #[test]
    fn test_field_type_names() {
        assert_eq!(
            serde_json::from_str::<FieldType>(r#""drop_down""#).unwrap(),
            FieldType::DropDown
        );
        assert_eq!(
            serde_json::from_str::<FieldType>(r#""money""#).unwrap(),
            FieldType::Money
        );
        assert!(serde_json::from_str::<FieldType>(r#""location""#).is_err());
    }

    #[test]
    fn test_list_for() {
        let config: SyncConfig = serde_json::from_str(
            r#"{
                "api_key": "pk_123",
                "post_lists": { "article": { "list_id": "900100" } },
                "term_lists": { "category": { "list_id": "900200" } }
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.list_for(EntityType::Post, "article").unwrap().list_id,
            "900100"
        );
        assert_eq!(
            config.list_for(EntityType::Term, "category").unwrap().list_id,
            "900200"
        );
        assert!(config.list_for(EntityType::Post, "page").is_none());
        assert!(config.list_for(EntityType::Term, "article").is_none());
    }
}
