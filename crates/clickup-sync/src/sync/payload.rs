//! Entity snapshot → task payload resolution.
//!
//! A payload is the remote-facing projection of one entity: the task name
//! plus the custom-field values produced by the configured mapping. It is
//! recomputed on every enqueue (entity data changes between invocations)
//! and memoized only inside one [`PayloadCache`], which callers scope to a
//! single change notification or bulk batch.

use std::collections::HashMap;

use crate::clickup::FieldValue;
use crate::config::{FieldType, ListMapping};
use crate::entity::{EntitySnapshot, EntityType};

/// One resolved custom-field value.
#[derive(Debug, Clone)]
pub struct PayloadField {
    /// ClickUp custom field id.
    pub id: String,
    /// Local attribute name; `field_limit` filters match against this.
    pub name: String,
    pub value: FieldValue,
}

/// The remote-facing projection of one entity.
#[derive(Debug, Clone)]
pub struct TaskPayload {
    pub name: String,
    pub custom_fields: Vec<PayloadField>,
}

/// Resolves a payload from a snapshot and its list mapping.
///
/// Attributes without a value are skipped. Dropdown values are matched
/// case-insensitively against the configured option labels; a value with
/// no matching option drops that field. Date and numeric attributes that
/// fail to parse are dropped as well; a partial payload beats no sync.
pub fn resolve(snapshot: &EntitySnapshot, mapping: &ListMapping) -> TaskPayload {
    let mut custom_fields = Vec::new();

    for (attribute, field) in &mapping.fields {
        let Some(raw) = snapshot.attributes.get(attribute) else {
            continue;
        };

        let value = match field.field_type {
            FieldType::DropDown => {
                let option = field
                    .options
                    .iter()
                    .find(|o| o.label.to_lowercase() == raw.to_lowercase());
                match option {
                    Some(option) => FieldValue::Text(option.id.clone()),
                    None => {
                        log::debug!(
                            "Dropdown value '{}' for '{}' matches no option, skipping field",
                            raw,
                            attribute
                        );
                        continue;
                    }
                }
            }
            FieldType::Date => match raw.parse::<i64>() {
                Ok(ms) => FieldValue::Date(ms),
                Err(_) => {
                    log::debug!("Date value '{}' for '{}' is not epoch millis, skipping field", raw, attribute);
                    continue;
                }
            },
            FieldType::Number | FieldType::Money => match raw.parse::<f64>() {
                Ok(n) => FieldValue::Number(n),
                Err(_) => {
                    log::debug!("Numeric value '{}' for '{}' does not parse, skipping field", raw, attribute);
                    continue;
                }
            },
            FieldType::Text | FieldType::Url | FieldType::Checkbox => {
                FieldValue::Text(raw.clone())
            }
        };

        custom_fields.push(PayloadField {
            id: field.id.clone(),
            name: attribute.clone(),
            value,
        });
    }

    TaskPayload {
        name: snapshot.name.clone(),
        custom_fields,
    }
}

/// Memoization map for payload resolution, keyed by entity.
///
/// Lives for one enqueue invocation (or one bulk batch): the same entity
/// touched twice in one notification resolves once. Never keep one of
/// these across invocations.
#[derive(Debug, Default)]
pub struct PayloadCache {
    entries: HashMap<(EntityType, i64), TaskPayload>,
}

impl PayloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached payload for the snapshot's entity, resolving it
    /// on first access.
    pub fn get_or_resolve(
        &mut self,
        snapshot: &EntitySnapshot,
        mapping: &ListMapping,
    ) -> TaskPayload {
        self.entries
            .entry((snapshot.entity_type, snapshot.id))
            .or_insert_with(|| resolve(snapshot, mapping))
            .clone()
    }
}
