//! Turns entity-change notifications into queue jobs.
//!
//! The enqueue path never talks to the network: it resolves the entity,
//! cancels superseded jobs and writes one queue row per HTTP call the
//! change requires. The dispatcher drains those rows later.

use std::sync::Arc;

use chrono::Utc;

use crate::clickup::{FieldValue, Query};
use crate::config::SyncConfig;
use crate::db::queue_repo::{self, NewJob};
use crate::db::{connection_repo, timestamp, Database};
use crate::entity::{EntityProvider, EntityRef, EntityType};
use crate::error::Result;
use crate::sync::payload::PayloadCache;
use crate::sync::trigger;

/// Priority for whole-site resyncs: below everything organic, so a bulk
/// run never starves live edits.
pub const BULK_SYNC_PRIORITY: i64 = -2;

/// Reacts to entity-change notifications by writing queue jobs.
pub struct Enqueuer<P> {
    config: Arc<SyncConfig>,
    db: Database,
    provider: P,
    query: Query,
}

impl<P: EntityProvider> Enqueuer<P> {
    pub fn new(config: Arc<SyncConfig>, db: Database, provider: P) -> Self {
        Self {
            config,
            db,
            provider,
            query: Query::new(),
        }
    }

    /// Handles one entity change.
    ///
    /// Silently does nothing when the entity's subtype has no list mapping
    /// or the entity cannot be loaded any more; both are normal in a busy
    /// site, not errors. Otherwise cancels the entity's active jobs and
    /// inserts the replacement calls. Returns how many jobs were inserted.
    ///
    /// `field_limit` restricts which mapped custom fields are updated
    /// (by attribute name); it has no effect on task creation, which
    /// always carries every field. `cache` must not outlive this change
    /// notification (or the bulk batch it belongs to).
    pub fn entity_changed(
        &self,
        entity_type: EntityType,
        entity_ref: EntityRef,
        event_trigger: &str,
        priority: i64,
        field_limit: Option<&[&str]>,
        cache: &mut PayloadCache,
    ) -> Result<usize> {
        let snapshot = match entity_ref {
            EntityRef::Snapshot(snapshot) => snapshot,
            EntityRef::Id(id) => match self.provider.snapshot(entity_type, id) {
                Some(snapshot) => snapshot,
                None => {
                    log::debug!(
                        "{} {} not loadable (deleted?), skipping enqueue",
                        entity_type.as_str(),
                        id
                    );
                    return Ok(0);
                }
            },
        };

        let Some(mapping) = self.config.list_for(entity_type, &snapshot.subtype) else {
            return Ok(0);
        };

        let payload = cache.get_or_resolve(&snapshot, mapping);

        let connection = connection_repo::get(&self.db, entity_type, snapshot.id)?;
        let task_id = connection.map(|c| c.clickup_task_id).unwrap_or_default();

        let now = timestamp(Utc::now());

        // Whatever was still pending for this entity is now stale.
        queue_repo::cancel_for_entity(&self.db, entity_type, snapshot.id, &now)?;

        let mut requests = Vec::new();
        if task_id.is_empty() {
            // No deletion trigger may create a task: the entity's metadata
            // may already be gone at that point.
            if !trigger::is_deletion(event_trigger) {
                let fields: Vec<(String, FieldValue)> = payload
                    .custom_fields
                    .iter()
                    .map(|f| (f.id.clone(), f.value.clone()))
                    .collect();
                requests.push(self.query.create_task(&mapping.list_id, &payload.name, &fields));
            }
        } else {
            requests.push(self.query.update_task(&task_id, &payload.name));
            // The API updates custom fields one call at a time.
            for field in &payload.custom_fields {
                if let Some(limit) = field_limit {
                    if !limit.contains(&field.name.as_str()) {
                        continue;
                    }
                }
                requests.push(
                    self.query
                        .update_custom_field(&task_id, &field.id, &field.value),
                );
            }
        }

        let mut priority = priority;
        // Single-field updates (status flips and the like) jump ahead of
        // bulk field updates.
        if field_limit.is_some_and(|limit| limit.len() <= 1) {
            priority += 1;
        }
        // Task creation goes first too: custom-field updates for this
        // entity depend on the connection row it will write.
        if task_id.is_empty() {
            priority += 1;
        }

        let mut inserted = 0;
        for request in requests {
            let request_body = match request.body.as_ref().map(serde_json::to_string).transpose() {
                Ok(body) => body,
                Err(e) => {
                    log::warn!(
                        "Skipping call {} for {} {}: body serialization failed: {}",
                        request.url,
                        entity_type.as_str(),
                        snapshot.id,
                        e
                    );
                    continue;
                }
            };

            queue_repo::insert(
                &self.db,
                &NewJob {
                    entity_type,
                    entity_id: snapshot.id,
                    request_url: request.url,
                    request_method: request.method,
                    request_body,
                    event_trigger: event_trigger.to_string(),
                    priority,
                },
                &now,
            )?;
            inserted += 1;
        }

        if inserted > 0 {
            log::debug!(
                "Queued {} call(s) for {} {} ({})",
                inserted,
                entity_type.as_str(),
                snapshot.id,
                event_trigger
            );
        }

        Ok(inserted)
    }

    /// Enqueues every given entity for a whole-site resync.
    ///
    /// One payload cache spans the batch. Entities that fail to enqueue
    /// are logged and skipped; the batch keeps going. Returns the total
    /// number of jobs inserted.
    pub fn resync_all<I>(&self, entities: I) -> Result<usize>
    where
        I: IntoIterator<Item = (EntityType, i64)>,
    {
        let mut cache = PayloadCache::new();
        let mut total = 0;
        for (entity_type, entity_id) in entities {
            match self.entity_changed(
                entity_type,
                EntityRef::Id(entity_id),
                trigger::MANUAL_BULK_SYNC,
                BULK_SYNC_PRIORITY,
                None,
                &mut cache,
            ) {
                Ok(inserted) => total += inserted,
                Err(e) => {
                    log::error!(
                        "Bulk resync failed for {} {}: {}",
                        entity_type.as_str(),
                        entity_id,
                        e
                    );
                }
            }
        }
        Ok(total)
    }
}
