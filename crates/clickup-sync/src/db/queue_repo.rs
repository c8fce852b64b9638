//! Queue repository — CRUD operations for the `queue` table.
//!
//! One row is one outbound HTTP call. Rows move through the status
//! machine `queued → retrying → successful|failed` with `cancelled` and
//! `duplicate` as the other terminal states; terminal rows are never
//! selected for dispatch again and are only removed by [`purge`].

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{timestamp, Database, DatabaseError};
use crate::clickup::Method;
use crate::entity::EntityType;

/// Lifecycle status of a queue job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Queued,
    Retrying,
    Successful,
    Failed,
    Cancelled,
    Duplicate,
}

impl QueueStatus {
    /// Returns the canonical storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Retrying => "retrying",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Duplicate => "duplicate",
        }
    }

    /// Whether the dispatcher may still pick this job up.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Retrying)
    }

    /// Whether the job has reached a state it never leaves on its own.
    /// `failed` is terminal for the dispatcher but can be revived by an
    /// explicit operator retry.
    pub const fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl TryFrom<&str> for QueueStatus {
    type Error = ParseQueueStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "queued" => Ok(Self::Queued),
            "retrying" => Ok(Self::Retrying),
            "successful" => Ok(Self::Successful),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "duplicate" => Ok(Self::Duplicate),
            _ => Err(ParseQueueStatusError(value.to_owned())),
        }
    }
}

/// Raised when a stored queue status string is not a known variant.
#[derive(Debug, Error)]
#[error("unknown queue status '{0}'")]
pub struct ParseQueueStatusError(pub String);

/// A queue row.
#[derive(Debug, Clone)]
pub struct QueueJob {
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub request_url: String,
    pub request_method: Method,
    pub request_body: Option<String>,
    pub event_trigger: String,
    pub priority: i64,
    pub retry_count: u32,
    pub queue_status: QueueStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl QueueJob {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let entity_type: String = row.get("entity_type")?;
        let request_method: String = row.get("request_method")?;
        let queue_status: String = row.get("queue_status")?;
        Ok(Self {
            id: row.get("id")?,
            entity_type: EntityType::try_from(entity_type.as_str())
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
            entity_id: row.get("entity_id")?,
            request_url: row.get("request_url")?,
            request_method: Method::try_from(request_method.as_str())
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
            request_body: row.get("request_body")?,
            event_trigger: row.get("event_trigger")?,
            priority: row.get("priority")?,
            retry_count: row.get("retry_count")?,
            queue_status: QueueStatus::try_from(queue_status.as_str())
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Fields for a job about to be inserted. Status starts at `queued` and
/// retry_count at zero; both are owned by the dispatcher afterwards.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub request_url: String,
    pub request_method: Method,
    pub request_body: Option<String>,
    pub event_trigger: String,
    pub priority: i64,
}

/// Status buckets used by the admin list views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBucket {
    /// `queued` and `retrying`: still waiting for dispatch.
    Upcoming,
    /// `successful`, `cancelled` and `duplicate`.
    Completed,
    /// `failed` only.
    Failed,
}

impl QueueBucket {
    fn where_clause(self) -> &'static str {
        match self {
            Self::Upcoming => "queue_status IN ('queued', 'retrying')",
            Self::Completed => "queue_status IN ('successful', 'cancelled', 'duplicate')",
            Self::Failed => "queue_status = 'failed'",
        }
    }
}

/// Which terminal statuses a retention purge removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeSelect {
    /// Every terminal status.
    All,
    /// `successful`, `cancelled` and `duplicate`.
    Completed,
    /// `failed` only.
    Failed,
}

impl PurgeSelect {
    fn where_clause(self) -> &'static str {
        match self {
            Self::All => "queue_status IN ('successful', 'failed', 'cancelled', 'duplicate')",
            Self::Completed => "queue_status IN ('successful', 'cancelled', 'duplicate')",
            Self::Failed => "queue_status = 'failed'",
        }
    }
}

/// Query filter parameters for queue listing.
#[derive(Debug, Default, Clone)]
pub struct QueueFilter {
    pub bucket: Option<QueueBucket>,
    pub entity_id: Option<i64>,
    pub queue_id: Option<i64>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new job with status `queued`. Returns the assigned id.
pub fn insert(db: &Database, job: &NewJob, now: &str) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO queue (entity_type, entity_id, request_url, request_method,
             request_body, event_trigger, priority, retry_count, queue_status,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 'queued', ?8, ?8)",
            params![
                job.entity_type.as_str(),
                job.entity_id,
                job.request_url,
                job.request_method.as_str(),
                job.request_body,
                job.event_trigger,
                job.priority,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds a job by its id.
pub fn get(db: &Database, id: i64) -> Result<Option<QueueJob>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM queue WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], QueueJob::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Selects the next jobs to dispatch, up to `limit`.
///
/// Retrying rows go before queued rows so a backlog clears before new
/// work starts; within a status, higher priority first, then the newest
/// row first. Newest-first keeps the queue responsive to recent edits.
pub fn get_next(db: &Database, limit: usize) -> Result<Vec<QueueJob>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM queue WHERE queue_status IN ('queued', 'retrying')
             ORDER BY CASE queue_status WHEN 'retrying' THEN 0 ELSE 1 END,
                      priority DESC, id DESC
             LIMIT ?1",
        )?;
        let rows: Vec<QueueJob> = stmt
            .query_map(params![limit as i64], QueueJob::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Records a dispatch outcome: new status, retry count and touch time.
pub fn update_outcome(
    db: &Database,
    id: i64,
    status: QueueStatus,
    retry_count: u32,
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE queue SET queue_status = ?2, retry_count = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, status.as_str(), retry_count, now],
        )?;
        Ok(changed)
    })
}

/// Revives a failed job for another round of attempts.
///
/// Only `failed` rows transition; anything else reports zero rows so the
/// caller can surface "nothing to retry". The retry budget is reset: a
/// manual retry grants three fresh attempts.
pub fn retry_failed(db: &Database, id: i64, now: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE queue SET queue_status = 'retrying', retry_count = 0, updated_at = ?2
             WHERE id = ?1 AND queue_status = 'failed'",
            params![id, now],
        )?;
        Ok(changed)
    })
}

/// Cancels one active job. Terminal rows are untouched (zero rows).
pub fn cancel(db: &Database, id: i64, now: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE queue SET queue_status = 'cancelled', updated_at = ?2
             WHERE id = ?1 AND queue_status IN ('queued', 'retrying')",
            params![id, now],
        )?;
        Ok(changed)
    })
}

/// Cancels every active job.
pub fn cancel_all(db: &Database, now: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE queue SET queue_status = 'cancelled', updated_at = ?1
             WHERE queue_status IN ('queued', 'retrying')",
            params![now],
        )?;
        Ok(changed)
    })
}

/// Cancels active jobs for one entity. Runs before every enqueue for that
/// entity, which is what keeps at most one active job per entity.
pub fn cancel_for_entity(
    db: &Database,
    entity_type: EntityType,
    entity_id: i64,
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE queue SET queue_status = 'cancelled', updated_at = ?3
             WHERE entity_type = ?1 AND entity_id = ?2
               AND queue_status IN ('queued', 'retrying')",
            params![entity_type.as_str(), entity_id, now],
        )?;
        Ok(changed)
    })
}

/// Removes terminal rows older than `retain_days` (by last update).
///
/// Active rows are never purged regardless of age. `retain_days` of zero
/// removes every row matching the selector.
pub fn purge(
    db: &Database,
    retain_days: u32,
    select: PurgeSelect,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = if retain_days > 0 {
            let cutoff = timestamp(now - Duration::days(i64::from(retain_days)));
            conn.execute(
                &format!(
                    "DELETE FROM queue WHERE {} AND updated_at < ?1",
                    select.where_clause()
                ),
                params![cutoff],
            )?
        } else {
            conn.execute(
                &format!("DELETE FROM queue WHERE {}", select.where_clause()),
                [],
            )?
        };
        Ok(changed)
    })
}

/// Queries jobs with filters, returning (rows, total_count).
pub fn query(db: &Database, filter: &QueueFilter) -> Result<(Vec<QueueJob>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions: Vec<String> = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(bucket) = filter.bucket {
            conditions.push(bucket.where_clause().to_string());
        }
        if let Some(entity_id) = filter.entity_id {
            conditions.push(format!("entity_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(entity_id));
        }
        if let Some(queue_id) = filter.queue_id {
            conditions.push(format!("id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(queue_id));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        // Count total matching rows.
        let count_sql = format!("SELECT COUNT(*) FROM queue {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        // Fetch paginated results, newest id first like the dispatch order.
        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM queue {} ORDER BY priority DESC, id DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<QueueJob> = stmt
            .query_map(params_ref.as_slice(), QueueJob::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    const NOW: &str = "2026-01-10T00:00:00Z";

    fn sample_job(entity_id: i64) -> NewJob {
        NewJob {
            entity_type: EntityType::Post,
            entity_id,
            request_url: "https://api.clickup.com/api/v2/task/t1".to_string(),
            request_method: Method::Put,
            request_body: Some(r#"{"name":"Hello"}"#.to_string()),
            event_trigger: "post_saved".to_string(),
            priority: 0,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let db = test_db();
        let id = insert(&db, &sample_job(1), NOW).unwrap();

        let job = get(&db, id).unwrap().unwrap();
        assert_eq!(job.entity_type, EntityType::Post);
        assert_eq!(job.entity_id, 1);
        assert_eq!(job.queue_status, QueueStatus::Queued);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.request_method, Method::Put);
        assert_eq!(job.created_at, NOW);
    }

    #[test]
    fn test_get_nonexistent() {
        let db = test_db();
        assert!(get(&db, 42).unwrap().is_none());
    }

    #[test]
    fn test_get_next_orders_retrying_first_then_priority_then_newest() {
        let db = test_db();
        let low = insert(&db, &sample_job(1), NOW).unwrap();
        let high = insert(
            &db,
            &NewJob {
                priority: 2,
                ..sample_job(2)
            },
            NOW,
        )
        .unwrap();
        let newer_low = insert(&db, &sample_job(3), NOW).unwrap();
        let retrying = insert(&db, &sample_job(4), NOW).unwrap();
        update_outcome(&db, retrying, QueueStatus::Retrying, 1, NOW).unwrap();

        let next: Vec<i64> = get_next(&db, 10).unwrap().iter().map(|j| j.id).collect();
        assert_eq!(next, vec![retrying, high, newer_low, low]);
    }

    #[test]
    fn test_get_next_respects_limit() {
        let db = test_db();
        for i in 0..5 {
            insert(&db, &sample_job(i), NOW).unwrap();
        }
        assert_eq!(get_next(&db, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_get_next_skips_terminal_rows() {
        let db = test_db();
        let statuses = [
            QueueStatus::Successful,
            QueueStatus::Failed,
            QueueStatus::Cancelled,
            QueueStatus::Duplicate,
        ];
        for (i, status) in statuses.into_iter().enumerate() {
            let id = insert(&db, &sample_job(i as i64), NOW).unwrap();
            update_outcome(&db, id, status, 0, NOW).unwrap();
        }

        assert!(get_next(&db, 10).unwrap().is_empty());
    }

    #[test]
    fn test_cancel_for_entity_keeps_single_active_job() {
        let db = test_db();
        let first = insert(&db, &sample_job(7), NOW).unwrap();
        cancel_for_entity(&db, EntityType::Post, 7, NOW).unwrap();
        let second = insert(&db, &sample_job(7), NOW).unwrap();

        let (active, total) = query(
            &db,
            &QueueFilter {
                bucket: Some(QueueBucket::Upcoming),
                entity_id: Some(7),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(active[0].id, second);
        assert_eq!(
            get(&db, first).unwrap().unwrap().queue_status,
            QueueStatus::Cancelled
        );
    }

    #[test]
    fn test_cancel_for_entity_ignores_other_entities() {
        let db = test_db();
        insert(&db, &sample_job(1), NOW).unwrap();
        insert(
            &db,
            &NewJob {
                entity_type: EntityType::Term,
                ..sample_job(1)
            },
            NOW,
        )
        .unwrap();

        let changed = cancel_for_entity(&db, EntityType::Post, 1, NOW).unwrap();
        assert_eq!(changed, 1);
    }

    #[test]
    fn test_cancel_terminal_job_reports_zero_rows() {
        let db = test_db();
        let id = insert(&db, &sample_job(1), NOW).unwrap();
        update_outcome(&db, id, QueueStatus::Successful, 0, NOW).unwrap();

        assert_eq!(cancel(&db, id, NOW).unwrap(), 0);
    }

    #[test]
    fn test_cancel_all() {
        let db = test_db();
        for i in 0..3 {
            insert(&db, &sample_job(i), NOW).unwrap();
        }
        let done = insert(&db, &sample_job(9), NOW).unwrap();
        update_outcome(&db, done, QueueStatus::Successful, 0, NOW).unwrap();

        assert_eq!(cancel_all(&db, NOW).unwrap(), 3);
        assert!(get_next(&db, 10).unwrap().is_empty());
    }

    #[test]
    fn test_retry_failed_resets_budget() {
        let db = test_db();
        let id = insert(&db, &sample_job(1), NOW).unwrap();
        update_outcome(&db, id, QueueStatus::Failed, 2, NOW).unwrap();

        assert_eq!(retry_failed(&db, id, NOW).unwrap(), 1);
        let job = get(&db, id).unwrap().unwrap();
        assert_eq!(job.queue_status, QueueStatus::Retrying);
        assert_eq!(job.retry_count, 0);
    }

    #[test]
    fn test_retry_only_applies_to_failed() {
        let db = test_db();
        let id = insert(&db, &sample_job(1), NOW).unwrap();
        update_outcome(&db, id, QueueStatus::Successful, 0, NOW).unwrap();

        assert_eq!(retry_failed(&db, id, NOW).unwrap(), 0);
    }

    #[test]
    fn test_purge_spares_active_rows_and_honors_age() {
        let db = test_db();
        let now: DateTime<Utc> = "2026-02-01T00:00:00Z".parse().unwrap();

        // Old active row: must survive any purge.
        insert(&db, &sample_job(1), "2025-11-01T00:00:00Z").unwrap();
        // Old terminal row: purged.
        let old_done = insert(&db, &sample_job(2), "2025-11-01T00:00:00Z").unwrap();
        update_outcome(&db, old_done, QueueStatus::Successful, 0, "2025-11-01T00:00:00Z").unwrap();
        // Fresh terminal row: retained by the 30 day window.
        let fresh_done = insert(&db, &sample_job(3), "2026-01-25T00:00:00Z").unwrap();
        update_outcome(&db, fresh_done, QueueStatus::Failed, 2, "2026-01-25T00:00:00Z").unwrap();

        let removed = purge(&db, 30, PurgeSelect::All, now).unwrap();
        assert_eq!(removed, 1);
        assert!(get(&db, old_done).unwrap().is_none());
        assert!(get(&db, fresh_done).unwrap().is_some());

        let (_, total) = query(&db, &QueueFilter::default()).unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_purge_selector_failed_only() {
        let db = test_db();
        let now: DateTime<Utc> = "2026-02-01T00:00:00Z".parse().unwrap();
        let ts = "2025-11-01T00:00:00Z";

        let done = insert(&db, &sample_job(1), ts).unwrap();
        update_outcome(&db, done, QueueStatus::Successful, 0, ts).unwrap();
        let failed = insert(&db, &sample_job(2), ts).unwrap();
        update_outcome(&db, failed, QueueStatus::Failed, 2, ts).unwrap();

        assert_eq!(purge(&db, 30, PurgeSelect::Failed, now).unwrap(), 1);
        assert!(get(&db, done).unwrap().is_some());
        assert!(get(&db, failed).unwrap().is_none());
    }

    #[test]
    fn test_purge_zero_days_removes_all_terminal() {
        let db = test_db();
        let now: DateTime<Utc> = "2026-02-01T00:00:00Z".parse().unwrap();

        let done = insert(&db, &sample_job(1), NOW).unwrap();
        update_outcome(&db, done, QueueStatus::Cancelled, 0, NOW).unwrap();
        insert(&db, &sample_job(2), NOW).unwrap();

        assert_eq!(purge(&db, 0, PurgeSelect::All, now).unwrap(), 1);
    }

    #[test]
    fn test_query_buckets() {
        let db = test_db();
        insert(&db, &sample_job(1), NOW).unwrap();
        let failed = insert(&db, &sample_job(2), NOW).unwrap();
        update_outcome(&db, failed, QueueStatus::Failed, 2, NOW).unwrap();
        let done = insert(&db, &sample_job(3), NOW).unwrap();
        update_outcome(&db, done, QueueStatus::Duplicate, 0, NOW).unwrap();

        let buckets = [
            (QueueBucket::Upcoming, 1),
            (QueueBucket::Failed, 1),
            (QueueBucket::Completed, 1),
        ];
        for (bucket, expected) in buckets {
            let (_, total) = query(
                &db,
                &QueueFilter {
                    bucket: Some(bucket),
                    ..Default::default()
                },
            )
            .unwrap();
            assert_eq!(total, expected, "bucket {bucket:?}");
        }
    }

    #[test]
    fn test_query_pagination() {
        let db = test_db();
        for i in 0..10 {
            insert(&db, &sample_job(i), NOW).unwrap();
        }

        let (rows, total) = query(
            &db,
            &QueueFilter {
                limit: Some(3),
                offset: Some(0),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 10);
        assert_eq!(rows.len(), 3);
    }
}
