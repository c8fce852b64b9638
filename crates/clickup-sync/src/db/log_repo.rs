//! Log repository — append-only delivery-attempt history.
//!
//! One row per dispatch attempt, not per job. `queue_id` deliberately has
//! no foreign key: queue rows are purged on their own schedule and a log
//! row may outlive its job.

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Row};

use super::queue_repo::QueueStatus;
use super::{timestamp, Database, DatabaseError};
use crate::entity::EntityType;

/// A log row.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: i64,
    pub queue_id: i64,
    /// HTTP status of the attempt; 0 means the request never got a
    /// response (transport-level failure).
    pub response_code: u32,
    pub response_message: String,
    /// Job status resulting from this attempt.
    pub queue_status: QueueStatus,
    pub created_at: String,
}

impl LogEntry {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let queue_status: String = row.get("queue_status")?;
        Ok(Self {
            id: row.get("id")?,
            queue_id: row.get("queue_id")?,
            response_code: row.get("response_code")?,
            response_message: row.get("response_message")?,
            queue_status: QueueStatus::try_from(queue_status.as_str())
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
            created_at: row.get("created_at")?,
        })
    }
}

/// A log row joined with its queue row, for the detailed admin view.
/// The queue side is `None` when the job has already been purged.
#[derive(Debug, Clone)]
pub struct WideLogEntry {
    pub log: LogEntry,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<i64>,
    pub request_url: Option<String>,
    pub request_method: Option<String>,
    pub event_trigger: Option<String>,
}

impl WideLogEntry {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let entity_type: Option<String> = row.get("entity_type")?;
        Ok(Self {
            log: LogEntry::from_row(row)?,
            entity_type: entity_type
                .as_deref()
                .map(EntityType::try_from)
                .transpose()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
            entity_id: row.get("entity_id")?,
            request_url: row.get("request_url")?,
            request_method: row.get("request_method")?,
            event_trigger: row.get("event_trigger")?,
        })
    }
}

/// Outcome buckets used by the admin list views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    /// Attempts that came back with HTTP 200.
    Successful,
    /// Everything else, including transport failures (code 0).
    Unsuccessful,
}

impl LogOutcome {
    fn where_clause(self) -> &'static str {
        match self {
            Self::Successful => "response_code = 200",
            Self::Unsuccessful => "response_code != 200",
        }
    }
}

/// Query filter parameters for log listing.
#[derive(Debug, Default, Clone)]
pub struct LogFilter {
    pub outcome: Option<LogOutcome>,
    pub queue_id: Option<i64>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Appends one attempt record.
pub fn add(
    db: &Database,
    queue_id: i64,
    response_code: u32,
    response_message: &str,
    queue_status: QueueStatus,
    now: &str,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO logs (queue_id, response_code, response_message, queue_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                queue_id,
                response_code,
                response_message,
                queue_status.as_str(),
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Removes log rows older than `retain_days`. Zero removes everything.
pub fn purge(db: &Database, retain_days: u32, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = if retain_days > 0 {
            let cutoff = timestamp(now - Duration::days(i64::from(retain_days)));
            conn.execute("DELETE FROM logs WHERE created_at < ?1", params![cutoff])?
        } else {
            conn.execute("DELETE FROM logs", [])?
        };
        Ok(changed)
    })
}

/// Queries log rows with filters, returning (rows, total_count).
pub fn query(db: &Database, filter: &LogFilter) -> Result<(Vec<LogEntry>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let (where_clause, param_values) = build_where(filter);

        let count_sql = format!("SELECT COUNT(*) FROM logs {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let (query_sql, param_values) = paginate(
            format!("SELECT * FROM logs {}", where_clause),
            param_values,
            filter,
        );
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<LogEntry> = stmt
            .query_map(params_ref.as_slice(), LogEntry::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Queries log rows joined with their queue rows, returning (rows, total).
pub fn query_wide(
    db: &Database,
    filter: &LogFilter,
) -> Result<(Vec<WideLogEntry>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let (where_clause, param_values) = build_where(filter);

        let count_sql = format!("SELECT COUNT(*) FROM logs {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let select = format!(
            "SELECT logs.*, queue.entity_type, queue.entity_id, queue.request_url,
             queue.request_method, queue.event_trigger
             FROM logs LEFT JOIN queue ON queue.id = logs.queue_id {}",
            where_clause
        );
        let (query_sql, param_values) = paginate(select, param_values, filter);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<WideLogEntry> = stmt
            .query_map(params_ref.as_slice(), WideLogEntry::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

fn build_where(filter: &LogFilter) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(outcome) = filter.outcome {
        conditions.push(outcome.where_clause().to_string());
    }
    if let Some(queue_id) = filter.queue_id {
        conditions.push(format!("logs.queue_id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(queue_id));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (where_clause, param_values)
}

fn paginate(
    select: String,
    mut param_values: Vec<Box<dyn rusqlite::types::ToSql>>,
    filter: &LogFilter,
) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
    let limit = filter.limit.unwrap_or(100) as i64;
    let offset = filter.offset.unwrap_or(0) as i64;
    param_values.push(Box::new(limit));
    param_values.push(Box::new(offset));
    let sql = format!(
        "{} ORDER BY logs.id DESC LIMIT ?{} OFFSET ?{}",
        select,
        param_values.len() - 1,
        param_values.len()
    );
    (sql, param_values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clickup::Method;
    use crate::db::queue_repo::{self, NewJob};

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    const NOW: &str = "2026-01-10T00:00:00Z";

    #[test]
    fn test_add_and_query() {
        let db = test_db();
        add(&db, 1, 200, "{}", QueueStatus::Successful, NOW).unwrap();
        add(&db, 1, 500, "server error", QueueStatus::Retrying, NOW).unwrap();
        add(&db, 2, 0, "connection refused", QueueStatus::Retrying, NOW).unwrap();

        let (rows, total) = query(&db, &LogFilter::default()).unwrap();
        assert_eq!(total, 3);
        assert_eq!(rows.len(), 3);

        let (_, successful) = query(
            &db,
            &LogFilter {
                outcome: Some(LogOutcome::Successful),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(successful, 1);

        let (rows, unsuccessful) = query(
            &db,
            &LogFilter {
                outcome: Some(LogOutcome::Unsuccessful),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(unsuccessful, 2);
        // Transport failures are recorded as code 0.
        assert!(rows.iter().any(|r| r.response_code == 0));
    }

    #[test]
    fn test_query_by_queue_id() {
        let db = test_db();
        add(&db, 1, 200, "{}", QueueStatus::Successful, NOW).unwrap();
        add(&db, 2, 200, "{}", QueueStatus::Successful, NOW).unwrap();

        let (rows, total) = query(
            &db,
            &LogFilter {
                queue_id: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].queue_id, 2);
    }

    #[test]
    fn test_purge_by_age() {
        let db = test_db();
        let now: DateTime<Utc> = "2026-02-01T00:00:00Z".parse().unwrap();
        add(&db, 1, 200, "{}", QueueStatus::Successful, "2025-11-01T00:00:00Z").unwrap();
        add(&db, 2, 200, "{}", QueueStatus::Successful, "2026-01-25T00:00:00Z").unwrap();

        assert_eq!(purge(&db, 30, now).unwrap(), 1);
        let (_, total) = query(&db, &LogFilter::default()).unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_purge_zero_days_removes_everything() {
        let db = test_db();
        let now: DateTime<Utc> = "2026-02-01T00:00:00Z".parse().unwrap();
        add(&db, 1, 200, "{}", QueueStatus::Successful, NOW).unwrap();

        assert_eq!(purge(&db, 0, now).unwrap(), 1);
    }

    #[test]
    fn test_query_wide_joins_queue_row() {
        let db = test_db();
        let queue_id = queue_repo::insert(
            &db,
            &NewJob {
                entity_type: crate::entity::EntityType::Post,
                entity_id: 42,
                request_url: "https://api.clickup.com/api/v2/task/t1".to_string(),
                request_method: Method::Put,
                request_body: None,
                event_trigger: "post_saved".to_string(),
                priority: 0,
            },
            NOW,
        )
        .unwrap();
        add(&db, queue_id, 200, "{}", QueueStatus::Successful, NOW).unwrap();
        // Orphan log referencing a purged job.
        add(&db, 999, 404, "not found", QueueStatus::Failed, NOW).unwrap();

        let (rows, total) = query_wide(&db, &LogFilter::default()).unwrap();
        assert_eq!(total, 2);

        let joined = rows.iter().find(|r| r.log.queue_id == queue_id).unwrap();
        assert_eq!(joined.entity_id, Some(42));
        assert_eq!(joined.event_trigger.as_deref(), Some("post_saved"));

        let orphan = rows.iter().find(|r| r.log.queue_id == 999).unwrap();
        assert!(orphan.entity_type.is_none());
        assert!(orphan.request_url.is_none());
    }
}
