//! Connection repository — the durable entity ↔ ClickUp task mapping.
//!
//! The `UNIQUE (entity_type, entity_id)` constraint is the only
//! concurrency-control primitive in the system: [`insert_if_absent`] is
//! the arbiter when two create calls race for the same entity, and the
//! loser compensates by deleting its remote task.

use rusqlite::types::Type;
use rusqlite::{params, Row};

use super::{Database, DatabaseError};
use crate::entity::EntityType;

/// A connection row. An empty `clickup_task_id` means the remote task has
/// not been created yet.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub clickup_task_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Connection {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let entity_type: String = row.get("entity_type")?;
        Ok(Self {
            id: row.get("id")?,
            entity_type: EntityType::try_from(entity_type.as_str())
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
            entity_id: row.get("entity_id")?,
            clickup_task_id: row.get("clickup_task_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Finds the connection for an entity.
pub fn get(
    db: &Database,
    entity_type: EntityType,
    entity_id: i64,
) -> Result<Option<Connection>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM connections WHERE entity_type = ?1 AND entity_id = ?2")?;
        let mut rows = stmt.query_map(
            params![entity_type.as_str(), entity_id],
            Connection::from_row,
        )?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Conditionally inserts a new connection. Returns `true` when the row was
/// inserted, `false` when a row for the entity already existed.
///
/// The check and the insert are a single statement, so two dispatchers
/// racing on the same entity get exactly one winner.
pub fn insert_if_absent(
    db: &Database,
    entity_type: EntityType,
    entity_id: i64,
    task_id: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT INTO connections (entity_type, entity_id, clickup_task_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (entity_type, entity_id) DO NOTHING",
            params![entity_type.as_str(), entity_id, task_id, now],
        )?;
        Ok(inserted == 1)
    })
}

/// Overwrites the stored task id for an existing connection.
///
/// Also the write path for the entity edit screen, where an operator can
/// point an entity at a different task or clear the link entirely.
pub fn update_task_id(
    db: &Database,
    entity_type: EntityType,
    entity_id: i64,
    task_id: &str,
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE connections SET clickup_task_id = ?3, updated_at = ?4
             WHERE entity_type = ?1 AND entity_id = ?2",
            params![entity_type.as_str(), entity_id, task_id, now],
        )?;
        Ok(changed)
    })
}

/// Query filter parameters for connection listing.
#[derive(Debug, Default, Clone)]
pub struct ConnectionFilter {
    pub entity_id: Option<i64>,
    pub clickup_task_id: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Queries connections with filters, returning (rows, total_count).
pub fn query(
    db: &Database,
    filter: &ConnectionFilter,
) -> Result<(Vec<Connection>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions: Vec<String> = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(entity_id) = filter.entity_id {
            conditions.push(format!("entity_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(entity_id));
        }
        if let Some(ref task_id) = filter.clickup_task_id {
            conditions.push(format!("clickup_task_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(task_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM connections {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM connections {} ORDER BY id DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<Connection> = stmt
            .query_map(params_ref.as_slice(), Connection::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}
