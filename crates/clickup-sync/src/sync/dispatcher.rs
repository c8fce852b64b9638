//! Drains the queue against the ClickUp API.
//!
//! Each cycle takes up to the configured number of jobs and executes them
//! one by one. Outcomes are recorded on the job row and in the log table;
//! nothing in here throws past the cycle boundary for a delivery failure.

use std::sync::Arc;

use chrono::Utc;

use crate::clickup::{ApiRequest, Query, Transport};
use crate::config::SyncConfig;
use crate::db::queue_repo::{self, PurgeSelect, QueueJob, QueueStatus};
use crate::db::{connection_repo, log_repo, timestamp, Database};
use crate::error::Result;

/// Attempts after the first before a job is given up as failed.
const MAX_RETRIES: u32 = 2;

/// Executes queued jobs and applies their outcomes.
pub struct Dispatcher<T> {
    config: Arc<SyncConfig>,
    db: Database,
    transport: T,
    query: Query,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(config: Arc<SyncConfig>, db: Database, transport: T) -> Self {
        Self {
            config,
            db,
            transport,
            query: Query::new(),
        }
    }

    /// Runs one dispatch cycle: selects up to the configured number of
    /// active jobs and syncs each. Returns how many jobs were attempted.
    pub async fn run_cycle(&self) -> Result<usize> {
        let jobs = queue_repo::get_next(&self.db, self.config.requests_per_minute)?;
        let count = jobs.len();
        for job in jobs {
            self.sync_item(&job).await?;
        }
        Ok(count)
    }

    /// Syncs one job by id, regardless of the schedule. Admin "sync now".
    /// Returns `None` when no such job exists.
    pub async fn sync_one(&self, queue_id: i64) -> Result<Option<QueueStatus>> {
        match queue_repo::get(&self.db, queue_id)? {
            Some(job) => Ok(Some(self.sync_item(&job).await?)),
            None => Ok(None),
        }
    }

    /// Executes one job and persists the outcome. Returns the status the
    /// job ended up in.
    pub async fn sync_item(&self, job: &QueueJob) -> Result<QueueStatus> {
        let request = ApiRequest {
            method: job.request_method,
            url: job.request_url.clone(),
            body: job
                .request_body
                .as_deref()
                .and_then(|body| serde_json::from_str(body).ok()),
        };

        let (response_code, response_message) =
            match self.transport.execute(&request, &self.config.api_key).await {
                Ok(response) => (u32::from(response.status), response.body),
                Err(e) => (0, e.to_string()),
            };

        let mut retry_count = job.retry_count;
        let mut status = if response_code == 200 {
            QueueStatus::Successful
        } else if retry_count < MAX_RETRIES {
            retry_count += 1;
            QueueStatus::Retrying
        } else {
            QueueStatus::Failed
        };

        // A 200 from the create-task endpoint must carry the new task id;
        // that id is what links the entity to its task from now on.
        if response_code == 200
            && job.request_method == crate::clickup::Method::Post
            && self.query.is_create_task_url(&job.request_url)
        {
            match parse_task_id(&response_message) {
                None => {
                    // A create "success" without an id would leave the
                    // connection empty forever. Treat it as a failure.
                    status = QueueStatus::Failed;
                }
                Some(task_id) => {
                    if let Some(resolved) = self.record_connection(job, &task_id).await? {
                        status = resolved;
                    }
                }
            }
        }

        let now = timestamp(Utc::now());
        queue_repo::update_outcome(&self.db, job.id, status, retry_count, &now)?;
        log_repo::add(
            &self.db,
            job.id,
            response_code,
            &response_message,
            status,
            &now,
        )?;

        match status {
            QueueStatus::Successful => {
                log::debug!("Job {} delivered", job.id);
            }
            QueueStatus::Retrying => {
                log::info!(
                    "Job {} got {} ({}), retry {}/{}",
                    job.id,
                    response_code,
                    truncate(&response_message),
                    retry_count,
                    MAX_RETRIES
                );
            }
            other => {
                log::warn!(
                    "Job {} ended as {} with {} ({})",
                    job.id,
                    other.as_str(),
                    response_code,
                    truncate(&response_message)
                );
            }
        }

        Ok(status)
    }

    /// Stores the entity → task link after a successful create call.
    ///
    /// The connection table's uniqueness constraint decides races: the
    /// first writer wins. A loser whose stored id is still empty fills it
    /// in; a loser against a live id marks its job `duplicate` and deletes
    /// the task it just created, so exactly one remote task survives.
    async fn record_connection(&self, job: &QueueJob, task_id: &str) -> Result<Option<QueueStatus>> {
        let now = timestamp(Utc::now());
        let inserted = connection_repo::insert_if_absent(
            &self.db,
            job.entity_type,
            job.entity_id,
            task_id,
            &now,
        )?;
        if inserted {
            return Ok(None);
        }

        let existing = connection_repo::get(&self.db, job.entity_type, job.entity_id)?;
        let connected_id = existing.map(|c| c.clickup_task_id).unwrap_or_default();
        if connected_id.is_empty() {
            connection_repo::update_task_id(&self.db, job.entity_type, job.entity_id, task_id, &now)?;
            return Ok(None);
        }

        // Two creates landed for one entity. Best-effort cleanup of the
        // losing task; its own outcome is not tracked further.
        let delete = self.query.delete_task(task_id);
        if let Err(e) = self.transport.execute(&delete, &self.config.api_key).await {
            log::warn!("Could not delete duplicate task {}: {}", task_id, e);
        }
        Ok(Some(QueueStatus::Duplicate))
    }

    /// Revives a failed job with a fresh retry budget. Returns the number
    /// of affected rows, zero when the job is not in `failed`.
    pub fn retry(&self, queue_id: i64) -> Result<usize> {
        let now = timestamp(Utc::now());
        Ok(queue_repo::retry_failed(&self.db, queue_id, &now)?)
    }

    /// Cancels one active job. Returns the number of affected rows.
    pub fn cancel(&self, queue_id: i64) -> Result<usize> {
        let now = timestamp(Utc::now());
        Ok(queue_repo::cancel(&self.db, queue_id, &now)?)
    }

    /// Cancels every active job. Returns the number of affected rows.
    pub fn cancel_all(&self) -> Result<usize> {
        let now = timestamp(Utc::now());
        Ok(queue_repo::cancel_all(&self.db, &now)?)
    }

    /// Applies the configured retention to the queue and log tables.
    /// Returns (queue rows removed, log rows removed).
    pub fn purge_expired(&self) -> Result<(usize, usize)> {
        let now = Utc::now();
        let queue_removed =
            queue_repo::purge(&self.db, self.config.queue_retain_days, PurgeSelect::All, now)?;
        let logs_removed = log_repo::purge(&self.db, self.config.log_retain_days, now)?;
        Ok((queue_removed, logs_removed))
    }
}

/// Pulls the created task id out of a create-call response body. ClickUp
/// returns string ids, but a numeric id is accepted for robustness.
fn parse_task_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("id") {
        Some(serde_json::Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(serde_json::Value::Number(id)) => Some(id.to_string()),
        _ => None,
    }
}

fn truncate(message: &str) -> &str {
    let cut = message
        .char_indices()
        .nth(120)
        .map_or(message.len(), |(i, _)| i);
    &message[..cut]
}
