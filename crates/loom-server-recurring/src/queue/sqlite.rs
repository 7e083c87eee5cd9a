// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed job queue.
//!
//! Entries live in `recurring_jobs`. An entry is pending until it is deleted
//! or marked failed; an entry a worker has locked still counts. Timestamps
//! are RFC 3339 UTC with microsecond precision so they sort as text.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use loom_recurring_core::TaskIdentity;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{JobHandle, JobId, JobQueue, NewJob, QueueTransaction};
use crate::config::RecurringConfig;
use crate::error::{RecurringServerError, Result};

const SCHEMA: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS recurring_jobs (
		id TEXT PRIMARY KEY,
		identity TEXT NOT NULL,
		payload TEXT NOT NULL,
		priority INTEGER NOT NULL DEFAULT 0,
		queue TEXT,
		run_at TEXT NOT NULL,
		attempts INTEGER NOT NULL DEFAULT 0,
		locked_at TEXT,
		locked_by TEXT,
		failed_at TEXT,
		last_error TEXT,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_recurring_jobs_identity ON recurring_jobs(identity)",
	"CREATE INDEX IF NOT EXISTS idx_recurring_jobs_run_at ON recurring_jobs(run_at)",
	r#"
	CREATE TABLE IF NOT EXISTS recurring_job_locks (
		identity TEXT PRIMARY KEY,
		locked_at TEXT NOT NULL
	)
	"#,
];

const JOB_COLUMNS: &str = "id, identity, payload, priority, queue, run_at, attempts, created_at";

/// Open the queue database in WAL mode, creating the file if needed.
///
/// Tables are not created here; call [`SqliteJobQueue::init_schema`] once the
/// pool is up.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| RecurringServerError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;

	tracing::debug!("recurring queue pool created");
	Ok(pool)
}

fn timestamp(dt: DateTime<Utc>) -> String {
	dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|_| RecurringServerError::Internal(format!("Invalid {column}")))
}

#[derive(Debug, Clone)]
pub struct SqliteJobQueue {
	pool: SqlitePool,
	enabled: Arc<AtomicBool>,
}

impl SqliteJobQueue {
	pub fn new(pool: SqlitePool) -> Self {
		Self {
			pool,
			enabled: Arc::new(AtomicBool::new(true)),
		}
	}

	pub fn with_enabled(self, enabled: bool) -> Self {
		self.set_enabled(enabled);
		self
	}

	/// Flip the global switch. Clones share it.
	pub fn set_enabled(&self, enabled: bool) {
		self.enabled.store(enabled, Ordering::SeqCst);
	}

	/// Open the configured database, create the schema and apply the
	/// global switch.
	pub async fn from_config(config: &RecurringConfig) -> Result<Self> {
		let pool = create_pool(&config.database_url).await?;
		let queue = Self::new(pool).with_enabled(config.enabled);
		queue.init_schema().await?;
		Ok(queue)
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	#[instrument(skip(self))]
	pub async fn init_schema(&self) -> Result<()> {
		for statement in SCHEMA {
			sqlx::query(*statement).execute(&self.pool).await?;
		}
		debug!("recurring job schema ready");
		Ok(())
	}

	/// Pending entries due at `now` that no worker holds, earliest first.
	#[instrument(skip(self))]
	pub async fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<JobHandle>> {
		let rows = sqlx::query_as::<_, JobRow>(&format!(
			r#"
			SELECT {JOB_COLUMNS}
			FROM recurring_jobs
			WHERE failed_at IS NULL AND locked_at IS NULL AND run_at <= ?
			ORDER BY run_at ASC, priority ASC
			"#
		))
		.bind(timestamp(now))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	/// Delete a delivered entry.
	#[instrument(skip(self), fields(job_id = %id))]
	pub async fn remove(&self, id: JobId) -> Result<()> {
		let result = sqlx::query("DELETE FROM recurring_jobs WHERE id = ?")
			.bind(id.0.to_string())
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(RecurringServerError::JobNotFound(id));
		}
		Ok(())
	}

	/// Mark an entry permanently failed. It stops counting as pending.
	#[instrument(skip(self, error), fields(job_id = %id))]
	pub async fn mark_failed(&self, id: JobId, error: &str) -> Result<()> {
		let now = timestamp(Utc::now());
		let result = sqlx::query(
			r#"
			UPDATE recurring_jobs
			SET failed_at = ?, last_error = ?, attempts = attempts + 1,
				locked_at = NULL, locked_by = NULL, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(&now)
		.bind(error)
		.bind(&now)
		.bind(id.0.to_string())
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(RecurringServerError::JobNotFound(id));
		}
		debug!("job marked failed");
		Ok(())
	}

	/// Every stored entry, failed ones included.
	#[instrument(skip(self))]
	pub async fn all_jobs(&self) -> Result<Vec<JobHandle>> {
		let rows = sqlx::query_as::<_, JobRow>(&format!(
			"SELECT {JOB_COLUMNS} FROM recurring_jobs ORDER BY run_at ASC"
		))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}
}

fn pending_query() -> String {
	format!(
		r#"
		SELECT {JOB_COLUMNS}
		FROM recurring_jobs
		WHERE identity = ? AND failed_at IS NULL
		ORDER BY run_at ASC
		"#
	)
}

fn select_matching(rows: Vec<JobRow>, identity: &TaskIdentity) -> Result<Vec<JobHandle>> {
	let mut jobs = Vec::with_capacity(rows.len());
	for row in rows {
		let job = JobHandle::try_from(row)?;
		if job.matches(identity) {
			jobs.push(job);
		}
	}
	Ok(jobs)
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
	async fn globally_enabled(&self) -> Result<bool> {
		Ok(self.enabled.load(Ordering::SeqCst))
	}

	async fn begin(&self) -> Result<Box<dyn QueueTransaction>> {
		let tx = self
			.pool
			.begin()
			.await
			.map_err(|e| RecurringServerError::Transaction(e.to_string()))?;
		Ok(Box::new(SqliteQueueTransaction { tx }))
	}

	#[instrument(skip(self), fields(identity = %identity))]
	async fn find_pending(&self, identity: &TaskIdentity) -> Result<Vec<JobHandle>> {
		let rows = sqlx::query_as::<_, JobRow>(&pending_query())
			.bind(identity.type_name())
			.fetch_all(&self.pool)
			.await?;

		select_matching(rows, identity)
	}
}

struct SqliteQueueTransaction {
	tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl QueueTransaction for SqliteQueueTransaction {
	/// Writing first takes the database write lock before anything is read,
	/// so a second writer waits here instead of failing a lock upgrade later.
	#[instrument(skip(self), fields(identity = %identity))]
	async fn lock_identity(&mut self, identity: &TaskIdentity) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO recurring_job_locks (identity, locked_at)
			VALUES (?, ?)
			ON CONFLICT(identity) DO UPDATE SET locked_at = excluded.locked_at
			"#,
		)
		.bind(identity.type_name())
		.bind(timestamp(Utc::now()))
		.execute(&mut *self.tx)
		.await?;
		Ok(())
	}

	async fn find_pending(&mut self, identity: &TaskIdentity) -> Result<Vec<JobHandle>> {
		let rows = sqlx::query_as::<_, JobRow>(&pending_query())
			.bind(identity.type_name())
			.fetch_all(&mut *self.tx)
			.await?;

		select_matching(rows, identity)
	}

	async fn delete(&mut self, ids: &[JobId]) -> Result<u64> {
		let mut deleted = 0;
		for id in ids {
			let result = sqlx::query("DELETE FROM recurring_jobs WHERE id = ?")
				.bind(id.0.to_string())
				.execute(&mut *self.tx)
				.await?;
			deleted += result.rows_affected();
		}
		Ok(deleted)
	}

	#[instrument(skip(self, job), fields(identity = %job.identity, run_at = %job.run_at))]
	async fn enqueue(&mut self, job: NewJob) -> Result<JobHandle> {
		// Stored timestamps carry microseconds; hand back what a read returns.
		let mut handle = job.into_handle(Utc::now().trunc_subsecs(6));
		handle.run_at = handle.run_at.trunc_subsecs(6);
		let payload = serde_json::to_string(&handle.payload)?;
		let created_at = timestamp(handle.created_at);

		sqlx::query(
			r#"
			INSERT INTO recurring_jobs (
				id, identity, payload, priority, queue, run_at, attempts,
				created_at, updated_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(handle.id.0.to_string())
		.bind(&handle.identity)
		.bind(payload)
		.bind(handle.priority)
		.bind(&handle.queue)
		.bind(timestamp(handle.run_at))
		.bind(handle.attempts as i64)
		.bind(&created_at)
		.bind(&created_at)
		.execute(&mut *self.tx)
		.await?;

		Ok(handle)
	}

	async fn commit(self: Box<Self>) -> Result<()> {
		self
			.tx
			.commit()
			.await
			.map_err(|e| RecurringServerError::Transaction(e.to_string()))
	}

	async fn rollback(self: Box<Self>) -> Result<()> {
		self
			.tx
			.rollback()
			.await
			.map_err(|e| RecurringServerError::Transaction(e.to_string()))
	}
}

#[derive(sqlx::FromRow)]
struct JobRow {
	id: String,
	identity: String,
	payload: String,
	priority: i32,
	queue: Option<String>,
	run_at: String,
	attempts: i64,
	created_at: String,
}

impl TryFrom<JobRow> for JobHandle {
	type Error = RecurringServerError;

	fn try_from(row: JobRow) -> Result<Self> {
		Ok(JobHandle {
			id: row
				.id
				.parse()
				.map_err(|_| RecurringServerError::Internal("Invalid job ID".to_string()))?,
			identity: row.identity,
			payload: serde_json::from_str(&row.payload)?,
			run_at: parse_timestamp(&row.run_at, "run_at")?,
			priority: row.priority,
			queue: row.queue,
			attempts: row.attempts as u32,
			created_at: parse_timestamp(&row.created_at, "created_at")?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use loom_recurring_core::Discriminator;
	use serde_json::json;
	use sqlx::sqlite::SqlitePoolOptions;

	async fn test_queue() -> SqliteJobQueue {
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect("sqlite::memory:")
			.await
			.unwrap();
		let queue = SqliteJobQueue::new(pool);
		queue.init_schema().await.unwrap();
		queue
	}

	fn at(h: u32) -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2014, 3, 8, h, 0, 0).unwrap()
	}

	fn new_job(identity: &str, task: serde_json::Value, run_at: DateTime<Utc>) -> NewJob {
		NewJob {
			identity: identity.to_string(),
			payload: json!({ "task": task, "schedule": {} }),
			run_at,
			priority: 0,
			queue: None,
		}
	}

	async fn enqueue(queue: &SqliteJobQueue, job: NewJob) -> JobHandle {
		let mut tx = queue.begin().await.unwrap();
		let handle = tx.enqueue(job).await.unwrap();
		tx.commit().await.unwrap();
		handle
	}

	#[tokio::test]
	async fn test_schema_is_idempotent() {
		let queue = test_queue().await;
		queue.init_schema().await.unwrap();
		assert!(queue.all_jobs().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_enqueue_roundtrips_fields() {
		let queue = test_queue().await;
		let mut job = new_job("MyTask", json!({ "name": "nightly" }), at(12));
		job.priority = 3;
		job.queue = Some("reports".to_string());
		let handle = enqueue(&queue, job).await;

		let pending = queue.find_pending(&TaskIdentity::new("MyTask")).await.unwrap();
		assert_eq!(pending, vec![handle]);
		assert_eq!(pending[0].priority, 3);
		assert_eq!(pending[0].queue.as_deref(), Some("reports"));
		assert_eq!(pending[0].task(), &json!({ "name": "nightly" }));
	}

	#[tokio::test]
	async fn test_dropped_transaction_rolls_back() {
		let queue = test_queue().await;
		{
			let mut tx = queue.begin().await.unwrap();
			tx.lock_identity(&TaskIdentity::new("MyTask")).await.unwrap();
			tx.enqueue(new_job("MyTask", json!({}), at(12))).await.unwrap();
		}
		assert!(queue.all_jobs().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_identity_column_is_exact() {
		let queue = test_queue().await;
		enqueue(&queue, new_job("MyTask", json!({}), at(12))).await;
		enqueue(&queue, new_job("MyTas", json!({}), at(12))).await;

		let pending = queue.find_pending(&TaskIdentity::new("MyTask")).await.unwrap();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].identity, "MyTask");
	}

	#[tokio::test]
	async fn test_discriminator_matches_payload_field() {
		let queue = test_queue().await;
		enqueue(&queue, new_job("SyncAccount", json!({ "account_id": 1 }), at(12))).await;
		enqueue(&queue, new_job("SyncAccount", json!({ "account_id": 2 }), at(12))).await;

		let identity = TaskIdentity::new("SyncAccount")
			.with_discriminator(Some(Discriminator::new("account_id", 2).unwrap()));
		let pending = queue.find_pending(&identity).await.unwrap();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].task(), &json!({ "account_id": 2 }));
	}

	#[tokio::test]
	async fn test_failed_jobs_are_not_pending() {
		let queue = test_queue().await;
		let handle = enqueue(&queue, new_job("MyTask", json!({}), at(12))).await;
		queue.mark_failed(handle.id, "boom").await.unwrap();

		assert!(queue.find_pending(&TaskIdentity::new("MyTask")).await.unwrap().is_empty());
		assert!(queue.due_jobs(at(13)).await.unwrap().is_empty());

		let all = queue.all_jobs().await.unwrap();
		assert_eq!(all.len(), 1);
		assert_eq!(all[0].attempts, 1);
	}

	#[tokio::test]
	async fn test_due_jobs_and_remove() {
		let queue = test_queue().await;
		let early = enqueue(&queue, new_job("A", json!({}), at(10))).await;
		enqueue(&queue, new_job("B", json!({}), at(14))).await;

		let due = queue.due_jobs(at(12)).await.unwrap();
		assert_eq!(due, vec![early.clone()]);

		queue.remove(early.id).await.unwrap();
		assert!(queue.due_jobs(at(12)).await.unwrap().is_empty());
		assert!(matches!(
			queue.remove(early.id).await,
			Err(RecurringServerError::JobNotFound(id)) if id == early.id
		));
	}

	#[tokio::test]
	async fn test_transaction_delete_counts_rows() {
		let queue = test_queue().await;
		let first = enqueue(&queue, new_job("MyTask", json!({}), at(10))).await;
		let second = enqueue(&queue, new_job("MyTask", json!({}), at(11))).await;

		let mut tx = queue.begin().await.unwrap();
		let identity = TaskIdentity::new("MyTask");
		tx.lock_identity(&identity).await.unwrap();
		assert_eq!(tx.find_pending(&identity).await.unwrap().len(), 2);
		assert_eq!(tx.delete(&[first.id, second.id, JobId::new()]).await.unwrap(), 2);
		tx.commit().await.unwrap();

		assert!(queue.all_jobs().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_disabled_queue_reports_disabled() {
		let queue = test_queue().await.with_enabled(false);
		assert!(!queue.globally_enabled().await.unwrap());
	}

	#[tokio::test]
	async fn test_enabled_switch_is_shared_by_clones() {
		let queue = test_queue().await;
		let worker_view = queue.clone();
		assert!(worker_view.globally_enabled().await.unwrap());

		queue.set_enabled(false);
		assert!(!worker_view.globally_enabled().await.unwrap());
		queue.set_enabled(true);
		assert!(worker_view.globally_enabled().await.unwrap());
	}

	#[tokio::test]
	async fn test_timestamps_keep_microseconds() {
		let queue = test_queue().await;
		let run_at = at(12) + chrono::Duration::microseconds(123_456);
		enqueue(&queue, new_job("MyTask", json!({}), run_at)).await;

		let pending = queue.find_pending(&TaskIdentity::new("MyTask")).await.unwrap();
		assert_eq!(pending[0].run_at, run_at);
	}
}
