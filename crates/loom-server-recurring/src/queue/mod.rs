// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The job queue contract recurring scheduling runs against.
//!
//! The schedule manager needs very little from a queue: a global enable
//! switch, a lookup of pending entries by identity, and a transaction in
//! which it can delete and enqueue. Executing entries, retrying them and
//! locking them for workers belong to the queue.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loom_recurring_core::TaskIdentity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Result;

pub use memory::MemoryJobQueue;
pub use sqlite::SqliteJobQueue;

static NULL_TASK: Value = Value::Null;

/// Unique identifier for a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for JobId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for JobId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// A scheduled occurrence as stored by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
	pub id: JobId,
	/// Task type name the entry was enqueued under.
	pub identity: String,
	/// `{"task": ..., "schedule": ...}` envelope.
	pub payload: Value,
	pub run_at: DateTime<Utc>,
	pub priority: i32,
	pub queue: Option<String>,
	pub attempts: u32,
	pub created_at: DateTime<Utc>,
}

impl JobHandle {
	/// Whether this entry belongs to `identity`.
	pub fn matches(&self, identity: &TaskIdentity) -> bool {
		identity.matches(&self.identity, self.task())
	}

	/// The serialized task inside the payload envelope.
	pub fn task(&self) -> &Value {
		self.payload.get("task").unwrap_or(&NULL_TASK)
	}
}

/// An entry to enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
	pub identity: String,
	pub payload: Value,
	pub run_at: DateTime<Utc>,
	pub priority: i32,
	pub queue: Option<String>,
}

impl NewJob {
	/// Materialize the entry with a fresh id.
	pub fn into_handle(self, created_at: DateTime<Utc>) -> JobHandle {
		JobHandle {
			id: JobId::new(),
			identity: self.identity,
			payload: self.payload,
			run_at: self.run_at,
			priority: self.priority,
			queue: self.queue,
			attempts: 0,
			created_at,
		}
	}
}

/// A job queue the schedule manager can write to.
#[async_trait]
pub trait JobQueue: Send + Sync {
	/// Whether the deployment allows scheduling at all.
	async fn globally_enabled(&self) -> Result<bool>;

	/// Open a transaction. Dropping it without `commit` rolls back.
	async fn begin(&self) -> Result<Box<dyn QueueTransaction>>;

	/// Pending entries belonging to `identity`, outside any transaction.
	async fn find_pending(&self, identity: &TaskIdentity) -> Result<Vec<JobHandle>>;
}

/// Commit-or-rollback scope over a [`JobQueue`].
#[async_trait]
pub trait QueueTransaction: Send {
	/// Serialize this transaction against every other writer of the same
	/// task type, across processes where the backend allows it. Must be the
	/// first call in the transaction.
	async fn lock_identity(&mut self, identity: &TaskIdentity) -> Result<()>;

	async fn find_pending(&mut self, identity: &TaskIdentity) -> Result<Vec<JobHandle>>;

	/// Delete entries by id, returning how many existed.
	async fn delete(&mut self, ids: &[JobId]) -> Result<u64>;

	async fn enqueue(&mut self, job: NewJob) -> Result<JobHandle>;

	async fn commit(self: Box<Self>) -> Result<()>;

	async fn rollback(self: Box<Self>) -> Result<()>;
}
