// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-process job queue.
//!
//! A transaction takes the state mutex for its whole lifetime and works on a
//! staged copy, so concurrent writers serialize and an uncommitted
//! transaction leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loom_recurring_core::TaskIdentity;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument};

use super::{JobHandle, JobId, JobQueue, NewJob, QueueTransaction};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct MemoryJobQueue {
	jobs: Arc<Mutex<Vec<JobHandle>>>,
	enabled: Arc<AtomicBool>,
}

impl Default for MemoryJobQueue {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryJobQueue {
	pub fn new() -> Self {
		Self {
			jobs: Arc::new(Mutex::new(Vec::new())),
			enabled: Arc::new(AtomicBool::new(true)),
		}
	}

	pub fn set_enabled(&self, enabled: bool) {
		self.enabled.store(enabled, Ordering::SeqCst);
	}

	/// Snapshot of every stored entry.
	pub async fn jobs(&self) -> Vec<JobHandle> {
		self.jobs.lock().await.clone()
	}

	/// Remove and return entries due at `now`, earliest first, ties broken by
	/// priority (lower first).
	#[instrument(skip(self))]
	pub async fn take_due(&self, now: DateTime<Utc>) -> Vec<JobHandle> {
		let mut jobs = self.jobs.lock().await;
		let (mut due, rest): (Vec<_>, Vec<_>) = jobs.drain(..).partition(|job| job.run_at <= now);
		*jobs = rest;
		due.sort_by_key(|job| (job.run_at, job.priority));
		for job in &mut due {
			job.attempts += 1;
		}
		debug!(count = due.len(), "delivered due jobs");
		due
	}
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
	async fn globally_enabled(&self) -> Result<bool> {
		Ok(self.enabled.load(Ordering::SeqCst))
	}

	async fn begin(&self) -> Result<Box<dyn QueueTransaction>> {
		let guard = Arc::clone(&self.jobs).lock_owned().await;
		let staged = guard.clone();
		Ok(Box::new(MemoryTransaction { guard, staged }))
	}

	async fn find_pending(&self, identity: &TaskIdentity) -> Result<Vec<JobHandle>> {
		let jobs = self.jobs.lock().await;
		Ok(jobs.iter().filter(|job| job.matches(identity)).cloned().collect())
	}
}

struct MemoryTransaction {
	guard: OwnedMutexGuard<Vec<JobHandle>>,
	staged: Vec<JobHandle>,
}

#[async_trait]
impl QueueTransaction for MemoryTransaction {
	async fn lock_identity(&mut self, _identity: &TaskIdentity) -> Result<()> {
		// The state mutex held since `begin` already excludes every writer.
		Ok(())
	}

	async fn find_pending(&mut self, identity: &TaskIdentity) -> Result<Vec<JobHandle>> {
		Ok(self.staged.iter().filter(|job| job.matches(identity)).cloned().collect())
	}

	async fn delete(&mut self, ids: &[JobId]) -> Result<u64> {
		let before = self.staged.len();
		self.staged.retain(|job| !ids.contains(&job.id));
		Ok((before - self.staged.len()) as u64)
	}

	async fn enqueue(&mut self, job: NewJob) -> Result<JobHandle> {
		let handle = job.into_handle(Utc::now());
		self.staged.push(handle.clone());
		Ok(handle)
	}

	async fn commit(self: Box<Self>) -> Result<()> {
		let MemoryTransaction { mut guard, staged } = *self;
		*guard = staged;
		Ok(())
	}

	async fn rollback(self: Box<Self>) -> Result<()> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration, TimeZone};
	use serde_json::json;

	fn new_job(identity: &str, run_at: DateTime<Utc>) -> NewJob {
		NewJob {
			identity: identity.to_string(),
			payload: json!({ "task": {}, "schedule": {} }),
			run_at,
			priority: 0,
			queue: None,
		}
	}

	fn at(h: u32) -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2014, 3, 8, h, 0, 0).unwrap()
	}

	#[tokio::test]
	async fn test_commit_publishes_staged_changes() {
		let queue = MemoryJobQueue::new();
		let mut tx = queue.begin().await.unwrap();
		tx.enqueue(new_job("MyTask", at(12))).await.unwrap();
		tx.commit().await.unwrap();

		let pending = queue.find_pending(&TaskIdentity::new("MyTask")).await.unwrap();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].run_at, at(12));
	}

	#[tokio::test]
	async fn test_drop_discards_staged_changes() {
		let queue = MemoryJobQueue::new();
		{
			let mut tx = queue.begin().await.unwrap();
			tx.enqueue(new_job("MyTask", at(12))).await.unwrap();
		}
		assert!(queue.jobs().await.is_empty());

		let mut tx = queue.begin().await.unwrap();
		tx.enqueue(new_job("MyTask", at(12))).await.unwrap();
		tx.rollback().await.unwrap();
		assert!(queue.jobs().await.is_empty());
	}

	#[tokio::test]
	async fn test_delete_counts_removed_entries() {
		let queue = MemoryJobQueue::new();
		let mut tx = queue.begin().await.unwrap();
		let first = tx.enqueue(new_job("MyTask", at(12))).await.unwrap();
		tx.enqueue(new_job("Other", at(12))).await.unwrap();
		assert_eq!(tx.delete(&[first.id, JobId::new()]).await.unwrap(), 1);
		tx.commit().await.unwrap();

		let jobs = queue.jobs().await;
		assert_eq!(jobs.len(), 1);
		assert_eq!(jobs[0].identity, "Other");
	}

	#[tokio::test]
	async fn test_take_due_delivers_in_order() {
		let queue = MemoryJobQueue::new();
		let mut tx = queue.begin().await.unwrap();
		tx.enqueue(new_job("Late", at(14))).await.unwrap();
		tx.enqueue(new_job("Second", at(11))).await.unwrap();
		tx.enqueue(new_job("First", at(10))).await.unwrap();
		tx.commit().await.unwrap();

		let due = queue.take_due(at(12)).await;
		let names: Vec<_> = due.iter().map(|job| job.identity.as_str()).collect();
		assert_eq!(names, ["First", "Second"]);
		assert!(due.iter().all(|job| job.attempts == 1));

		let remaining = queue.jobs().await;
		assert_eq!(remaining.len(), 1);
		assert_eq!(remaining[0].identity, "Late");
		assert!(queue.take_due(at(12) + Duration::minutes(30)).await.is_empty());
	}

	#[tokio::test]
	async fn test_enabled_switch() {
		let queue = MemoryJobQueue::new();
		assert!(queue.globally_enabled().await.unwrap());
		queue.set_enabled(false);
		assert!(!queue.globally_enabled().await.unwrap());
	}
}
