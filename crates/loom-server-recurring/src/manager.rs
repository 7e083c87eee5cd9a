// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The schedule manager: keeps exactly one pending occurrence per task.
//!
//! Every write merges the call's options over the instance's stored schedule
//! state, resolves the next run, then replaces whatever is pending for the
//! task's identity with one new entry inside a single queue transaction held
//! under the identity lock.

use chrono_tz::Tz;
use loom_recurring_core::{
	next_run, Anchor, RecurringError, ScheduleOptions, TaskClassConfig, TaskIdentity,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::clock::{Clock, SystemClock};
use crate::config::RecurringConfig;
use crate::error::{RecurringServerError, Result};
use crate::locks::IdentityLocks;
use crate::queue::{JobHandle, JobId, JobQueue, NewJob, QueueTransaction};

/// A unit of work that re-enqueues itself after every run.
///
/// The task value is serialized into the queue payload, so anything it needs
/// at execution time must be part of its fields.
pub trait RecurringTask: Serialize + DeserializeOwned + Send + Sync {
	/// Schedule declarations shared by every instance of this type.
	fn class() -> &'static TaskClassConfig;
}

/// A task instance together with the schedule state it was enqueued with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask<T> {
	pub task: T,
	#[serde(default)]
	pub schedule: ScheduleOptions,
}

#[derive(Serialize)]
struct Envelope<'a, T> {
	task: &'a T,
	schedule: &'a ScheduleOptions,
}

impl<T: RecurringTask> ScheduledTask<T> {
	pub fn new(task: T) -> Self {
		Self {
			task,
			schedule: ScheduleOptions::default(),
		}
	}

	/// Decode a queue payload envelope.
	pub fn from_payload(payload: &Value) -> Result<Self> {
		Ok(Self::deserialize(payload)?)
	}

	pub fn identity(&self) -> TaskIdentity {
		self.schedule.identity(T::class())
	}

	/// Hook for a run that completed: schedule the next one.
	pub async fn on_success(&mut self, manager: &ScheduleManager) -> Result<JobHandle> {
		manager.reschedule(self, ScheduleOptions::default()).await
	}

	/// Hook for a run that failed. The cadence does not change on failure,
	/// so this also schedules the next regular run.
	pub async fn on_failure(&mut self, manager: &ScheduleManager) -> Result<JobHandle> {
		manager.reschedule(self, ScheduleOptions::default()).await
	}
}

/// How a delivered run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Succeeded,
	Failed,
}

/// A resolved occurrence waiting to be written.
struct PendingWrite {
	state: ScheduleOptions,
	identity: TaskIdentity,
	job: NewJob,
}

#[derive(Clone)]
pub struct ScheduleManager {
	queue: Arc<dyn JobQueue>,
	default_zone: Tz,
	clock: Arc<dyn Clock>,
	locks: IdentityLocks,
}

impl ScheduleManager {
	pub fn new(queue: Arc<dyn JobQueue>) -> Self {
		Self {
			queue,
			default_zone: Tz::UTC,
			clock: Arc::new(SystemClock),
			locks: IdentityLocks::new(),
		}
	}

	pub fn from_config(queue: Arc<dyn JobQueue>, config: &RecurringConfig) -> Self {
		Self::new(queue).with_default_zone(config.default_timezone)
	}

	/// Zone for schedules that declare none.
	pub fn with_default_zone(mut self, zone: Tz) -> Self {
		self.default_zone = zone;
		self
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn default_zone(&self) -> Tz {
		self.default_zone
	}

	pub fn queue(&self) -> &Arc<dyn JobQueue> {
		&self.queue
	}

	/// Start the schedule unless it is already running.
	///
	/// Returns `None` without writing when scheduling is globally
	/// disabled or a pending occurrence for the identity already exists. The
	/// pending check runs under the identity lock, so of several concurrent
	/// calls exactly one enqueues.
	#[instrument(skip(self, task, options), fields(task = T::class().name()))]
	pub async fn schedule<T: RecurringTask>(
		&self,
		task: T,
		options: ScheduleOptions,
	) -> Result<Option<JobHandle>> {
		if !self.queue.globally_enabled().await? {
			debug!("scheduling globally disabled, skipping");
			return Ok(None);
		}

		let mut scheduled = ScheduledTask::new(task);
		let pending = self.prepare(&scheduled, options)?;

		let _guard = self.locks.acquire(pending.identity.type_name()).await;
		let mut tx = self.queue.begin().await?;
		tx.lock_identity(&pending.identity).await?;
		if !tx.find_pending(&pending.identity).await?.is_empty() {
			tx.rollback().await?;
			debug!(identity = %pending.identity, "already scheduled, skipping");
			return Ok(None);
		}

		let handle = self.replace(tx, &mut scheduled, pending).await?;
		Ok(Some(handle))
	}

	/// Replace every pending occurrence of the task's identity with one new
	/// occurrence at the next resolved run time.
	///
	/// On success the instance's schedule state holds the merged options and
	/// the advanced anchors. On error nothing is written and the state is
	/// left as it was.
	#[instrument(skip(self, scheduled, options), fields(task = T::class().name()))]
	pub async fn reschedule<T: RecurringTask>(
		&self,
		scheduled: &mut ScheduledTask<T>,
		options: ScheduleOptions,
	) -> Result<JobHandle> {
		let pending = self.prepare(scheduled, options)?;

		let _guard = self.locks.acquire(pending.identity.type_name()).await;
		let mut tx = self.queue.begin().await?;
		tx.lock_identity(&pending.identity).await?;
		self.replace(tx, scheduled, pending).await
	}

	/// Merge, resolve and encode the next occurrence without touching the
	/// queue.
	fn prepare<T: RecurringTask>(
		&self,
		scheduled: &ScheduledTask<T>,
		options: ScheduleOptions,
	) -> Result<PendingWrite> {
		let class = T::class();
		let mut state = scheduled.schedule.clone();
		state.merge(options);

		let spec = state.finalize(class);
		let identity = state.identity(class);
		let resolution = next_run(&spec, self.default_zone, self.clock.now())?;
		if let Some(anchors) = resolution.anchors {
			state.anchors = Some(anchors.into_iter().map(Anchor::At).collect());
		}

		let payload = serde_json::to_value(Envelope {
			task: &scheduled.task,
			schedule: &state,
		})?;
		if let Some(discriminator) = identity.discriminator() {
			if !discriminator.matches(&payload["task"]) {
				return Err(RecurringError::InvalidDiscriminator(format!(
					"{identity} does not describe the task being scheduled"
				))
				.into());
			}
		}

		let job = NewJob {
			identity: identity.type_name().to_string(),
			payload,
			run_at: resolution.run_at,
			priority: spec.priority,
			queue: spec.queue,
		};
		Ok(PendingWrite { state, identity, job })
	}

	/// Delete what is pending for the identity, enqueue the prepared entry
	/// and commit. The caller holds the identity lock on `tx`.
	async fn replace<T: RecurringTask>(
		&self,
		mut tx: Box<dyn QueueTransaction>,
		scheduled: &mut ScheduledTask<T>,
		pending: PendingWrite,
	) -> Result<JobHandle> {
		let PendingWrite { state, identity, job } = pending;
		let stale: Vec<JobId> = tx
			.find_pending(&identity)
			.await?
			.iter()
			.map(|job| job.id)
			.collect();
		let replaced = tx.delete(&stale).await?;
		let handle = tx.enqueue(job).await?;
		tx.commit().await?;

		scheduled.schedule = state;
		info!(
			job_id = %handle.id,
			identity = %identity,
			run_at = %handle.run_at,
			replaced,
			"recurring task scheduled"
		);
		Ok(handle)
	}

	/// [`reschedule`](Self::reschedule) for a fresh instance.
	pub async fn reschedule_task<T: RecurringTask>(
		&self,
		task: T,
		options: ScheduleOptions,
	) -> Result<JobHandle> {
		let mut scheduled = ScheduledTask::new(task);
		self.reschedule(&mut scheduled, options).await
	}

	/// Stop the schedule: delete every pending occurrence of the identity.
	#[instrument(skip(self, options), fields(task = T::class().name()))]
	pub async fn unschedule<T: RecurringTask>(&self, options: ScheduleOptions) -> Result<u64> {
		let identity = options.identity(T::class());

		let _guard = self.locks.acquire(identity.type_name()).await;
		let mut tx = self.queue.begin().await?;
		tx.lock_identity(&identity).await?;
		let pending: Vec<JobId> = tx
			.find_pending(&identity)
			.await?
			.iter()
			.map(|job| job.id)
			.collect();
		let deleted = tx.delete(&pending).await?;
		tx.commit().await?;

		info!(identity = %identity, deleted, "recurring task unscheduled");
		Ok(deleted)
	}

	pub async fn is_scheduled<T: RecurringTask>(&self, options: ScheduleOptions) -> Result<bool> {
		Ok(!self.pending_jobs::<T>(options).await?.is_empty())
	}

	/// Pending occurrences of the identity.
	pub async fn pending_jobs<T: RecurringTask>(
		&self,
		options: ScheduleOptions,
	) -> Result<Vec<JobHandle>> {
		self.queue.find_pending(&options.identity(T::class())).await
	}

	/// Run the completion hook for a delivered entry and return the entry
	/// that replaces it.
	#[instrument(skip(self, job), fields(job_id = %job.id, outcome = ?outcome))]
	pub async fn handle_completion<T: RecurringTask>(
		&self,
		job: &JobHandle,
		outcome: Outcome,
	) -> Result<JobHandle> {
		let class = T::class();
		if job.identity != class.name() {
			return Err(RecurringServerError::Internal(format!(
				"job {} belongs to {}, not {}",
				job.id,
				job.identity,
				class.name()
			)));
		}

		let mut scheduled = ScheduledTask::<T>::from_payload(&job.payload)?;
		match outcome {
			Outcome::Succeeded => scheduled.on_success(self).await,
			Outcome::Failed => scheduled.on_failure(self).await,
		}
	}
}
