// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for recurring task scheduling.

use loom_recurring_core::RecurringError;
use thiserror::Error;

use crate::queue::JobId;

/// Result type for recurring scheduling operations.
pub type Result<T> = std::result::Result<T, RecurringServerError>;

/// Errors that can occur while scheduling against the job queue.
#[derive(Debug, Error)]
pub enum RecurringServerError {
	/// The schedule itself is invalid. Never retried.
	#[error(transparent)]
	Schedule(#[from] RecurringError),

	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	/// The queue could not open or complete a transaction. Nothing was
	/// written.
	#[error("transaction failed: {0}")]
	Transaction(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("job not found: {0}")]
	JobNotFound(JobId),

	#[error("internal error: {0}")]
	Internal(String),
}
