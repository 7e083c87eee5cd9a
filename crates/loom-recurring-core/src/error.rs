// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for schedule declaration and resolution.

use thiserror::Error;

/// Result type for recurring schedule operations.
pub type Result<T> = std::result::Result<T, RecurringError>;

/// Configuration defects in a recurring schedule.
///
/// Every variant is raised synchronously at the call site that supplied the
/// bad value and is never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecurringError {
	#[error("invalid schedule: {0}")]
	InvalidSchedule(String),

	#[error("invalid cron expression: {0}")]
	InvalidCronExpression(String),

	#[error("invalid timezone: {0}")]
	InvalidTimezone(String),

	#[error("invalid anchor: {0}")]
	InvalidAnchor(String),

	#[error("invalid interval: {0}")]
	InvalidInterval(String),

	#[error("invalid discriminator field: {0}")]
	InvalidDiscriminator(String),
}
