// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Type-level schedule declarations with subtype inheritance.
//!
//! A task type declares its defaults once, usually in a `static`:
//!
//! ```ignore
//! static NIGHTLY: LazyLock<TaskClassConfig> = LazyLock::new(|| {
//! 	TaskClassConfig::new("NightlyReport")
//! 		.run_at("2:00am")
//! 		.run_every(Interval::days(1))
//! 		.timezone("US/Pacific")
//! 		.expect("valid timezone")
//! });
//! ```
//!
//! [`TaskClassConfig::subclass`] snapshots the parent. Scalar fields are
//! replaced by later declarations. The anchor list is marked inherited: the
//! subtype's first `run_at` drops the parent's anchors, so a subtype either
//! keeps them untouched or replaces them wholesale.

use chrono_tz::Tz;

use crate::anchor::Anchor;
use crate::cron_expr::CronExpression;
use crate::error::Result;
use crate::identity::{Discriminator, TaskIdentity};
use crate::interval::Interval;
use crate::zone::parse_timezone;

/// Interval used when a task type never declares one.
pub const DEFAULT_INTERVAL: Interval = Interval::hours(1);

#[derive(Debug, Clone)]
pub struct TaskClassConfig {
	name: String,
	anchors: Vec<Anchor>,
	anchors_inherited: bool,
	interval: Option<Interval>,
	timezone: Option<Tz>,
	priority: Option<i32>,
	queue: Option<String>,
	cron: Option<CronExpression>,
}

impl TaskClassConfig {
	/// Declare a task type. `name` is the identity key of every occurrence it
	/// enqueues and must be unique across task types.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			anchors: Vec::new(),
			anchors_inherited: false,
			interval: None,
			timezone: None,
			priority: None,
			queue: None,
			cron: None,
		}
	}

	/// Declare a subtype starting from a snapshot of this type's values.
	pub fn subclass(&self, name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			anchors_inherited: true,
			..self.clone()
		}
	}

	pub fn run_at(mut self, anchor: impl Into<Anchor>) -> Self {
		if self.anchors_inherited {
			self.anchors.clear();
			self.anchors_inherited = false;
		}
		self.anchors.push(anchor.into());
		self
	}

	pub fn run_at_all<A: Into<Anchor>>(self, anchors: impl IntoIterator<Item = A>) -> Self {
		anchors
			.into_iter()
			.fold(self, |config, anchor| config.run_at(anchor))
	}

	pub fn run_every(mut self, interval: Interval) -> Self {
		self.interval = Some(interval);
		self
	}

	pub fn timezone(mut self, zone: &str) -> Result<Self> {
		self.timezone = Some(parse_timezone(zone)?);
		Ok(self)
	}

	pub fn priority(mut self, priority: i32) -> Self {
		self.priority = Some(priority);
		self
	}

	pub fn queue(mut self, queue: impl Into<String>) -> Self {
		self.queue = Some(queue.into());
		self
	}

	/// Declare a cron expression. Parsed here so a typo fails at declaration
	/// time rather than on the first schedule attempt.
	pub fn cron(mut self, expression: &str) -> Result<Self> {
		self.cron = Some(CronExpression::parse(expression)?);
		Ok(self)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn anchors(&self) -> &[Anchor] {
		&self.anchors
	}

	/// Declared interval, or [`DEFAULT_INTERVAL`].
	pub fn interval(&self) -> Interval {
		self.interval.unwrap_or(DEFAULT_INTERVAL)
	}

	pub fn timezone_name(&self) -> Option<&'static str> {
		self.timezone.map(|tz| tz.name())
	}

	pub fn zone(&self) -> Option<Tz> {
		self.timezone
	}

	/// Declared priority, or 0.
	pub fn default_priority(&self) -> i32 {
		self.priority.unwrap_or(0)
	}

	pub fn queue_name(&self) -> Option<&str> {
		self.queue.as_deref()
	}

	pub fn cron_expression(&self) -> Option<&CronExpression> {
		self.cron.as_ref()
	}

	pub fn identity(&self, discriminator: Option<Discriminator>) -> TaskIdentity {
		TaskIdentity::new(self.name.clone()).with_discriminator(discriminator)
	}
}
