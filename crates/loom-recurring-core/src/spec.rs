// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-call schedule options and the merged spec handed to the resolver.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::anchor::Anchor;
use crate::class::TaskClassConfig;
use crate::cron_expr::CronExpression;
use crate::error::Result;
use crate::identity::{Discriminator, TaskIdentity};
use crate::interval::Interval;
use crate::zone::parse_timezone;

/// Fully merged schedule configuration for one resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleSpec {
	pub anchors: Vec<Anchor>,
	pub interval: Option<Interval>,
	pub cron: Option<CronExpression>,
	pub timezone: Option<Tz>,
	pub priority: i32,
	pub queue: Option<String>,
}

impl ScheduleSpec {
	/// The spec's own zone, or `default` when none is set.
	pub fn zone(&self, default: Tz) -> Tz {
		self.timezone.unwrap_or(default)
	}
}

/// Optional overrides for a single schedule call.
///
/// Also serves as the schedule state a task instance carries between
/// occurrences: the merged options are stored with the queued payload so the
/// completion hooks can reschedule from where the last run left off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOptions {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub anchors: Option<Vec<Anchor>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub interval: Option<Interval>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cron: Option<CronExpression>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timezone: Option<Tz>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub priority: Option<i32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub queue: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub discriminator: Option<Discriminator>,
}

impl ScheduleOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn run_at(mut self, anchor: impl Into<Anchor>) -> Self {
		self.anchors.get_or_insert_with(Vec::new).push(anchor.into());
		self
	}

	pub fn run_every(mut self, interval: Interval) -> Self {
		self.interval = Some(interval);
		self
	}

	pub fn cron(mut self, expression: &str) -> Result<Self> {
		self.cron = Some(CronExpression::parse(expression)?);
		Ok(self)
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

	/// Restrict deduplication and lookups to payloads whose `field` equals
	/// `value`.
	pub fn matching(mut self, field: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
		self.discriminator = Some(Discriminator::new(field, value)?);
		Ok(self)
	}

	/// Overlay `other`: every field it sets wins.
	pub fn merge(&mut self, other: Self) {
		if other.anchors.is_some() {
			self.anchors = other.anchors;
		}
		if other.interval.is_some() {
			self.interval = other.interval;
		}
		if other.cron.is_some() {
			self.cron = other.cron;
		}
		if other.timezone.is_some() {
			self.timezone = other.timezone;
		}
		if other.priority.is_some() {
			self.priority = other.priority;
		}
		if other.queue.is_some() {
			self.queue = other.queue;
		}
		if other.discriminator.is_some() {
			self.discriminator = other.discriminator;
		}
	}

	/// Fill unset fields from the task type's declarations.
	pub fn finalize(&self, class: &TaskClassConfig) -> ScheduleSpec {
		ScheduleSpec {
			anchors: self
				.anchors
				.clone()
				.unwrap_or_else(|| class.anchors().to_vec()),
			interval: Some(self.interval.unwrap_or_else(|| class.interval())),
			cron: self
				.cron
				.clone()
				.or_else(|| class.cron_expression().cloned()),
			timezone: self.timezone.or_else(|| class.zone()),
			priority: self.priority.unwrap_or_else(|| class.default_priority()),
			queue: self
				.queue
				.clone()
				.or_else(|| class.queue_name().map(str::to_string)),
		}
	}

	pub fn identity(&self, class: &TaskClassConfig) -> TaskIdentity {
		class.identity(self.discriminator.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};

	fn class() -> TaskClassConfig {
		TaskClassConfig::new("MyTask")
			.run_every(Interval::days(1))
			.run_at("8:00am")
			.priority(2)
			.queue("maintenance")
	}

	#[test]
	fn test_finalize_uses_class_defaults() {
		let spec = ScheduleOptions::new().finalize(&class());
		assert_eq!(spec.anchors, vec![Anchor::from("8:00am")]);
		assert_eq!(spec.interval, Some(Interval::days(1)));
		assert_eq!(spec.priority, 2);
		assert_eq!(spec.queue.as_deref(), Some("maintenance"));
		assert_eq!(spec.timezone, None);
		assert_eq!(spec.zone(Tz::UTC), Tz::UTC);
	}

	#[test]
	fn test_options_take_precedence() {
		let options = ScheduleOptions::new()
			.run_at("9:00pm")
			.run_every(Interval::weeks(1))
			.priority(3)
			.timezone("US/Pacific")
			.unwrap();
		let spec = options.finalize(&class());
		assert_eq!(spec.anchors, vec![Anchor::from("9:00pm")]);
		assert_eq!(spec.interval, Some(Interval::weeks(1)));
		assert_eq!(spec.priority, 3);
		assert_eq!(spec.zone(Tz::UTC), Tz::US__Pacific);
	}

	#[test]
	fn test_merge_overlays_set_fields_only() {
		let mut prior = ScheduleOptions::new()
			.run_at(Utc.with_ymd_and_hms(2014, 3, 8, 11, 0, 0).unwrap())
			.timezone("US/Pacific")
			.unwrap();
		prior.merge(ScheduleOptions::new().priority(5));
		assert_eq!(prior.priority, Some(5));
		assert_eq!(prior.timezone, Some(Tz::US__Pacific));
		assert_eq!(prior.anchors.as_ref().map(Vec::len), Some(1));

		prior.merge(ScheduleOptions::new().run_at("1:00"));
		assert_eq!(prior.anchors, Some(vec![Anchor::from("1:00")]));
	}

	#[test]
	fn test_serde_omits_unset_fields() {
		let options = ScheduleOptions::new().priority(1);
		let json = serde_json::to_value(&options).unwrap();
		assert_eq!(json, serde_json::json!({"priority": 1}));
		let back: ScheduleOptions = serde_json::from_value(serde_json::json!({})).unwrap();
		assert_eq!(back, ScheduleOptions::default());
	}

	#[test]
	fn test_serde_roundtrip_with_zone_and_cron() {
		let options = ScheduleOptions::new()
			.timezone("US/Pacific")
			.unwrap()
			.cron("0 9 * * *")
			.unwrap()
			.matching("account_id", 42)
			.unwrap();
		let json = serde_json::to_string(&options).unwrap();
		let back: ScheduleOptions = serde_json::from_str(&json).unwrap();
		assert_eq!(back, options);
	}

	#[test]
	fn test_identity_carries_discriminator() {
		let options = ScheduleOptions::new().matching("account_id", 7).unwrap();
		let identity = options.identity(&class());
		assert_eq!(identity.to_string(), "MyTask[account_id=7]");
	}
}
