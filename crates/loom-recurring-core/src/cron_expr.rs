// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cron expressions as an alternative recurrence source.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RecurringError, Result};

/// Convert a standard 5-field Unix cron expression to the 7-field format
/// expected by the `cron` crate.
///
/// 5-field format: minute hour day-of-month month day-of-week
/// 7-field format: second minute hour day-of-month month day-of-week year
fn convert_to_cron_crate_format(expression: &str) -> String {
	let field_count = expression.split_whitespace().count();
	if field_count == 5 {
		format!("0 {} *", expression.trim())
	} else {
		expression.trim().to_string()
	}
}

/// A parsed cron expression that remembers the text it was declared with.
#[derive(Clone)]
pub struct CronExpression {
	source: String,
	schedule: Schedule,
}

impl CronExpression {
	pub fn parse(expression: &str) -> Result<Self> {
		let schedule = Schedule::from_str(&convert_to_cron_crate_format(expression))
			.map_err(|e| RecurringError::InvalidCronExpression(format!("{expression}: {e}")))?;
		Ok(Self {
			source: expression.trim().to_string(),
			schedule,
		})
	}

	pub fn as_str(&self) -> &str {
		&self.source
	}

	/// First occurrence strictly after `now`, with fields evaluated on the
	/// wall clock of `tz`. `None` when the expression has no future match.
	pub fn next_after(&self, tz: &Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
		let local_now = now.with_timezone(tz);
		self
			.schedule
			.after(&local_now)
			.next()
			.map(|next| next.with_timezone(&Utc))
	}
}

impl fmt::Debug for CronExpression {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("CronExpression").field(&self.source).finish()
	}
}

impl fmt::Display for CronExpression {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.source)
	}
}

impl PartialEq for CronExpression {
	fn eq(&self, other: &Self) -> bool {
		self.source == other.source
	}
}

impl Eq for CronExpression {}

impl FromStr for CronExpression {
	type Err = RecurringError;

	fn from_str(s: &str) -> Result<Self> {
		Self::parse(s)
	}
}

impl Serialize for CronExpression {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.source)
	}
}

impl<'de> Deserialize<'de> for CronExpression {
	fn deserialize<D: serde::Deserializer<'de>>(
		deserializer: D,
	) -> std::result::Result<Self, D::Error> {
		let source = String::deserialize(deserializer)?;
		Self::parse(&source).map_err(serde::de::Error::custom)
	}
}
