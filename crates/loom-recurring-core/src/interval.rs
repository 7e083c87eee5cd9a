// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Calendar-aware repeat intervals.
//!
//! An [`Interval`] is kept as a value and a unit rather than a number of
//! seconds: one day is not always 86400 seconds once daylight-saving
//! transitions are involved, and one month has no fixed length at all.

use chrono::{DateTime, Days, Duration, Months};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RecurringError, Result};
use crate::zone::localize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
	Seconds,
	Minutes,
	Hours,
	Days,
	Weeks,
	Months,
	Years,
}

impl IntervalUnit {
	pub fn as_str(&self) -> &'static str {
		match self {
			IntervalUnit::Seconds => "seconds",
			IntervalUnit::Minutes => "minutes",
			IntervalUnit::Hours => "hours",
			IntervalUnit::Days => "days",
			IntervalUnit::Weeks => "weeks",
			IntervalUnit::Months => "months",
			IntervalUnit::Years => "years",
		}
	}

	/// Units that step on the wall clock of a zone instead of elapsed time.
	pub fn is_calendar(&self) -> bool {
		matches!(
			self,
			IntervalUnit::Days | IntervalUnit::Weeks | IntervalUnit::Months | IntervalUnit::Years
		)
	}
}

impl FromStr for IntervalUnit {
	type Err = RecurringError;

	fn from_str(s: &str) -> Result<Self> {
		match s.to_ascii_lowercase().as_str() {
			"s" | "sec" | "secs" | "second" | "seconds" => Ok(IntervalUnit::Seconds),
			"m" | "min" | "mins" | "minute" | "minutes" => Ok(IntervalUnit::Minutes),
			"h" | "hr" | "hrs" | "hour" | "hours" => Ok(IntervalUnit::Hours),
			"d" | "day" | "days" => Ok(IntervalUnit::Days),
			"w" | "week" | "weeks" => Ok(IntervalUnit::Weeks),
			"month" | "months" => Ok(IntervalUnit::Months),
			"y" | "year" | "years" => Ok(IntervalUnit::Years),
			other => Err(RecurringError::InvalidInterval(format!("unknown unit '{other}'"))),
		}
	}
}

/// A repeat step such as "1 day" or "15 minutes".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
	pub value: u32,
	pub unit: IntervalUnit,
}

impl Interval {
	pub const fn new(value: u32, unit: IntervalUnit) -> Self {
		Self { value, unit }
	}

	pub const fn seconds(value: u32) -> Self {
		Self::new(value, IntervalUnit::Seconds)
	}

	pub const fn minutes(value: u32) -> Self {
		Self::new(value, IntervalUnit::Minutes)
	}

	pub const fn hours(value: u32) -> Self {
		Self::new(value, IntervalUnit::Hours)
	}

	pub const fn days(value: u32) -> Self {
		Self::new(value, IntervalUnit::Days)
	}

	pub const fn weeks(value: u32) -> Self {
		Self::new(value, IntervalUnit::Weeks)
	}

	pub const fn months(value: u32) -> Self {
		Self::new(value, IntervalUnit::Months)
	}

	pub const fn years(value: u32) -> Self {
		Self::new(value, IntervalUnit::Years)
	}

	pub fn is_zero(&self) -> bool {
		self.value == 0
	}

	/// Elapsed-time length for fixed units; `None` for calendar units.
	pub fn fixed_duration(&self) -> Option<Duration> {
		let value = i64::from(self.value);
		match self.unit {
			IntervalUnit::Seconds => Some(Duration::seconds(value)),
			IntervalUnit::Minutes => Some(Duration::minutes(value)),
			IntervalUnit::Hours => Some(Duration::hours(value)),
			_ => None,
		}
	}

	/// Advance `instant` by one step.
	///
	/// Calendar units are added to the wall-clock time in the instant's own
	/// zone and then mapped back, so 11:00 stays 11:00 across a DST change.
	/// Month arithmetic clamps to the last day of shorter months.
	pub fn advance(&self, instant: DateTime<Tz>) -> Result<DateTime<Tz>> {
		if let Some(step) = self.fixed_duration() {
			return instant
				.checked_add_signed(step)
				.ok_or_else(|| self.overflow());
		}

		let tz = instant.timezone();
		let local = instant.naive_local();
		let shifted = match self.unit {
			IntervalUnit::Days => local.checked_add_days(Days::new(u64::from(self.value))),
			IntervalUnit::Weeks => local.checked_add_days(Days::new(u64::from(self.value) * 7)),
			IntervalUnit::Months => local.checked_add_months(Months::new(self.value)),
			IntervalUnit::Years => self
				.value
				.checked_mul(12)
				.and_then(|months| local.checked_add_months(Months::new(months))),
			IntervalUnit::Seconds | IntervalUnit::Minutes | IntervalUnit::Hours => None,
		};

		shifted
			.and_then(|naive| localize(&tz, naive))
			.ok_or_else(|| self.overflow())
	}

	fn overflow(&self) -> RecurringError {
		RecurringError::InvalidInterval(format!("advancing by {self} overflows the calendar"))
	}
}

impl fmt::Display for Interval {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let unit = self.unit.as_str();
		if self.value == 1 {
			write!(f, "1 {}", unit.trim_end_matches('s'))
		} else {
			write!(f, "{} {}", self.value, unit)
		}
	}
}

/// Parses "1 day", "2 weeks", "90 minutes", "15m" and "1h".
impl FromStr for Interval {
	type Err = RecurringError;

	fn from_str(s: &str) -> Result<Self> {
		let s = s.trim();
		let split = s
			.find(|c: char| !c.is_ascii_digit())
			.ok_or_else(|| RecurringError::InvalidInterval(format!("missing unit in '{s}'")))?;
		let (digits, unit) = s.split_at(split);
		let value = digits
			.parse::<u32>()
			.map_err(|_| RecurringError::InvalidInterval(format!("invalid count in '{s}'")))?;
		Ok(Self::new(value, unit.trim().parse()?))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};

	#[test]
	fn test_parse_long_and_short_forms() {
		assert_eq!("1 day".parse::<Interval>().unwrap(), Interval::days(1));
		assert_eq!("2 weeks".parse::<Interval>().unwrap(), Interval::weeks(2));
		assert_eq!("90 minutes".parse::<Interval>().unwrap(), Interval::minutes(90));
		assert_eq!("15m".parse::<Interval>().unwrap(), Interval::minutes(15));
		assert_eq!("1h".parse::<Interval>().unwrap(), Interval::hours(1));
		assert_eq!(" 3 Months ".parse::<Interval>().unwrap(), Interval::months(3));
	}

	#[test]
	fn test_parse_rejects_garbage() {
		assert!("day".parse::<Interval>().is_err());
		assert!("10".parse::<Interval>().is_err());
		assert!("1 fortnight".parse::<Interval>().is_err());
		assert!("-1 day".parse::<Interval>().is_err());
	}

	#[test]
	fn test_display() {
		assert_eq!(Interval::days(1).to_string(), "1 day");
		assert_eq!(Interval::hours(6).to_string(), "6 hours");
	}

	#[test]
	fn test_serde_keeps_symbolic_form() {
		let json = serde_json::to_value(Interval::days(1)).unwrap();
		assert_eq!(json, serde_json::json!({"value": 1, "unit": "days"}));
	}

	#[test]
	fn test_day_step_keeps_wall_clock_across_spring_forward() {
		let tz = Tz::US__Pacific;
		let start = Utc
			.with_ymd_and_hms(2014, 3, 8, 11, 0, 0)
			.unwrap()
			.with_timezone(&tz);
		let next = Interval::days(1).advance(start).unwrap();
		assert_eq!(next.with_timezone(&Utc), Utc.with_ymd_and_hms(2014, 3, 9, 10, 0, 0).unwrap());
	}

	#[test]
	fn test_hour_step_is_elapsed_time() {
		let tz = Tz::US__Pacific;
		let start = Utc
			.with_ymd_and_hms(2014, 3, 9, 9, 30, 0)
			.unwrap()
			.with_timezone(&tz);
		let next = Interval::hours(1).advance(start).unwrap();
		assert_eq!(next.with_timezone(&Utc), Utc.with_ymd_and_hms(2014, 3, 9, 10, 30, 0).unwrap());
	}

	#[test]
	fn test_month_step_clamps_to_month_end() {
		let tz = Tz::UTC;
		let start = tz.with_ymd_and_hms(2014, 1, 31, 8, 0, 0).unwrap();
		let next = Interval::months(1).advance(start).unwrap();
		assert_eq!(next, tz.with_ymd_and_hms(2014, 2, 28, 8, 0, 0).unwrap());
	}

	#[test]
	fn test_week_and_year_steps() {
		let tz = Tz::UTC;
		let start = tz.with_ymd_and_hms(2014, 6, 29, 8, 0, 0).unwrap();
		assert_eq!(
			Interval::weeks(1).advance(start).unwrap(),
			tz.with_ymd_and_hms(2014, 7, 6, 8, 0, 0).unwrap()
		);
		assert_eq!(
			Interval::years(2).advance(start).unwrap(),
			tz.with_ymd_and_hms(2016, 6, 29, 8, 0, 0).unwrap()
		);
	}
}
