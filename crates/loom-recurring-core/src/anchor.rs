// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schedule anchors: absolute instants or recurring wall-clock strings.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RecurringError, Result};
use crate::zone::localize;

const LOCAL_DATETIME_FORMATS: &[&str] = &[
	"%Y-%m-%dT%H:%M:%S%.f",
	"%Y-%m-%d %H:%M:%S%.f",
	"%Y-%m-%dT%H:%M",
	"%Y-%m-%d %H:%M",
];

/// One time specification contributing to a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
	/// A fixed instant.
	At(DateTime<Utc>),
	/// A wall-clock string interpreted in the schedule's zone, e.g. `"8:00am"`,
	/// `"sunday 8:00am"` or `"2014-03-08 11:00"`.
	Wall(String),
}

impl Anchor {
	/// Build a wall-clock anchor, rejecting strings that cannot be parsed.
	pub fn parse(s: &str) -> Result<Self> {
		s.parse::<WallClock>()?;
		Ok(Anchor::Wall(s.to_string()))
	}

	/// Concrete instant for this anchor in `tz`, relative to the zone-local
	/// date of `now`.
	pub fn resolve(&self, tz: &Tz, now: DateTime<Utc>) -> Result<DateTime<Tz>> {
		match self {
			Anchor::At(at) => Ok(at.with_timezone(tz)),
			Anchor::Wall(s) => s.parse::<WallClock>()?.resolve(tz, now).ok_or_else(|| {
				RecurringError::InvalidAnchor(format!("'{s}' does not exist in {}", tz.name()))
			}),
		}
	}
}

impl From<DateTime<Utc>> for Anchor {
	fn from(at: DateTime<Utc>) -> Self {
		Anchor::At(at)
	}
}

impl From<&str> for Anchor {
	fn from(s: &str) -> Self {
		Anchor::Wall(s.to_string())
	}
}

impl From<String> for Anchor {
	fn from(s: String) -> Self {
		Anchor::Wall(s)
	}
}

impl fmt::Display for Anchor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Anchor::At(at) => write!(f, "{}", at.to_rfc3339()),
			Anchor::Wall(s) => write!(f, "{s}"),
		}
	}
}

/// Parsed form of a wall-clock anchor string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallClock {
	/// A time of day, optionally pinned to a weekday of the current week.
	TimeOfDay {
		weekday: Option<Weekday>,
		time: NaiveTime,
	},
	/// A calendar date and time without an offset.
	Local(NaiveDateTime),
	/// A string that carried its own offset.
	Instant(DateTime<Utc>),
}

impl WallClock {
	/// Map onto an instant in `tz`.
	///
	/// The weekday shift is applied to the naive local date before the zone
	/// is consulted, so the result always falls on the weekday named in the
	/// string. The shift stays within the Sunday-based week of `now`, which
	/// may land in the past; callers advance past anchors by the interval.
	pub fn resolve(&self, tz: &Tz, now: DateTime<Utc>) -> Option<DateTime<Tz>> {
		match *self {
			WallClock::Instant(at) => Some(at.with_timezone(tz)),
			WallClock::Local(naive) => localize(tz, naive),
			WallClock::TimeOfDay { weekday, time } => {
				let today = now.with_timezone(tz).date_naive();
				let date = match weekday {
					Some(target) => shift_to_weekday(today, target)?,
					None => today,
				};
				localize(tz, date.and_time(time))
			}
		}
	}
}

fn shift_to_weekday(date: NaiveDate, target: Weekday) -> Option<NaiveDate> {
	let delta =
		i64::from(target.num_days_from_sunday()) - i64::from(date.weekday().num_days_from_sunday());
	date.checked_add_signed(Duration::days(delta))
}

impl FromStr for WallClock {
	type Err = RecurringError;

	fn from_str(s: &str) -> Result<Self> {
		let trimmed = s.trim();
		let invalid = || RecurringError::InvalidAnchor(s.to_string());

		if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
			return Ok(WallClock::Instant(at.with_timezone(&Utc)));
		}

		for format in LOCAL_DATETIME_FORMATS {
			if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
				return Ok(WallClock::Local(naive));
			}
		}

		let (weekday, clock) = match trimmed.split_once(char::is_whitespace) {
			Some((head, rest)) => match head.parse::<Weekday>() {
				Ok(weekday) => (Some(weekday), rest.trim()),
				Err(_) => (None, trimmed),
			},
			None => (None, trimmed),
		};

		let time = parse_time_of_day(clock).ok_or_else(invalid)?;
		Ok(WallClock::TimeOfDay { weekday, time })
	}
}

/// Accepts `8:00am`, `8am`, `8:00 PM`, `20:00`, `1:00` and `20:00:30`.
fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
	let lower = s.trim().to_ascii_lowercase();
	let (clock, pm) = if let Some(rest) = lower.strip_suffix("am") {
		(rest.trim_end(), Some(false))
	} else if let Some(rest) = lower.strip_suffix("pm") {
		(rest.trim_end(), Some(true))
	} else {
		(lower.as_str(), None)
	};

	if pm.is_none() && !clock.contains(':') {
		return None;
	}

	let mut parts = clock.split(':');
	let hour: u32 = parts.next()?.parse().ok()?;
	let minute: u32 = parts.next().map_or(Some(0), |m| m.parse().ok())?;
	let second: u32 = parts.next().map_or(Some(0), |s| s.parse().ok())?;
	if parts.next().is_some() {
		return None;
	}

	let hour = match pm {
		Some(pm) => {
			if !(1..=12).contains(&hour) {
				return None;
			}
			hour % 12 + if pm { 12 } else { 0 }
		}
		None => hour,
	};

	NaiveTime::from_hms_opt(hour, minute, second)
}
