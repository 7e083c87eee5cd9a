// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Timezone lookup and wall-clock localization.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::error::{RecurringError, Result};

/// Parse an IANA timezone name such as `"US/Pacific"` or `"Europe/Berlin"`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
	name
		.trim()
		.parse::<Tz>()
		.map_err(|_| RecurringError::InvalidTimezone(name.to_string()))
}

/// Map a naive wall-clock time onto an instant in `tz`.
///
/// Ambiguous times (the repeated hour when clocks fall back) resolve to the
/// earlier instant. Times inside a spring-forward gap do not exist on the
/// wall clock and are pushed forward by the gap, so `02:30` on the
/// transition day becomes `03:30` in the new offset.
pub fn localize(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
	match tz.from_local_datetime(&naive) {
		LocalResult::Single(dt) => Some(dt),
		LocalResult::Ambiguous(earliest, _) => Some(earliest),
		LocalResult::None => tz.from_local_datetime(&(naive + Duration::hours(1))).earliest(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{NaiveDate, Utc};

	fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
		NaiveDate::from_ymd_opt(y, m, d)
			.unwrap()
			.and_hms_opt(h, min, 0)
			.unwrap()
	}

	#[test]
	fn test_parse_timezone_valid() {
		assert_eq!(parse_timezone("US/Pacific").unwrap(), Tz::US__Pacific);
		assert_eq!(parse_timezone("UTC").unwrap(), Tz::UTC);
		assert!(parse_timezone("Australia/Sydney").is_ok());
	}

	#[test]
	fn test_parse_timezone_invalid() {
		assert_eq!(
			parse_timezone("Invalid/Timezone"),
			Err(RecurringError::InvalidTimezone("Invalid/Timezone".to_string()))
		);
		assert!(parse_timezone("").is_err());
	}

	#[test]
	fn test_localize_spring_forward_gap_moves_forward() {
		let tz = Tz::US__Pacific;
		let dt = localize(&tz, naive(2014, 3, 9, 2, 30)).unwrap();
		assert_eq!(dt.with_timezone(&Utc), Utc.with_ymd_and_hms(2014, 3, 9, 10, 30, 0).unwrap());
	}

	#[test]
	fn test_localize_fall_back_picks_earliest() {
		let tz = Tz::US__Pacific;
		let dt = localize(&tz, naive(2014, 11, 2, 1, 30)).unwrap();
		// 01:30 PDT (UTC-7), not 01:30 PST.
		assert_eq!(dt.with_timezone(&Utc), Utc.with_ymd_and_hms(2014, 11, 2, 8, 30, 0).unwrap());
	}
}
