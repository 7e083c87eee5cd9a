// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Next-run resolution.
//!
//! Pure computation over a [`ScheduleSpec`]: no clock, no I/O, no global
//! zone. The caller passes the reference instant and the zone to fall back on
//! when the schedule has none.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::trace;

use crate::error::{RecurringError, Result};
use crate::interval::Interval;
use crate::spec::ScheduleSpec;

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
	/// Next run, strictly after the reference instant.
	pub run_at: DateTime<Utc>,
	/// The anchor set after advancing, for callers that persist it to skip
	/// the same steps next time. `None` when a cron expression decided.
	pub anchors: Option<Vec<DateTime<Utc>>>,
}

/// Next run instant for `spec`, strictly after `now`.
pub fn resolve(spec: &ScheduleSpec, default_zone: Tz, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
	next_run(spec, default_zone, now).map(|resolution| resolution.run_at)
}

/// Like [`resolve`], also returning the advanced anchors.
pub fn next_run(spec: &ScheduleSpec, default_zone: Tz, now: DateTime<Utc>) -> Result<Resolution> {
	let tz = spec.zone(default_zone);

	if let Some(cron) = &spec.cron {
		let run_at = cron.next_after(&tz, now).ok_or_else(|| {
			RecurringError::InvalidSchedule(format!("cron expression '{cron}' has no occurrence after {now}"))
		})?;
		trace!(cron = %cron, zone = tz.name(), %run_at, "resolved from cron expression");
		return Ok(Resolution {
			run_at,
			anchors: None,
		});
	}

	if spec.interval.is_some_and(|interval| interval.is_zero()) {
		return Err(RecurringError::InvalidSchedule(
			"interval must be greater than zero".to_string(),
		));
	}

	let mut times = spec
		.anchors
		.iter()
		.map(|anchor| anchor.resolve(&tz, now))
		.collect::<Result<Vec<_>>>()?;

	if times.is_empty() {
		let interval = spec.interval.ok_or_else(|| {
			RecurringError::InvalidSchedule(
				"no anchors, interval, or cron expression configured".to_string(),
			)
		})?;
		times.push(interval.advance(now.with_timezone(&tz))?);
	}

	let run_at = loop {
		if let Some(next) = next_future_time(&times, now) {
			break next;
		}
		let interval = spec.interval.ok_or_else(|| {
			RecurringError::InvalidSchedule(
				"every anchor is in the past and no interval is configured".to_string(),
			)
		})?;
		advance_all(&mut times, interval, now)?;
	};

	let run_at = run_at.with_timezone(&Utc);
	trace!(zone = tz.name(), anchors = times.len(), %run_at, "resolved from anchors");

	Ok(Resolution {
		run_at,
		anchors: Some(times.iter().map(|t| t.with_timezone(&Utc)).collect()),
	})
}

fn next_future_time(times: &[DateTime<Tz>], now: DateTime<Utc>) -> Option<DateTime<Tz>> {
	times.iter().filter(|time| **time > now).min().cloned()
}

/// Move every anchor forward by the same number of steps.
///
/// Fixed-length steps skip ahead arithmetically to just behind `now` before
/// the final step; calendar steps are taken one at a time because their
/// length depends on where they land.
fn advance_all(times: &mut [DateTime<Tz>], interval: Interval, now: DateTime<Utc>) -> Result<()> {
	if let (Some(step), Some(latest)) = (interval.fixed_duration(), times.iter().max().cloned()) {
		let behind = now.signed_duration_since(latest).num_seconds();
		let skip = behind / step.num_seconds();
		if skip > 0 {
			let jump = Duration::seconds(skip.saturating_mul(step.num_seconds()));
			for time in times.iter_mut() {
				*time = time
					.checked_add_signed(jump)
					.ok_or_else(|| RecurringError::InvalidInterval(format!("advancing by {interval} overflows")))?;
			}
		}
	}

	for time in times.iter_mut() {
		*time = interval.advance(*time)?;
	}
	Ok(())
}
