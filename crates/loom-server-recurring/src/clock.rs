// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Time source for the schedule manager.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
	micros: AtomicI64,
}

impl ManualClock {
	pub fn new(now: DateTime<Utc>) -> Self {
		Self {
			micros: AtomicI64::new(now.timestamp_micros()),
		}
	}

	pub fn set(&self, now: DateTime<Utc>) {
		self.micros.store(now.timestamp_micros(), Ordering::SeqCst);
	}

	pub fn advance(&self, by: Duration) {
		let delta = by.num_microseconds().unwrap_or(i64::MAX);
		self.micros.fetch_add(delta, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		let micros = self.micros.load(Ordering::SeqCst);
		Utc.timestamp_micros(micros).single().unwrap_or(DateTime::<Utc>::MAX_UTC)
	}
}
