// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for Loom recurring tasks.
//!
//! A recurring task is a unit of background work that re-enqueues itself
//! after every run. This crate holds the parts that need no queue: schedule
//! declarations per task type, per-call overrides, task identity, and the
//! timezone-aware resolver that turns a schedule into the next run instant.

pub mod anchor;
pub mod class;
pub mod cron_expr;
pub mod error;
pub mod identity;
pub mod interval;
pub mod resolver;
pub mod spec;
pub mod zone;

pub use anchor::{Anchor, WallClock};
pub use class::{TaskClassConfig, DEFAULT_INTERVAL};
pub use cron_expr::CronExpression;
pub use error::{RecurringError, Result};
pub use identity::{Discriminator, TaskIdentity};
pub use interval::{Interval, IntervalUnit};
pub use resolver::{next_run, resolve, Resolution};
pub use spec::{ScheduleOptions, ScheduleSpec};
pub use zone::{localize, parse_timezone};
