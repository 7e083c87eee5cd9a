// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Recurring task scheduling for Loom server.
//!
//! This crate keeps one pending occurrence of each recurring task in a job
//! queue and moves it forward after every run. Schedule resolution lives in
//! `loom-recurring-core`; this crate adds the queue contract with SQLite and
//! in-memory implementations, the schedule manager and layered configuration.
//!
//! # Usage
//!
//! ```ignore
//! let config = load_config()?;
//! let queue = Arc::new(SqliteJobQueue::from_config(&config).await?);
//! let manager = ScheduleManager::from_config(queue, &config);
//!
//! manager.schedule(NightlyReport::default(), ScheduleOptions::new()).await?;
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod locks;
pub mod manager;
pub mod queue;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, load_config_with_file, ConfigError, RecurringConfig, RecurringConfigLayer};
pub use error::{RecurringServerError, Result};
pub use locks::IdentityLocks;
pub use manager::{Outcome, RecurringTask, ScheduleManager, ScheduledTask};
pub use queue::{JobHandle, JobId, JobQueue, MemoryJobQueue, NewJob, QueueTransaction, SqliteJobQueue};
