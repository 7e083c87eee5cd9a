// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for recurring scheduling.
//!
//! Precedence (highest to lowest):
//! 1. Environment variables (`LOOM_RECURRING_*`)
//! 2. Config file (`/etc/loom/recurring.toml`)
//! 3. Built-in defaults

pub mod error;
pub mod sources;

pub use error::ConfigError;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use chrono_tz::Tz;
use loom_recurring_core::parse_timezone;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DEFAULT_DATABASE_URL: &str = "sqlite:./recurring.db";

/// Recurring scheduling configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringConfig {
	/// Global switch. When off, `schedule` declines to enqueue anything.
	pub enabled: bool,
	/// Zone for schedules that declare none.
	pub default_timezone: Tz,
	pub database_url: String,
}

impl Default for RecurringConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			default_timezone: Tz::UTC,
			database_url: DEFAULT_DATABASE_URL.to_string(),
		}
	}
}

/// Recurring configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecurringConfigLayer {
	#[serde(default)]
	pub enabled: Option<bool>,
	#[serde(default)]
	pub default_timezone: Option<String>,
	#[serde(default)]
	pub database_url: Option<String>,
}

impl RecurringConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.default_timezone.is_some() {
			self.default_timezone = other.default_timezone;
		}
		if other.database_url.is_some() {
			self.database_url = other.database_url;
		}
	}

	pub fn finalize(self) -> Result<RecurringConfig, ConfigError> {
		let default_timezone = match self.default_timezone {
			Some(name) => parse_timezone(&name).map_err(|e| ConfigError::InvalidValue {
				key: "default_timezone".to_string(),
				message: e.to_string(),
			})?,
			None => Tz::UTC,
		};

		let database_url = self
			.database_url
			.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
		if database_url.trim().is_empty() {
			return Err(ConfigError::Validation("database_url must not be empty".to_string()));
		}

		Ok(RecurringConfig {
			enabled: self.enabled.unwrap_or(true),
			default_timezone,
			database_url,
		})
	}
}

/// Load configuration from all sources with standard precedence.
pub fn load_config() -> Result<RecurringConfig, ConfigError> {
	load_config_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<RecurringConfig, ConfigError> {
	load_config_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Merge `sources` in precedence order and finalize.
pub fn load_config_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<RecurringConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = RecurringConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	let config = merged.finalize()?;
	info!(
		enabled = config.enabled,
		default_timezone = config.default_timezone.name(),
		"recurring configuration loaded"
	);
	Ok(config)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	struct FixedSource(Precedence, RecurringConfigLayer);

	impl ConfigSource for FixedSource {
		fn name(&self) -> &'static str {
			"fixed"
		}

		fn precedence(&self) -> Precedence {
			self.0
		}

		fn load(&self) -> Result<RecurringConfigLayer, ConfigError> {
			Ok(self.1.clone())
		}
	}

	#[test]
	fn test_defaults() {
		let config = RecurringConfigLayer::default().finalize().unwrap();
		assert_eq!(config, RecurringConfig::default());
		assert!(config.enabled);
		assert_eq!(config.default_timezone, Tz::UTC);
		assert_eq!(config.database_url, "sqlite:./recurring.db");
	}

	#[test]
	fn test_merge_prefers_later_values() {
		let mut base = RecurringConfigLayer {
			enabled: Some(true),
			default_timezone: Some("UTC".to_string()),
			database_url: None,
		};
		base.merge(RecurringConfigLayer {
			enabled: Some(false),
			default_timezone: None,
			database_url: Some("sqlite::memory:".to_string()),
		});

		assert_eq!(base.enabled, Some(false));
		assert_eq!(base.default_timezone.as_deref(), Some("UTC"));
		assert_eq!(base.database_url.as_deref(), Some("sqlite::memory:"));
	}

	#[test]
	fn test_invalid_timezone_rejected() {
		let layer = RecurringConfigLayer {
			default_timezone: Some("Mars/Olympus_Mons".to_string()),
			..Default::default()
		};
		let err = layer.finalize().unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "default_timezone"));
	}

	#[test]
	fn test_empty_database_url_rejected() {
		let layer = RecurringConfigLayer {
			database_url: Some("  ".to_string()),
			..Default::default()
		};
		assert!(matches!(layer.finalize(), Err(ConfigError::Validation(_))));
	}

	#[test]
	fn test_sources_apply_in_precedence_order() {
		let config = load_config_from_sources(vec![
			Box::new(FixedSource(
				Precedence::Environment,
				RecurringConfigLayer {
					default_timezone: Some("Europe/Berlin".to_string()),
					..Default::default()
				},
			)),
			Box::new(FixedSource(
				Precedence::ConfigFile,
				RecurringConfigLayer {
					enabled: Some(false),
					default_timezone: Some("US/Pacific".to_string()),
					..Default::default()
				},
			)),
			Box::new(DefaultsSource),
		])
		.unwrap();

		assert!(!config.enabled);
		assert_eq!(config.default_timezone, Tz::Europe__Berlin);
	}

	#[test]
	fn test_file_source_feeds_config() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "default_timezone = \"US/Pacific\"").unwrap();

		let config = load_config_from_sources(vec![
			Box::new(DefaultsSource),
			Box::new(TomlSource::new(file.path())),
		])
		.unwrap();
		assert_eq!(config.default_timezone, Tz::US__Pacific);
		assert!(config.enabled);
	}
}
