// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Task identity used to find, deduplicate and delete pending occurrences.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{RecurringError, Result};

/// Narrows an identity to one parameterized instance of a task type by a
/// field of its serialized payload, e.g. `account_id = 42`.
///
/// `field` is a dotted path of identifiers (`settings.region`). The
/// restriction keeps it safe to splice into a JSON path expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDiscriminator")]
pub struct Discriminator {
	field: String,
	value: Value,
}

#[derive(Deserialize)]
struct RawDiscriminator {
	field: String,
	value: Value,
}

impl TryFrom<RawDiscriminator> for Discriminator {
	type Error = RecurringError;

	fn try_from(raw: RawDiscriminator) -> Result<Self> {
		Discriminator::new(raw.field, raw.value)
	}
}

impl Discriminator {
	pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
		let field = field.into();
		if !Self::validate_field(&field) {
			return Err(RecurringError::InvalidDiscriminator(field));
		}
		Ok(Self {
			field,
			value: value.into(),
		})
	}

	pub fn validate_field(field: &str) -> bool {
		!field.is_empty()
			&& field.split('.').all(|segment| {
				segment.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
					&& segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
			})
	}

	pub fn field(&self) -> &str {
		&self.field
	}

	pub fn value(&self) -> &Value {
		&self.value
	}

	/// Whether the serialized `task` holds `value` at the dotted `field`.
	pub fn matches(&self, task: &Value) -> bool {
		self
			.field
			.split('.')
			.try_fold(task, |node, segment| node.get(segment))
			== Some(&self.value)
	}
}

/// The key shared by every pending occurrence of one task type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskIdentity {
	type_name: String,
	discriminator: Option<Discriminator>,
}

impl TaskIdentity {
	pub fn new(type_name: impl Into<String>) -> Self {
		Self {
			type_name: type_name.into(),
			discriminator: None,
		}
	}

	pub fn with_discriminator(mut self, discriminator: Option<Discriminator>) -> Self {
		self.discriminator = discriminator;
		self
	}

	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	pub fn discriminator(&self) -> Option<&Discriminator> {
		self.discriminator.as_ref()
	}

	/// Whether an entry stored under `type_name` with serialized `task`
	/// belongs to this identity. Type names compare exactly, so `MyTas` never
	/// matches `MyTask`.
	pub fn matches(&self, type_name: &str, task: &Value) -> bool {
		self.type_name == type_name
			&& self
				.discriminator
				.as_ref()
				.map_or(true, |discriminator| discriminator.matches(task))
	}
}

impl fmt::Display for TaskIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.discriminator {
			Some(d) => write!(f, "{}[{}={}]", self.type_name, d.field, d.value),
			None => f.write_str(&self.type_name),
		}
	}
}
