// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-process serialization of schedule writes per task type.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per task type name.
///
/// Keys are type names rather than full identities: a discriminated write
/// and an undiscriminated write of the same type touch overlapping entries.
/// The table only grows with the number of task types, which is fixed.
#[derive(Debug, Clone, Default)]
pub struct IdentityLocks {
	locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl IdentityLocks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Wait for exclusive access to `type_name`. Released on drop.
	pub async fn acquire(&self, type_name: &str) -> OwnedMutexGuard<()> {
		let lock = {
			let mut locks = self.locks.lock().await;
			Arc::clone(locks.entry(type_name.to_string()).or_default())
		};
		lock.lock_owned().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn test_same_key_waits() {
		let locks = IdentityLocks::new();
		let guard = locks.acquire("MyTask").await;

		let contender = locks.clone();
		let handle = tokio::spawn(async move {
			let _guard = contender.acquire("MyTask").await;
		});

		tokio::time::sleep(Duration::from_millis(20)).await;
		assert!(!handle.is_finished());

		drop(guard);
		handle.await.unwrap();
	}

	#[tokio::test]
	async fn test_different_keys_do_not_block() {
		let locks = IdentityLocks::new();
		let _first = locks.acquire("MyTask").await;
		let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire("OtherTask")).await;
		assert!(second.is_ok());
	}
}
