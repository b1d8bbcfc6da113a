// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables of the dictionary cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictConfig {
	/// Soft limit on the number of cached tables. `make_room` evicts
	/// towards this target; the cache may exceed it temporarily.
	pub max_tables: usize,

	/// Percentage of the LRU list scanned per `make_room` pass, from
	/// the least-recently-used end.
	pub evict_scan_pct: u32,

	/// Initial capacity of the name and id hash maps.
	pub initial_capacity: usize,

	/// A thread waiting longer than this for the cache mutex is treated
	/// as evidence of a stuck mutex; the process is terminated.
	pub mutex_fatal_timeout: Duration,

	/// Wait budget for the blocking variant of the name-stable lock
	/// protocol.
	pub name_lock_timeout: Duration,
}

impl Default for DictConfig {
	fn default() -> Self {
		Self {
			max_tables: 2000,
			evict_scan_pct: 50,
			initial_capacity: 128,
			mutex_fatal_timeout: Duration::from_secs(600),
			name_lock_timeout: Duration::from_secs(50),
		}
	}
}
