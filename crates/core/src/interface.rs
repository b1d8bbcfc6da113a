// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Collaborator seams of the dictionary cache. The cache never reaches
//! into persistent storage, the lock subsystem or the B-tree layer
//! directly; everything it needs from them comes through these traits.

use std::time::Duration;

use crate::{TableDef, TableId};

/// Reads table metadata from persistent storage. Returns a fully formed,
/// uncached definition or `None` when the catalog has no such table.
///
/// Implementations may block on I/O; the cache guarantees it never calls
/// the loader while holding its internal mutex.
pub trait TableLoader: Send + Sync {
	fn load_by_name(&self, name: &str) -> Option<TableDef>;
	fn load_by_id(&self, id: TableId) -> Option<TableDef>;
}

/// The external metadata lock manager, keyed by qualified table name and
/// independent of the cache's own locking. `acquire` may block up to the
/// given timeout.
pub trait NameLockManager {
	type Lock;

	/// Non-blocking acquisition; `None` on contention.
	fn try_acquire(&self, name: &str) -> Option<Self::Lock>;

	fn acquire(&self, name: &str, timeout: Duration) -> Result<Self::Lock, LockWaitTimeout>;

	fn release(&self, lock: Self::Lock);
}

/// Returned by [`NameLockManager::acquire`] when the wait timeout elapsed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LockWaitTimeout;

/// Lets the eviction path ask the row-lock subsystem whether any
/// transaction still holds locks on a table's rows.
pub trait RowLockInspector: Send + Sync {
	fn has_locks(&self, table: TableId) -> bool;
}

/// Physically removes indexes left behind by an aborted online build.
/// Invoked by the cache after eviction or close when a table carries the
/// abort flag; `expected_refs` is the handle count the table is known to
/// have at that point.
pub trait DropExecutor: Send + Sync {
	fn drop_aborted_indexes(&self, table: TableId, expected_refs: u32);
}
