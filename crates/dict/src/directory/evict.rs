// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Eviction and removal. `make_room` trims the LRU tail towards the
//! configured table limit; `remove` takes one table out of the cache,
//! leaving a placeholder behind when freed indexes are still pinned.

use talus_core::{RowLockInspector, TableId};
use tracing::{debug, instrument};

use crate::{
	directory::{Directory, DirectoryInner},
	foreign,
	object::TableHandle,
	reclaim,
};

/// A physical drop of aborted indexes that must run after the cache mutex
/// is released.
pub(crate) struct DropRequest {
	pub(crate) table: TableId,
	pub(crate) expected_refs: u32,
}

impl DirectoryInner {
	/// Whether eviction may take this table right now. Only tables on the
	/// LRU list are ever asked.
	pub(crate) fn can_evict(&self, handle: TableHandle, row_locks: &dyn RowLockInspector) -> bool {
		let table = self.table(handle);
		debug_assert!(table.can_be_evicted);
		table.ref_count() == 0
			&& table.foreign_set.is_empty()
			&& table.referenced_set.is_empty()
			&& !table.has_pinned_indexes()
			&& !row_locks.has_locks(table.id)
	}

	/// Evict cold tables until the cache fits `max_tables`, scanning at
	/// most `scan_pct` percent of the LRU list from its cold end. Returns
	/// the number of tables evicted, and any deferred drop requests.
	pub(crate) fn make_room(
		&mut self,
		max_tables: usize,
		scan_pct: u32,
		row_locks: &dyn RowLockInspector,
	) -> (usize, Vec<DropRequest>) {
		let len = self.lru.len;
		let cached = len + self.pinned.len;
		if cached <= max_tables {
			return (0, Vec::new());
		}

		// Only the coldest `scan_pct` percent is considered; the budget
		// deliberately truncates. More than 100 means the whole list.
		let scan_pct = scan_pct.min(100) as usize;
		let check_up_to = len - len * scan_pct / 100;
		let mut position = len;
		let mut evicted = 0;
		let mut drops = Vec::new();

		let mut cursor = self.lru.tail;
		while let Some(handle) = cursor {
			if position <= check_up_to || cached - evicted <= max_tables {
				break;
			}
			cursor = self.table(handle).prev;
			position -= 1;

			if self.can_evict(handle, row_locks) {
				if let Some(drop) = self.remove_table(handle, true, false) {
					drops.push(drop);
				}
				evicted += 1;
			}
		}
		if evicted > 0 {
			debug!(evicted, remaining = self.lru.len + self.pinned.len, "evicted cold tables");
		}
		(evicted, drops)
	}

	/// Take a table out of the cache. With `keep` the caller retains the
	/// detached object in the arena (DDL rebuild does this); otherwise the
	/// slot is freed, unless pinned freed indexes force a placeholder.
	///
	/// Returns the deferred drop request for aborted indexes, if the
	/// eviction of a drop-flagged table calls for one.
	pub(crate) fn remove_table(&mut self, handle: TableHandle, lru_evict: bool, keep: bool) -> Option<DropRequest> {
		assert_eq!(self.table(handle).ref_count(), 0, "removing a referenced table");

		foreign::detach_all(self, handle);
		reclaim::remove_all_indexes(self.table_mut(handle));

		let (name, id, temporary) = {
			let table = self.table(handle);
			(table.name.clone(), table.id, table.temporary)
		};
		self.by_name.remove(&name);
		if temporary {
			self.by_temp_id.remove(&id);
		} else {
			self.by_id.remove(&id);
		}
		self.unlink(self.list_kind(handle), handle);

		let table = self.table_mut(handle);
		let drop = (lru_evict && table.drop_aborted).then_some(DropRequest {
			table: id,
			expected_refs: 0,
		});

		if keep {
			return drop;
		}
		if !table.freed_indexes.is_empty() {
			// Pinned freed indexes outlive the table as a placeholder
			// until the accelerator lets go.
			table.clear_to_placeholder();
			self.zombies.push(handle);
		} else {
			self.tables.remove(handle);
		}
		drop
	}
}

impl Directory {
	/// Evict cold tables towards the configured limit. Runs the deferred
	/// physical drops outside the cache mutex.
	#[instrument(name = "dict::make_room", level = "trace", skip(self))]
	pub fn make_room(&self) -> usize {
		let (evicted, drops) = {
			let mut inner = self.inner.lock();
			inner.make_room(self.config.max_tables, self.config.evict_scan_pct, &*self.row_locks)
		};
		for drop in drops {
			self.drop_executor.drop_aborted_indexes(drop.table, drop.expected_refs);
		}
		evicted
	}

	/// Remove a table from the cache. The caller guarantees no outstanding
	/// references; DDL drop and rebuild paths use this.
	#[instrument(name = "dict::remove", level = "trace", skip(self))]
	pub fn remove(&self, handle: TableHandle, keep: bool) {
		let drop = self.inner.lock().remove_table(handle, false, keep);
		debug_assert!(drop.is_none());
		let _ = drop;
	}

	/// Drop every cached object. Shutdown path; asserts that nothing is
	/// referenced anymore.
	pub fn clear(&self) {
		let mut inner = self.inner.lock();
		let mut handles: Vec<TableHandle> = Vec::with_capacity(inner.by_name.len());
		handles.extend(inner.by_name.values().copied());
		for handle in handles {
			inner.remove_table(handle, false, false);
		}
	}
}
