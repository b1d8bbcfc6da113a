// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Deferred index reclamation.
//!
//! The external lookup accelerator pins index pages without holding the
//! cache mutex, so a dropped index cannot be freed while pins remain. Such
//! indexes move to their table's freed list and are reclaimed by
//! [`Directory::sweep_freed`] once the accelerator lets go.

use std::sync::Arc;

use talus_core::{IndexId, IndexKind};
use tracing::{debug, instrument};

use crate::{
	builder,
	directory::{Directory, DirectoryInner},
	object::{Index, Table, TableHandle},
};

/// Unlink the index at `position`. Freed immediately when unpinned,
/// otherwise flagged and parked on the freed list.
pub(crate) fn remove_index_at(table: &mut Table, position: usize) {
	let index = table.indexes.remove(position);
	if index.kind == IndexKind::FullText {
		if let Some(fts) = table.fts.as_mut() {
			fts.indexes.retain(|&id| id != index.id);
		}
	}
	if index.pin_count() > 0 {
		index.set_freed();
		table.freed_indexes.push(index);
	}
}

pub(crate) fn remove_all_indexes(table: &mut Table) {
	while !table.indexes.is_empty() {
		remove_index_at(table, table.indexes.len() - 1);
	}
}

/// Replace a pinned index with a fresh deep copy at the same position, so
/// DDL can repopulate statistics while the old copy drains its pins on the
/// freed list. An unpinned index is returned as is.
pub(crate) fn clone_index_if_pinned(table: &mut Table, id: IndexId) -> Option<Arc<Index>> {
	let position = table.index_position(id)?;
	let current = Arc::clone(&table.indexes[position]);
	if current.pin_count() == 0 {
		return Some(current);
	}
	let fresh = Arc::new(current.deep_clone());
	table.indexes[position] = Arc::clone(&fresh);
	current.set_freed();
	table.freed_indexes.push(current);
	Some(fresh)
}

impl DirectoryInner {
	/// Drop freed indexes whose pins have drained, and free placeholder
	/// tables that kept only such indexes alive. Returns the number of
	/// indexes reclaimed.
	pub(crate) fn sweep_freed(&mut self) -> usize {
		let mut reclaimed = 0;
		let handles: Vec<TableHandle> = self.tables.iter().map(|(handle, _)| handle).collect();
		for handle in handles {
			let table = self.tables.get_mut(handle).expect("handle just enumerated");
			let before = table.freed_indexes.len();
			table.freed_indexes.retain(|index| index.pin_count() > 0);
			reclaimed += before - table.freed_indexes.len();
		}

		let zombies = std::mem::take(&mut self.zombies);
		for handle in zombies {
			if self.tables.get(handle).is_some_and(|table| table.freed_indexes.is_empty()) {
				self.tables.remove(handle);
			} else {
				self.zombies.push(handle);
			}
		}
		reclaimed
	}
}

impl Directory {
	/// Build and link a new index on a cached table, as online DDL does.
	/// `add_v` carries virtual columns added by the same statement.
	#[instrument(name = "dict::add_index", level = "trace", skip(self, def, add_v), fields(index = %def.name))]
	pub fn add_index(
		&self,
		handle: TableHandle,
		def: talus_core::IndexDef,
		add_v: &[talus_core::ColumnDef],
	) -> crate::Result<Arc<Index>> {
		let mut inner = self.inner.lock();
		builder::install_index(inner.table_mut(handle), def, add_v)
	}

	/// Drop an active index. Returns whether the index was found.
	#[instrument(name = "dict::drop_index", level = "trace", skip(self))]
	pub fn drop_index(&self, handle: TableHandle, id: IndexId) -> bool {
		let mut inner = self.inner.lock();
		let table = inner.table_mut(handle);
		let Some(position) = table.index_position(id) else {
			return false;
		};
		remove_index_at(table, position);
		true
	}

	/// See [`clone_index_if_pinned`].
	pub fn clone_index_if_pinned(&self, handle: TableHandle, id: IndexId) -> Option<Arc<Index>> {
		let mut inner = self.inner.lock();
		clone_index_if_pinned(inner.table_mut(handle), id)
	}

	#[instrument(name = "dict::sweep_freed", level = "trace", skip(self))]
	pub fn sweep_freed(&self) -> usize {
		let reclaimed = self.inner.lock().sweep_freed();
		if reclaimed > 0 {
			debug!(reclaimed, "reclaimed freed indexes");
		}
		reclaimed
	}
}

#[cfg(test)]
mod tests {
	use talus_core::{ColumnDef, DataType, IndexDef, IndexFieldDef, TableDef, TableId};

	use super::*;

	fn create_test_table() -> Table {
		let def = TableDef {
			id: TableId(1),
			name: "db/t".to_string(),
			temporary: false,
			columns: vec![
				ColumnDef::new("a", DataType::Int, false),
				ColumnDef::new("b", DataType::Int, true),
			],
			indexes: vec![
				IndexDef::new(
					talus_core::IndexId(1),
					"PRIMARY",
					IndexKind::Clustered,
					true,
					vec![IndexFieldDef::whole("a")],
				),
				IndexDef::new(
					talus_core::IndexId(2),
					"idx_b",
					IndexKind::Secondary,
					false,
					vec![IndexFieldDef::whole("b")],
				),
			],
			foreign_keys: vec![],
		};
		let (mut table, index_defs, _) = Table::from_def(def).unwrap();
		for index_def in index_defs {
			builder::install_index(&mut table, index_def, &[]).unwrap();
		}
		table
	}

	#[test]
	fn test_unpinned_index_is_freed_immediately() {
		let mut table = create_test_table();
		remove_index_at(&mut table, 1);
		assert_eq!(table.indexes.len(), 1);
		assert!(table.freed_indexes.is_empty());
	}

	#[test]
	fn test_pinned_index_parks_on_freed_list() {
		let mut table = create_test_table();
		table.indexes[1].pin();
		remove_index_at(&mut table, 1);
		assert_eq!(table.indexes.len(), 1);
		assert_eq!(table.freed_indexes.len(), 1);
		assert!(table.freed_indexes[0].is_freed());
	}

	#[test]
	fn test_clone_splices_at_same_position() {
		let mut table = create_test_table();
		let id = table.indexes[1].id;
		table.indexes[1].pin();
		let old = Arc::clone(&table.indexes[1]);

		let fresh = clone_index_if_pinned(&mut table, id).unwrap();
		assert_eq!(table.index_position(id), Some(1));
		assert!(!Arc::ptr_eq(&fresh, &old));
		assert!(old.is_freed());
		assert_eq!(fresh.pin_count(), 0);
		assert_eq!(table.freed_indexes.len(), 1);
	}

	#[test]
	fn test_clone_of_unpinned_index_is_identity() {
		let mut table = create_test_table();
		let id = table.indexes[1].id;
		let same = clone_index_if_pinned(&mut table, id).unwrap();
		assert!(Arc::ptr_eq(&same, &table.indexes[1]));
		assert!(table.freed_indexes.is_empty());
	}
}
