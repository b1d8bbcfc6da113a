// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The dictionary cache proper: arenas, lookup maps, the LRU and pinned
//! lists and the mutex/latch pair guarding them.

mod evict;
mod mdl;
mod open;
mod rename;

pub use mdl::OpenedTable;

use std::{collections::HashMap, sync::Arc};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use talus_core::{DropExecutor, ForeignKeyDef, IndexId, RowLockInspector, TableDef, TableId, TableLoader};
use tracing::instrument;

use crate::{
	arena::Arena,
	config::DictConfig,
	foreign::{self, ForeignAddOptions},
	mutex::WatchdogMutex,
	object::{ForeignKey, Index, Table, TableHandle},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ListKind {
	Lru,
	Pinned,
}

#[derive(Debug, Default)]
pub(crate) struct ListAnchor {
	pub(crate) head: Option<TableHandle>,
	pub(crate) tail: Option<TableHandle>,
	pub(crate) len: usize,
}

pub(crate) struct DirectoryInner {
	pub(crate) tables: Arena<Table>,
	pub(crate) foreigns: Arena<ForeignKey>,

	/// Qualified name to handle, all cached tables.
	pub(crate) by_name: HashMap<String, TableHandle>,
	/// Persistent and temporary ids live in disjoint namespaces.
	pub(crate) by_id: HashMap<TableId, TableHandle>,
	pub(crate) by_temp_id: HashMap<TableId, TableHandle>,

	/// Evictable tables, most recently used first.
	pub(crate) lru: ListAnchor,
	/// Non-evictable tables, in no particular order.
	pub(crate) pinned: ListAnchor,

	/// Placeholders whose freed indexes are still pinned. Not in any map
	/// or list.
	pub(crate) zombies: Vec<TableHandle>,
}

impl DirectoryInner {
	pub(crate) fn new(config: &DictConfig) -> Self {
		Self {
			tables: Arena::new(),
			foreigns: Arena::new(),
			by_name: HashMap::with_capacity(config.initial_capacity),
			by_id: HashMap::with_capacity(config.initial_capacity),
			by_temp_id: HashMap::new(),
			lru: ListAnchor::default(),
			pinned: ListAnchor::default(),
			zombies: Vec::new(),
		}
	}

	pub(crate) fn table(&self, handle: TableHandle) -> &Table {
		self.tables.get(handle).expect("stale table handle")
	}

	pub(crate) fn table_mut(&mut self, handle: TableHandle) -> &mut Table {
		self.tables.get_mut(handle).expect("stale table handle")
	}

	pub(crate) fn lookup_by_name(&self, name: &str) -> Option<TableHandle> {
		self.by_name.get(name).copied()
	}

	pub(crate) fn lookup_by_id(&self, id: TableId, temporary: bool) -> Option<TableHandle> {
		if temporary {
			self.by_temp_id.get(&id).copied()
		} else {
			self.by_id.get(&id).copied()
		}
	}

	fn anchor(&self, kind: ListKind) -> &ListAnchor {
		match kind {
			ListKind::Lru => &self.lru,
			ListKind::Pinned => &self.pinned,
		}
	}

	fn anchor_mut(&mut self, kind: ListKind) -> &mut ListAnchor {
		match kind {
			ListKind::Lru => &mut self.lru,
			ListKind::Pinned => &mut self.pinned,
		}
	}

	pub(crate) fn list_kind(&self, handle: TableHandle) -> ListKind {
		if self.table(handle).can_be_evicted {
			ListKind::Lru
		} else {
			ListKind::Pinned
		}
	}

	pub(crate) fn push_front(&mut self, kind: ListKind, handle: TableHandle) {
		let head = self.anchor(kind).head;
		{
			let table = self.table_mut(handle);
			table.prev = None;
			table.next = head;
		}
		if let Some(old_head) = head {
			self.table_mut(old_head).prev = Some(handle);
		}
		let anchor = self.anchor_mut(kind);
		anchor.head = Some(handle);
		if anchor.tail.is_none() {
			anchor.tail = Some(handle);
		}
		anchor.len += 1;
	}

	pub(crate) fn unlink(&mut self, kind: ListKind, handle: TableHandle) {
		let (prev, next) = {
			let table = self.table_mut(handle);
			(table.prev.take(), table.next.take())
		};
		match prev {
			Some(prev) => self.table_mut(prev).next = next,
			None => self.anchor_mut(kind).head = next,
		}
		match next {
			Some(next) => self.table_mut(next).prev = prev,
			None => self.anchor_mut(kind).tail = prev,
		}
		self.anchor_mut(kind).len -= 1;
	}

	fn move_to_front(&mut self, kind: ListKind, handle: TableHandle) {
		if self.anchor(kind).head == Some(handle) {
			return;
		}
		self.unlink(kind, handle);
		self.push_front(kind, handle);
	}

	/// Register a new table. The caller has already checked or asserted
	/// name and id uniqueness; a duplicate here is a contract violation.
	pub(crate) fn insert_table(&mut self, def: TableDef, can_be_evicted: bool) -> crate::Result<TableHandle> {
		let (mut table, index_defs, fk_defs) = Table::from_def(def)?;
		assert!(!self.by_name.contains_key(&table.name), "table `{}` is already cached", table.name);
		table.can_be_evicted = can_be_evicted;

		let name = table.name.clone();
		let id = table.id;
		let temporary = table.temporary;
		let handle = self.tables.insert(table);

		for index_def in index_defs {
			let table = self.table_mut(handle);
			if let Err(err) = crate::builder::install_index(table, index_def, &[]) {
				self.tables.remove(handle);
				return Err(err);
			}
		}

		let id_map = if temporary { &mut self.by_temp_id } else { &mut self.by_id };
		let previous = id_map.insert(id, handle);
		assert!(previous.is_none(), "table id {id} is already cached");
		self.by_name.insert(name, handle);
		self.push_front(self.list_kind(handle), handle);

		// Constraints of a freshly loaded table tolerate a missing
		// referenced-side index; DDL goes through the strict entry point.
		for fk_def in fk_defs {
			foreign::add_foreign_locked(
				self,
				fk_def,
				ForeignAddOptions {
					check_types: false,
					ignore_missing_index: true,
				},
			)?;
		}
		foreign::reconcile_for_table(self, handle);
		Ok(handle)
	}

	pub(crate) fn acquire(&mut self, handle: TableHandle) {
		if self.table(handle).can_be_evicted {
			self.move_to_front(ListKind::Lru, handle);
		}
		self.table_mut(handle).acquire();
	}

	/// Returns whether the released reference was the last one.
	pub(crate) fn release(&mut self, handle: TableHandle) -> bool {
		self.table_mut(handle).release()
	}

	pub(crate) fn prevent_eviction(&mut self, handle: TableHandle) {
		if self.table(handle).can_be_evicted {
			self.unlink(ListKind::Lru, handle);
			self.table_mut(handle).can_be_evicted = false;
			self.push_front(ListKind::Pinned, handle);
		}
	}

	pub(crate) fn allow_eviction(&mut self, handle: TableHandle) {
		if !self.table(handle).can_be_evicted {
			let table = self.table(handle);
			assert!(
				table.foreign_set.is_empty() && table.referenced_set.is_empty(),
				"table `{}` participates in foreign keys and must stay pinned",
				table.name
			);
			self.unlink(ListKind::Pinned, handle);
			self.table_mut(handle).can_be_evicted = true;
			self.push_front(ListKind::Lru, handle);
		}
	}

	pub(crate) fn change_id(&mut self, handle: TableHandle, new_id: TableId) {
		let table = self.table(handle);
		assert!(!table.temporary, "persistent id change on temporary table `{}`", table.name);
		assert!(!self.by_id.contains_key(&new_id), "table id {new_id} is already cached");
		let old_id = table.id;
		self.by_id.remove(&old_id);
		self.by_id.insert(new_id, handle);
		self.table_mut(handle).id = new_id;
	}

	fn resize(&mut self, capacity: usize) {
		let capacity = capacity.max(self.by_name.len());
		let mut by_name = HashMap::with_capacity(capacity);
		by_name.extend(self.by_name.drain());
		self.by_name = by_name;
		let mut by_id = HashMap::with_capacity(capacity);
		by_id.extend(self.by_id.drain());
		self.by_id = by_id;
	}

	/// Walks both lists and cross-checks them against the maps. Debug aid,
	/// called from tests.
	pub(crate) fn validate(&self) {
		for (kind, evictable) in [(ListKind::Lru, true), (ListKind::Pinned, false)] {
			let mut count = 0;
			let mut prev = None;
			let mut cursor = self.anchor(kind).head;
			while let Some(handle) = cursor {
				let table = self.table(handle);
				assert_eq!(table.can_be_evicted, evictable);
				assert_eq!(table.prev, prev);
				prev = Some(handle);
				cursor = table.next;
				count += 1;
			}
			assert_eq!(self.anchor(kind).tail, prev);
			assert_eq!(self.anchor(kind).len, count);
		}
		// Tables removed with `keep` stay in the arena while their DDL
		// owns them, in no list and no map.
		let listed = self.lru.len + self.pinned.len;
		assert!(listed + self.zombies.len() <= self.tables.len());
		assert_eq!(self.by_name.len(), listed);
		assert_eq!(self.by_id.len() + self.by_temp_id.len(), listed);
	}
}

/// The in-memory dictionary cache.
///
/// All structural state sits behind one mutex; the outer latch serializes
/// DDL against everything else without blocking plain cache hits.
pub struct Directory {
	pub(crate) inner: WatchdogMutex<DirectoryInner>,
	latch: RwLock<()>,
	pub(crate) config: DictConfig,
	pub(crate) loader: Arc<dyn TableLoader>,
	pub(crate) row_locks: Arc<dyn RowLockInspector>,
	pub(crate) drop_executor: Arc<dyn DropExecutor>,
}

impl Directory {
	pub fn new(
		config: DictConfig,
		loader: Arc<dyn TableLoader>,
		row_locks: Arc<dyn RowLockInspector>,
		drop_executor: Arc<dyn DropExecutor>,
	) -> Self {
		let inner = DirectoryInner::new(&config);
		let fatal = config.mutex_fatal_timeout;
		Self {
			inner: WatchdogMutex::new(inner, fatal),
			latch: RwLock::new(()),
			config,
			loader,
			row_locks,
			drop_executor,
		}
	}

	/// Shared latch for operations that only read dictionary objects.
	pub fn latch_shared(&self) -> RwLockReadGuard<'_, ()> {
		self.latch.read()
	}

	/// Exclusive latch for DDL; held across whole statements, far longer
	/// than the internal mutex ever is.
	pub fn latch_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
		self.latch.write()
	}

	pub fn table_count(&self) -> usize {
		let inner = self.inner.lock();
		inner.lru.len + inner.pinned.len
	}

	pub fn find_by_name(&self, name: &str) -> Option<TableHandle> {
		self.inner.lock().lookup_by_name(name)
	}

	pub fn find_by_id(&self, id: TableId, temporary: bool) -> Option<TableHandle> {
		self.inner.lock().lookup_by_id(id, temporary)
	}

	/// Run `f` against the cached table, under the cache mutex. `None`
	/// when the handle is stale.
	pub fn with_table<R>(&self, handle: TableHandle, f: impl FnOnce(&Table) -> R) -> Option<R> {
		let inner = self.inner.lock();
		inner.tables.get(handle).map(f)
	}

	pub(crate) fn with_table_mut<R>(&self, handle: TableHandle, f: impl FnOnce(&mut Table) -> R) -> Option<R> {
		let mut inner = self.inner.lock();
		inner.tables.get_mut(handle).map(f)
	}

	/// Insert a table built by DDL. Pinned tables (`can_be_evicted` false)
	/// are engine-internal ones that must never leave the cache.
	#[instrument(name = "dict::insert", level = "trace", skip(self, def), fields(table = %def.name))]
	pub fn insert(&self, def: TableDef, can_be_evicted: bool) -> crate::Result<TableHandle> {
		self.inner.lock().insert_table(def, can_be_evicted)
	}

	/// A shared pointer to one of the table's active indexes.
	pub fn index(&self, handle: TableHandle, id: IndexId) -> Option<Arc<Index>> {
		let inner = self.inner.lock();
		inner.tables.get(handle)?.index_by_id(id).cloned()
	}

	/// Mark a table corrupted. Corrupted tables stay cached and pinned so
	/// the state survives until a DDL repair, but refuse data access.
	#[instrument(name = "dict::mark_corrupted", level = "trace", skip(self))]
	pub fn mark_corrupted(&self, handle: TableHandle) {
		let mut inner = self.inner.lock();
		if inner.tables.contains(handle) {
			inner.table_mut(handle).corrupted = true;
			inner.prevent_eviction(handle);
		}
	}

	pub fn prevent_eviction(&self, handle: TableHandle) {
		self.inner.lock().prevent_eviction(handle);
	}

	pub fn allow_eviction(&self, handle: TableHandle) {
		self.inner.lock().allow_eviction(handle);
	}

	/// Move a table to a new persistent id, as DDL import/rebuild does.
	#[instrument(name = "dict::change_id", level = "trace", skip(self))]
	pub fn change_id(&self, handle: TableHandle, new_id: TableId) {
		self.inner.lock().change_id(handle, new_id);
	}

	/// Rebuild the hash maps for an expected table count.
	pub fn resize(&self, capacity: usize) {
		self.inner.lock().resize(capacity);
	}

	#[instrument(name = "dict::add_foreign", level = "trace", skip(self, def), fields(constraint = %def.id))]
	pub fn add_foreign(&self, def: ForeignKeyDef, check_types: bool, ignore_missing_index: bool) -> crate::Result<()> {
		let mut inner = self.inner.lock();
		foreign::add_foreign_locked(
			&mut inner,
			def,
			ForeignAddOptions {
				check_types,
				ignore_missing_index,
			},
		)
		.map(|_| ())
	}

	/// Drop a constraint owned by the given table. Returns whether it was
	/// found.
	#[instrument(name = "dict::remove_foreign", level = "trace", skip(self))]
	pub fn remove_foreign(&self, handle: TableHandle, constraint: &str) -> bool {
		let mut inner = self.inner.lock();
		let Some(position) = inner
			.table(handle)
			.foreign_set
			.iter()
			.position(|&fk| inner.foreigns.get(fk).is_some_and(|fk| fk.id == constraint))
		else {
			return false;
		};
		let fk = inner.table(handle).foreign_set[position];
		foreign::remove_foreign_locked(&mut inner, fk);
		true
	}

	/// Assert the list/map consistency invariants. Debug builds only.
	#[cfg(debug_assertions)]
	pub fn validate(&self) {
		self.inner.lock().validate();
	}
}
