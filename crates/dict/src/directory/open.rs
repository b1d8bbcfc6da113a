// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Reference-counted open and close. A cache miss falls through to the
//! loader with the mutex released; whoever wins the reinsert race supplies
//! the table for everyone.

use talus_core::TableId;
use tracing::instrument;

use crate::{Error, directory::Directory, object::TableHandle};

impl Directory {
	/// Open a table by qualified name, loading it on a miss. Opening
	/// bumps the reference count and refreshes the LRU position.
	#[instrument(name = "dict::open_by_name", level = "trace", skip(self))]
	pub fn open_by_name(&self, name: &str) -> crate::Result<TableHandle> {
		{
			let mut inner = self.inner.lock();
			if let Some(handle) = inner.lookup_by_name(name) {
				inner.acquire(handle);
				return Ok(handle);
			}
		}

		// The loader may block on I/O; it runs with the mutex released.
		let def = self.loader.load_by_name(name).ok_or_else(|| Error::TableNotFound {
			name: name.to_string(),
		})?;
		self.insert_loaded(def, |inner| inner.lookup_by_name(name))
	}

	/// Open a table by id. Temporary ids resolve against the cache only;
	/// temporary tables exist nowhere else.
	#[instrument(name = "dict::open_by_id", level = "trace", skip(self))]
	pub fn open_by_id(&self, id: TableId, temporary: bool) -> crate::Result<TableHandle> {
		{
			let mut inner = self.inner.lock();
			if let Some(handle) = inner.lookup_by_id(id, temporary) {
				inner.acquire(handle);
				return Ok(handle);
			}
		}
		if temporary {
			return Err(Error::TableIdNotFound { id });
		}

		let def = self.loader.load_by_id(id).ok_or(Error::TableIdNotFound { id })?;
		self.insert_loaded(def, |inner| inner.lookup_by_id(id, false))
	}

	fn insert_loaded(
		&self,
		def: talus_core::TableDef,
		lookup: impl Fn(&super::DirectoryInner) -> Option<TableHandle>,
	) -> crate::Result<TableHandle> {
		let mut inner = self.inner.lock();
		// Another thread may have inserted it while the mutex was free;
		// its copy wins. Trimming back towards the size limit is left to
		// the periodic `make_room` caller.
		let handle = match lookup(&inner) {
			Some(handle) => handle,
			None => inner.insert_table(def, true)?,
		};
		inner.acquire(handle);
		Ok(handle)
	}

	/// Release one reference. With `try_drop`, the last release of a table
	/// flagged by an aborted online build triggers the physical drop of
	/// its orphan indexes, outside the mutex. Returns whether this was the
	/// last reference.
	#[instrument(name = "dict::close", level = "trace", skip(self))]
	pub fn close(&self, handle: TableHandle, try_drop: bool) -> bool {
		let (last, drop) = {
			let mut inner = self.inner.lock();
			let last = inner.release(handle);
			let table = inner.table(handle);
			let drop = (last && try_drop && table.drop_aborted).then_some(table.id);
			(last, drop)
		};
		if let Some(id) = drop {
			self.drop_executor.drop_aborted_indexes(id, 0);
		}
		last
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::Ordering;

	use talus_core::TableId;

	use crate::{Error, testing};

	#[test]
	fn test_open_hits_cache_after_first_load() {
		let (directory, state) = testing::create_test_directory(vec![testing::simple_table_def(1, "db/t")]);
		let first = directory.open_by_name("db/t").unwrap();
		let second = directory.open_by_name("db/t").unwrap();
		assert_eq!(first, second);
		assert_eq!(state.loads.load(Ordering::Relaxed), 1);
		assert_eq!(directory.with_table(first, |t| t.ref_count()).unwrap(), 2);

		directory.close(first, false);
		directory.close(second, false);
		assert_eq!(directory.with_table(first, |t| t.ref_count()).unwrap(), 0);
		directory.validate();
	}

	#[test]
	fn test_open_missing_table() {
		let (directory, _) = testing::create_test_directory(vec![]);
		assert!(matches!(
			directory.open_by_name("db/none"),
			Err(Error::TableNotFound { .. })
		));
		assert!(matches!(
			directory.open_by_id(TableId(9), false),
			Err(Error::TableIdNotFound { .. })
		));
	}

	#[test]
	fn test_open_by_id_temporary_never_loads() {
		let (directory, state) = testing::create_test_directory(vec![testing::simple_table_def(5, "db/tmp")]);
		let err = directory.open_by_id(TableId(5), true).unwrap_err();
		assert!(matches!(err, Error::TableIdNotFound { .. }));
		assert_eq!(state.loads.load(Ordering::Relaxed), 0);
	}

	#[test]
	fn test_temporary_table_resolves_through_its_own_namespace() {
		let (directory, _) = testing::create_test_directory(vec![]);
		let mut def = testing::simple_table_def(7, "db/tmp");
		def.temporary = true;
		let handle = directory.insert(def, true).unwrap();
		assert_eq!(directory.find_by_id(TableId(7), true), Some(handle));
		assert_eq!(directory.find_by_id(TableId(7), false), None);
	}

	#[test]
	fn test_last_close_of_drop_aborted_table_requests_drop() {
		let (directory, state) = testing::create_test_directory(vec![testing::simple_table_def(1, "db/t")]);
		let handle = directory.open_by_name("db/t").unwrap();
		directory.with_table_mut(handle, |t| t.drop_aborted = true);

		directory.close(handle, true);
		assert_eq!(*state.dropped.lock(), vec![TableId(1)]);
	}
}
