// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! In-memory dictionary cache.
//!
//! Holds the metadata of recently used tables (columns, indexes, foreign
//! keys) so DML and DDL never touch persistent storage for metadata on the
//! hot path. One [`Directory`] instance owns all cached objects: lookup by
//! name or id, reference-counted open/close, LRU eviction of cold tables
//! and the foreign key constraint graph all live behind its mutex.
//!
//! Persistent storage, metadata locking, row locks and the physical drop
//! of orphan indexes are collaborator seams, declared in `talus-core`.

mod arena;
mod builder;
mod config;
mod directory;
mod error;
mod foreign;
mod mutex;
pub mod object;
mod reclaim;

pub use config::DictConfig;
pub use directory::{Directory, OpenedTable};
pub use error::Error;
pub use foreign::GENERATED_FK_SUFFIX;

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
pub(crate) mod testing {
	use std::{
		collections::{HashMap, HashSet},
		sync::{Arc, atomic::AtomicUsize, atomic::Ordering},
	};

	use parking_lot::Mutex;
	use talus_core::{
		ColumnDef, DataType, DropExecutor, ForeignKeyDef, IndexDef, IndexFieldDef, IndexId, IndexKind,
		ReferentialAction, RowLockInspector, TableDef, TableId, TableLoader,
	};

	use crate::{DictConfig, Directory};

	/// Loader, row-lock inspector and drop executor in one, with enough
	/// recording for assertions.
	#[derive(Default)]
	pub(crate) struct TestState {
		pub(crate) defs: Mutex<HashMap<String, TableDef>>,
		pub(crate) loads: AtomicUsize,
		pub(crate) dropped: Mutex<Vec<TableId>>,
		pub(crate) row_locked: Mutex<HashSet<TableId>>,
	}

	impl TableLoader for TestState {
		fn load_by_name(&self, name: &str) -> Option<TableDef> {
			let def = self.defs.lock().get(name).cloned()?;
			self.loads.fetch_add(1, Ordering::Relaxed);
			Some(def)
		}

		fn load_by_id(&self, id: TableId) -> Option<TableDef> {
			let def = self.defs.lock().values().find(|def| def.id == id).cloned()?;
			self.loads.fetch_add(1, Ordering::Relaxed);
			Some(def)
		}
	}

	impl RowLockInspector for TestState {
		fn has_locks(&self, table: TableId) -> bool {
			self.row_locked.lock().contains(&table)
		}
	}

	impl DropExecutor for TestState {
		fn drop_aborted_indexes(&self, table: TableId, _expected_refs: u32) {
			self.dropped.lock().push(table);
		}
	}

	pub(crate) fn create_test_directory(defs: Vec<TableDef>) -> (Arc<Directory>, Arc<TestState>) {
		create_test_directory_with_config(DictConfig::default(), defs)
	}

	/// Route test logs through the tracing stack; `RUST_LOG` controls
	/// verbosity.
	fn init_tracing() {
		let _ = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_test_writer()
			.try_init();
	}

	pub(crate) fn create_test_directory_with_config(
		config: DictConfig,
		defs: Vec<TableDef>,
	) -> (Arc<Directory>, Arc<TestState>) {
		init_tracing();
		let state = Arc::new(TestState::default());
		state.defs.lock().extend(defs.into_iter().map(|def| (def.name.clone(), def)));
		let directory = Arc::new(Directory::new(
			config,
			Arc::clone(&state) as Arc<dyn TableLoader>,
			Arc::clone(&state) as Arc<dyn RowLockInspector>,
			Arc::clone(&state) as Arc<dyn DropExecutor>,
		));
		(directory, state)
	}

	/// One BIGINT column `a` under a unique clustered key.
	pub(crate) fn simple_table_def(id: u64, name: &str) -> TableDef {
		TableDef {
			id: TableId(id),
			name: name.to_string(),
			temporary: false,
			columns: vec![ColumnDef::new("a", DataType::BigInt, false)],
			indexes: vec![IndexDef::new(
				IndexId(id * 10),
				"PRIMARY",
				IndexKind::Clustered,
				true,
				vec![IndexFieldDef::whole("a")],
			)],
			foreign_keys: vec![],
		}
	}

	/// Columns `id` and `parent`, with a secondary index on `parent` so
	/// the table qualifies for either side of a foreign key.
	pub(crate) fn linked_table_def(id: u64, name: &str) -> TableDef {
		TableDef {
			id: TableId(id),
			name: name.to_string(),
			temporary: false,
			columns: vec![
				ColumnDef::new("id", DataType::BigInt, false),
				ColumnDef::new("parent", DataType::BigInt, true),
			],
			indexes: vec![
				IndexDef::new(
					IndexId(id * 10),
					"PRIMARY",
					IndexKind::Clustered,
					true,
					vec![IndexFieldDef::whole("id")],
				),
				IndexDef::new(
					IndexId(id * 10 + 1),
					"idx_parent",
					IndexKind::Secondary,
					false,
					vec![IndexFieldDef::whole("parent")],
				),
			],
			foreign_keys: vec![],
		}
	}

	pub(crate) fn fk_def(id: &str, foreign: &str, referenced: &str) -> ForeignKeyDef {
		ForeignKeyDef {
			id: id.to_string(),
			foreign_table: foreign.to_string(),
			foreign_columns: vec!["parent".to_string()],
			referenced_table: referenced.to_string(),
			referenced_columns: vec!["id".to_string()],
			on_delete: ReferentialAction::Cascade,
			on_update: ReferentialAction::NoAction,
		}
	}
}
