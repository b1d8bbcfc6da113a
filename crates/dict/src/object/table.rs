// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use talus_core::{ForeignKeyDef, IndexDef, IndexId, SystemColumn, TableDef, TableId};

use crate::{
	Error,
	arena::Handle,
	object::{Column, ColumnRef, ForeignKey, Index},
};

pub type TableHandle = Handle<Table>;

/// Names of tables that are mid-DDL (being rebuilt by ALTER) carry this
/// prefix; such tables are not name-lockable.
pub const INTERMEDIATE_NAME_PREFIX: &str = "#sql";

/// Length of the database-name prefix of a qualified `db/table` name, or
/// 0 when the name is unqualified (engine-internal tables).
pub fn db_name_len(name: &str) -> usize {
	name.find('/').unwrap_or(0)
}

/// The table name without its database prefix.
pub fn base_name(name: &str) -> &str {
	match name.find('/') {
		Some(pos) => &name[pos + 1..],
		None => name,
	}
}

/// Registry standing in for the external full-text cache: full-text
/// indexes announce themselves here when built.
#[derive(Debug, Default)]
pub struct FtsRegistry {
	pub indexes: Vec<IndexId>,
}

/// A cached table. Owned by the directory's arena; every other structure
/// refers to it through its [`TableHandle`].
#[derive(Debug)]
pub struct Table {
	/// Cleared to 0 when the table is reduced to a placeholder that
	/// only keeps pinned freed indexes alive.
	pub id: TableId,
	pub name: String,
	pub temporary: bool,

	/// Physical columns; the last [`SystemColumn::COUNT`] are the
	/// hidden system columns, in their fixed order.
	pub cols: Vec<Column>,
	pub v_cols: Vec<Column>,

	/// Active indexes, clustered first.
	pub indexes: Vec<Arc<Index>>,
	/// Logically dropped indexes still pinned by the accelerator.
	pub freed_indexes: Vec<Arc<Index>>,

	/// Outgoing constraints (this table references another).
	pub foreign_set: Vec<Handle<ForeignKey>>,
	/// Incoming constraints (another table references this one).
	pub referenced_set: Vec<Handle<ForeignKey>>,

	pub fts: Option<FtsRegistry>,

	pub can_be_evicted: bool,
	pub corrupted: bool,
	pub file_missing: bool,
	/// An online index build on this table was aborted; its orphan
	/// indexes still need a physical drop.
	pub drop_aborted: bool,

	ref_count: u32,

	// Intrusive links of the LRU or pinned list, managed by the
	// directory.
	pub(crate) prev: Option<TableHandle>,
	pub(crate) next: Option<TableHandle>,
}

impl Table {
	/// Construct an uncached table from its definition, appending the
	/// hidden system columns. Index and foreign key definitions are
	/// handed back for the caller to install through the builder and
	/// the constraint graph.
	pub fn from_def(def: TableDef) -> crate::Result<(Table, Vec<IndexDef>, Vec<ForeignKeyDef>)> {
		let mut cols = Vec::with_capacity(def.columns.len() + SystemColumn::COUNT);
		let mut v_cols = Vec::new();
		for column in &def.columns {
			if SystemColumn::is_reserved_name(&column.name) {
				return Err(Error::ReservedColumnName {
					name: column.name.clone(),
				});
			}
			if column.is_virtual {
				v_cols.push(Column::from_def(column, v_cols.len() as u32));
			} else {
				cols.push(Column::from_def(column, cols.len() as u32));
			}
		}
		// System columns must land last and in their fixed order, so
		// that their ordinals can be derived from the column count.
		for system in SystemColumn::ALL {
			cols.push(Column::system(system, cols.len() as u32));
		}

		let table = Table {
			id: def.id,
			name: def.name,
			temporary: def.temporary,
			cols,
			v_cols,
			indexes: Vec::new(),
			freed_indexes: Vec::new(),
			foreign_set: Vec::new(),
			referenced_set: Vec::new(),
			fts: None,
			can_be_evicted: true,
			corrupted: false,
			file_missing: false,
			drop_aborted: false,
			ref_count: 0,
			prev: None,
			next: None,
		};
		Ok((table, def.indexes, def.foreign_keys))
	}

	pub fn n_user_cols(&self) -> usize {
		self.cols.len() - SystemColumn::COUNT
	}

	pub fn sys_col_ref(&self, which: SystemColumn) -> ColumnRef {
		let offset = SystemColumn::ALL.iter().position(|s| *s == which).unwrap();
		ColumnRef::physical((self.n_user_cols() + offset) as u32)
	}

	pub fn col(&self, column: ColumnRef) -> &Column {
		if column.is_virtual {
			&self.v_cols[column.ordinal as usize]
		} else {
			&self.cols[column.ordinal as usize]
		}
	}

	pub(crate) fn col_mut(&mut self, column: ColumnRef) -> &mut Column {
		if column.is_virtual {
			&mut self.v_cols[column.ordinal as usize]
		} else {
			&mut self.cols[column.ordinal as usize]
		}
	}

	/// Resolve a column name. Physical columns match case-insensitively,
	/// virtual columns exactly.
	pub fn lookup_column(&self, name: &str) -> Option<ColumnRef> {
		if let Some(column) = self.cols.iter().find(|c| c.name.eq_ignore_ascii_case(name)) {
			return Some(ColumnRef::physical(column.ordinal));
		}
		self.v_cols.iter().find(|c| c.name == name).map(|c| ColumnRef::virtual_(c.ordinal))
	}

	pub fn clustered_index(&self) -> Option<&Arc<Index>> {
		let first = self.indexes.first()?;
		first.is_clustered().then_some(first)
	}

	pub fn index_by_id(&self, id: IndexId) -> Option<&Arc<Index>> {
		self.indexes.iter().find(|index| index.id == id)
	}

	pub fn index_position(&self, id: IndexId) -> Option<usize> {
		self.indexes.iter().position(|index| index.id == id)
	}

	pub fn is_readable(&self) -> bool {
		!self.corrupted && !self.file_missing
	}

	pub fn is_intermediate(&self) -> bool {
		base_name(&self.name).starts_with(INTERMEDIATE_NAME_PREFIX)
			|| self.name.starts_with(INTERMEDIATE_NAME_PREFIX)
	}

	pub fn ref_count(&self) -> u32 {
		self.ref_count
	}

	pub(crate) fn acquire(&mut self) {
		self.ref_count += 1;
	}

	/// Returns whether this was the last outstanding reference.
	pub(crate) fn release(&mut self) -> bool {
		assert!(self.ref_count > 0, "release of unreferenced table `{}`", self.name);
		self.ref_count -= 1;
		self.ref_count == 0
	}

	/// Whether any active or freed index still has accelerator pins.
	pub fn has_pinned_indexes(&self) -> bool {
		self.indexes.iter().chain(self.freed_indexes.iter()).any(|index| index.pin_count() > 0)
	}

	/// Reduce to the placeholder kept alive while freed indexes drain.
	pub(crate) fn clear_to_placeholder(&mut self) {
		self.id = TableId(0);
		self.cols.clear();
		self.v_cols.clear();
		self.fts = None;
	}
}

#[cfg(test)]
mod tests {
	use talus_core::{ColumnDef, DataType};

	use super::*;

	fn create_test_def() -> TableDef {
		TableDef {
			id: TableId(1),
			name: "db/t".to_string(),
			temporary: false,
			columns: vec![
				ColumnDef::new("a", DataType::Int, false),
				ColumnDef::virtual_("g", DataType::Int, true),
			],
			indexes: vec![],
			foreign_keys: vec![],
		}
	}

	#[test]
	fn test_system_columns_are_appended_in_order() {
		let (table, _, _) = Table::from_def(create_test_def()).unwrap();
		assert_eq!(table.n_user_cols(), 1);
		assert_eq!(table.cols.len(), 4);
		assert_eq!(table.cols[1].name, "DB_ROW_ID");
		assert_eq!(table.cols[2].name, "DB_TRX_ID");
		assert_eq!(table.cols[3].name, "DB_ROLL_PTR");
		assert_eq!(table.sys_col_ref(SystemColumn::TrxId), ColumnRef::physical(2));
	}

	#[test]
	fn test_reserved_column_name_is_rejected() {
		let mut def = create_test_def();
		def.columns.push(ColumnDef::new("db_trx_id", DataType::Int, false));
		let err = Table::from_def(def).unwrap_err();
		assert!(matches!(err, Error::ReservedColumnName { .. }));
	}

	#[test]
	fn test_lookup_column() {
		let (table, _, _) = Table::from_def(create_test_def()).unwrap();
		assert_eq!(table.lookup_column("A"), Some(ColumnRef::physical(0)));
		assert_eq!(table.lookup_column("g"), Some(ColumnRef::virtual_(0)));
		// Virtual columns match exactly, not case-insensitively.
		assert_eq!(table.lookup_column("G"), None);
	}

	#[test]
	fn test_name_helpers() {
		assert_eq!(db_name_len("db/t"), 2);
		assert_eq!(db_name_len("SYS_TABLES"), 0);
		assert_eq!(base_name("db/t"), "t");
	}
}
