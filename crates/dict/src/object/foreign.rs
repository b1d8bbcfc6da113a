// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use talus_core::{ForeignKeyDef, IndexId, ReferentialAction};

use crate::{arena::Handle, object::Table};

pub type ForeignHandle = Handle<ForeignKey>;

/// A foreign key constraint as cached. Either side may be unresolved
/// while its table is not cached (half-resolved state); the resolved
/// table references are arena handles rather than pointers, so a side
/// whose table has been freed degrades into a lookup miss instead of a
/// dangling reference.
#[derive(Debug)]
pub struct ForeignKey {
	pub id: String,
	pub foreign_table_name: String,
	pub foreign_columns: Vec<String>,
	pub referenced_table_name: String,
	pub referenced_columns: Vec<String>,
	pub on_delete: ReferentialAction,
	pub on_update: ReferentialAction,

	pub foreign_table: Option<Handle<Table>>,
	pub foreign_index: Option<IndexId>,
	pub referenced_table: Option<Handle<Table>>,
	pub referenced_index: Option<IndexId>,
}

impl ForeignKey {
	pub fn from_def(def: ForeignKeyDef) -> Self {
		Self {
			id: def.id,
			foreign_table_name: def.foreign_table,
			foreign_columns: def.foreign_columns,
			referenced_table_name: def.referenced_table,
			referenced_columns: def.referenced_columns,
			on_delete: def.on_delete,
			on_update: def.on_update,
			foreign_table: None,
			foreign_index: None,
			referenced_table: None,
			referenced_index: None,
		}
	}

	pub fn n_fields(&self) -> usize {
		self.foreign_columns.len()
	}

	/// Whether any referential action nulls out referencing columns,
	/// which forbids matching them to NOT NULL-incompatible indexes.
	pub fn has_set_null_action(&self) -> bool {
		self.on_delete == ReferentialAction::SetNull || self.on_update == ReferentialAction::SetNull
	}
}
