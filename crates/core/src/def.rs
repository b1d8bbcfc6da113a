// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Plain definition structs. These are what the persistent loader hands to
//! the dictionary cache and what DDL execution submits when creating
//! objects; the cache builds its internal representation from them.

use serde::{Deserialize, Serialize};

use crate::{DataType, IndexId, TableId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
	pub name: String,
	pub data_type: DataType,
	pub nullable: bool,
	/// Computed column, not physically stored.
	pub is_virtual: bool,
}

impl ColumnDef {
	pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
		Self {
			name: name.into(),
			data_type,
			nullable,
			is_virtual: false,
		}
	}

	pub fn virtual_(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
		Self {
			name: name.into(),
			data_type,
			nullable,
			is_virtual: true,
		}
	}
}

/// One user-declared index field: a column name plus an optional prefix
/// length in bytes. Zero means the whole column is indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFieldDef {
	pub column: String,
	pub prefix_len: u32,
}

impl IndexFieldDef {
	pub fn whole(column: impl Into<String>) -> Self {
		Self {
			column: column.into(),
			prefix_len: 0,
		}
	}

	pub fn prefix(column: impl Into<String>, prefix_len: u32) -> Self {
		Self {
			column: column.into(),
			prefix_len,
		}
	}
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
	/// Leaf level stores complete rows; exactly one per table, always
	/// first in the table's index sequence.
	Clustered,
	Secondary,
	/// Full-text index: no key augmentation, registered with the
	/// table's full-text registry instead.
	FullText,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
	pub id: IndexId,
	pub name: String,
	pub kind: IndexKind,
	pub unique: bool,
	pub fields: Vec<IndexFieldDef>,
	/// An index mid-construction (online build) is added uncommitted and
	/// stays invisible to general queries until committed.
	pub committed: bool,
}

impl IndexDef {
	pub fn new(id: IndexId, name: impl Into<String>, kind: IndexKind, unique: bool, fields: Vec<IndexFieldDef>) -> Self {
		Self {
			id,
			name: name.into(),
			kind,
			unique,
			fields,
			committed: true,
		}
	}
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
	NoAction,
	Cascade,
	SetNull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
	/// Constraint identifier. Generated identifiers follow the
	/// `<qualified table name>_fk_<n>` convention; user-chosen ones are
	/// arbitrary.
	pub id: String,
	pub foreign_table: String,
	pub foreign_columns: Vec<String>,
	pub referenced_table: String,
	pub referenced_columns: Vec<String>,
	pub on_delete: ReferentialAction,
	pub on_update: ReferentialAction,
}

/// A fully formed table definition, ready to be inserted into the
/// dictionary cache. The loader returns these; DDL builds them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
	pub id: TableId,
	/// Qualified `database/table` name, globally unique among cached
	/// tables.
	pub name: String,
	pub temporary: bool,
	pub columns: Vec<ColumnDef>,
	pub indexes: Vec<IndexDef>,
	pub foreign_keys: Vec<ForeignKeyDef>,
}
