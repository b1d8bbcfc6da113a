// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use talus_core::{ColumnDef, DataType, SystemColumn};

/// A column of a cached table. Identity is (owning table, ordinal,
/// virtual-or-not); columns never move once assigned.
#[derive(Debug, Clone)]
pub struct Column {
	pub name: String,
	/// Position among the table's physical columns, or among its virtual
	/// columns for a virtual column.
	pub ordinal: u32,
	pub data_type: DataType,
	pub nullable: bool,
	pub system: Option<SystemColumn>,
	pub is_virtual: bool,

	/// Whether the column appears in the ordering fields of any index.
	/// Mutated only under the cache mutex, while indexes are added.
	pub ord_part: bool,
	/// Longest prefix under which the column is indexed across all
	/// indexes of the table; 0 once some index needs the whole column.
	pub max_prefix: u32,
}

impl Column {
	pub fn from_def(def: &ColumnDef, ordinal: u32) -> Self {
		Self {
			name: def.name.clone(),
			ordinal,
			data_type: def.data_type,
			nullable: def.nullable,
			system: None,
			is_virtual: def.is_virtual,
			ord_part: false,
			max_prefix: 0,
		}
	}

	pub fn system(which: SystemColumn, ordinal: u32) -> Self {
		Self {
			name: which.name().to_string(),
			ordinal,
			data_type: which.data_type(),
			nullable: false,
			system: Some(which),
			is_virtual: false,
			ord_part: false,
			max_prefix: 0,
		}
	}

	pub fn fixed_size(&self) -> Option<u32> {
		self.data_type.fixed_size()
	}
}

/// Reference to a column by its identity within one table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
	pub ordinal: u32,
	pub is_virtual: bool,
}

impl ColumnRef {
	pub fn physical(ordinal: u32) -> Self {
		Self {
			ordinal,
			is_virtual: false,
		}
	}

	pub fn virtual_(ordinal: u32) -> Self {
		Self {
			ordinal,
			is_virtual: true,
		}
	}
}
