// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use serde::{Deserialize, Serialize};

/// Logical column type as the dictionary cache sees it: enough to know the
/// stored byte width (or that the value is variable-length) and the maximum
/// bytes per character, which column-prefix bookkeeping depends on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
	TinyInt,
	SmallInt,
	Int,
	BigInt,
	Float,
	Double,
	Char {
		len: u32,
		char_width: u8,
	},
	Varchar {
		max_len: u32,
		char_width: u8,
	},
	Binary {
		len: u32,
	},
	Varbinary {
		max_len: u32,
	},
	Text {
		char_width: u8,
	},
	Blob,
}

impl DataType {
	/// Stored byte width, or `None` for variable-length types.
	///
	/// A `Char` column over a multi-byte character set is stored with a
	/// variable width and is treated accordingly.
	pub fn fixed_size(&self) -> Option<u32> {
		match self {
			DataType::TinyInt => Some(1),
			DataType::SmallInt => Some(2),
			DataType::Int => Some(4),
			DataType::BigInt => Some(8),
			DataType::Float => Some(4),
			DataType::Double => Some(8),
			DataType::Char {
				len,
				char_width: 1,
			} => Some(*len),
			DataType::Binary {
				len,
			} => Some(*len),
			DataType::Char {
				..
			}
			| DataType::Varchar {
				..
			}
			| DataType::Varbinary {
				..
			}
			| DataType::Text {
				..
			}
			| DataType::Blob => None,
		}
	}

	pub fn is_variable(&self) -> bool {
		self.fixed_size().is_none()
	}

	/// Maximum bytes per character; 1 for every non-character type.
	pub fn char_width(&self) -> u8 {
		match self {
			DataType::Char {
				char_width,
				..
			}
			| DataType::Varchar {
				char_width,
				..
			}
			| DataType::Text {
				char_width,
			} => *char_width,
			_ => 1,
		}
	}
}

/// Hidden columns every clustered index carries. They are appended to a
/// table definition in this order, so their ordinals are always the last
/// three physical columns of a table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemColumn {
	RowId,
	TrxId,
	RollPtr,
}

impl SystemColumn {
	pub const COUNT: usize = 3;

	pub const ALL: [SystemColumn; SystemColumn::COUNT] =
		[SystemColumn::RowId, SystemColumn::TrxId, SystemColumn::RollPtr];

	pub fn name(&self) -> &'static str {
		match self {
			SystemColumn::RowId => "DB_ROW_ID",
			SystemColumn::TrxId => "DB_TRX_ID",
			SystemColumn::RollPtr => "DB_ROLL_PTR",
		}
	}

	pub fn data_type(&self) -> DataType {
		match self {
			SystemColumn::RowId => DataType::Binary {
				len: 6,
			},
			SystemColumn::TrxId => DataType::Binary {
				len: 6,
			},
			SystemColumn::RollPtr => DataType::Binary {
				len: 7,
			},
		}
	}

	/// Whether a user-supplied column name collides with a reserved
	/// system column name.
	pub fn is_reserved_name(name: &str) -> bool {
		SystemColumn::ALL.iter().any(|sys| sys.name().eq_ignore_ascii_case(name))
	}
}
