// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Shared vocabulary of the Talus storage engine: identifier newtypes,
//! logical column types, the plain definition structs exchanged with the
//! persistent loader, and the trait seams behind which the dictionary
//! cache's collaborators live.

pub mod def;
pub mod id;
pub mod interface;
pub mod types;

pub use def::{ColumnDef, ForeignKeyDef, IndexDef, IndexFieldDef, IndexKind, ReferentialAction, TableDef};
pub use id::{IndexId, TableId};
pub use interface::{DropExecutor, LockWaitTimeout, NameLockManager, RowLockInspector, TableLoader};
pub use types::{DataType, SystemColumn};
