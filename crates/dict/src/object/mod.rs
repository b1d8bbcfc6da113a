// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

mod column;
mod foreign;
mod index;
mod table;

pub use column::{Column, ColumnRef};
pub use foreign::{ForeignHandle, ForeignKey};
pub use index::{Index, IndexField, IndexStats};
pub use table::{FtsRegistry, INTERMEDIATE_NAME_PREFIX, Table, TableHandle, base_name, db_name_len};
