// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use talus_core::TableId;

/// Errors surfaced by the dictionary cache to its immediate caller.
///
/// Structural invariant violations (duplicate insert, list corruption) are
/// not represented here; those are programming-contract failures and
/// assert instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
	#[error("table `{name}` not found")]
	TableNotFound {
		name: String,
	},

	#[error("table id {id} not found")]
	TableIdNotFound {
		id: TableId,
	},

	#[error("cannot rename to `{name}`: the dictionary cache already contains it")]
	AlreadyExists {
		name: String,
	},

	#[error("table `{name}` is not accessible (corrupted or data file missing)")]
	NotAccessible {
		name: String,
	},

	#[error("column name `{name}` is reserved for system columns")]
	ReservedColumnName {
		name: String,
	},

	#[error("no matching column `{column}` for index `{index}`")]
	ColumnResolution {
		index: String,
		column: String,
	},

	#[error("no index on table `{table}` matches the columns of foreign key `{constraint}`")]
	NoMatchingIndex {
		constraint: String,
		table: String,
	},

	#[error("metadata lock on `{name}` is held by another session")]
	LockContended {
		name: String,
	},

	#[error("timed out waiting for the metadata lock on `{name}`")]
	LockTimeout {
		name: String,
	},
}
