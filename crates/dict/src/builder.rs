// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Converts a user-declared index definition into its internal
//! representation, appending the hidden system fields and the clustered
//! key completion that secondary indexes need to locate their rows.

use std::sync::Arc;

use talus_core::{ColumnDef, IndexDef, IndexKind, SystemColumn};
use tracing::debug;

use crate::{
	Error,
	object::{Column, ColumnRef, FtsRegistry, Index, IndexField, Table},
};

/// Resolve the declared field names, build the internal representation
/// and link the index into the table (last position; a clustered index is
/// necessarily the first). `add_v` supplies virtual columns added
/// concurrently by the same DDL statement, not yet part of the table.
///
/// On failure nothing about the table changes.
pub(crate) fn install_index(table: &mut Table, def: IndexDef, add_v: &[ColumnDef]) -> crate::Result<Arc<Index>> {
	match def.kind {
		IndexKind::Clustered => {
			assert!(table.indexes.is_empty(), "clustered index must be installed before any other index");
		}
		IndexKind::Secondary | IndexKind::FullText => {
			assert!(
				table.clustered_index().is_some(),
				"secondary index requires the clustered index to exist"
			);
		}
	}

	// Concurrently added virtual columns become visible to resolution
	// by appending them; rolled back if resolution fails.
	let v_cols_before = table.v_cols.len();
	for column in add_v {
		debug_assert!(column.is_virtual);
		table.v_cols.push(Column::from_def(column, table.v_cols.len() as u32));
	}

	let user_fields = match resolve_fields(table, &def) {
		Ok(fields) => fields,
		Err(err) => {
			table.v_cols.truncate(v_cols_before);
			return Err(err);
		}
	};

	let index = match def.kind {
		IndexKind::Clustered => build_internal_clustered(table, &def, user_fields),
		IndexKind::Secondary => build_internal_secondary(table, &def, user_fields),
		IndexKind::FullText => build_internal_fts(table, &def, user_fields),
	};
	index.set_committed(def.committed);

	// Flag ordering columns and maintain each column's longest indexed
	// prefix; 0 is sticky once some index needs the whole column.
	for field_pos in 0..index.n_uniq as usize {
		let prefix_len = index.fields[field_pos].prefix_len;
		let column = table.col_mut(index.fields[field_pos].column);
		if !column.ord_part {
			column.ord_part = true;
			column.max_prefix = prefix_len;
		} else if prefix_len == 0 {
			column.max_prefix = 0;
		} else if column.max_prefix != 0 && prefix_len > column.max_prefix {
			column.max_prefix = prefix_len;
		}
	}

	let index = Arc::new(index);
	if index.kind == IndexKind::FullText {
		table.fts.get_or_insert_with(FtsRegistry::default).indexes.push(index.id);
	}
	table.indexes.push(Arc::clone(&index));
	Ok(index)
}

/// Map every declared field name to a column of the table. A name that
/// resolves nowhere, or a column named twice, fails the whole index.
fn resolve_fields(table: &Table, def: &IndexDef) -> crate::Result<Vec<IndexField>> {
	let mut fields = Vec::with_capacity(def.fields.len());
	let mut seen: Vec<ColumnRef> = Vec::with_capacity(def.fields.len());

	for field in &def.fields {
		let column = table.lookup_column(&field.column).ok_or_else(|| Error::ColumnResolution {
			index: def.name.clone(),
			column: field.column.clone(),
		})?;
		if seen.contains(&column) {
			debug!(index = %def.name, column = %field.column, "duplicate column in index definition");
			return Err(Error::ColumnResolution {
				index: def.name.clone(),
				column: field.column.clone(),
			});
		}
		seen.push(column);
		fields.push(IndexField {
			column,
			name: table.col(column).name.clone(),
			prefix_len: field.prefix_len,
		});
	}
	Ok(fields)
}

fn system_field(table: &Table, which: SystemColumn) -> IndexField {
	IndexField {
		column: table.sys_col_ref(which),
		name: which.name().to_string(),
		prefix_len: 0,
	}
}

/// Clustered case: user fields, a hidden row-id when the declared key is
/// not unique, then transaction-id and rollback-pointer, then every
/// remaining user column (whole-column, in table order). The unique key
/// prefix ends right after the row-id (or after the user fields when
/// they are unique by themselves).
fn build_internal_clustered(table: &Table, def: &IndexDef, user_fields: Vec<IndexField>) -> Index {
	let n_user = user_fields.len() as u32;
	let mut fields = user_fields;

	let n_uniq = if def.unique {
		n_user
	} else {
		fields.push(system_field(table, SystemColumn::RowId));
		n_user + 1
	};
	fields.push(system_field(table, SystemColumn::TrxId));
	fields.push(system_field(table, SystemColumn::RollPtr));

	// A prefix-only appearance does not count as containment; such
	// columns are appended again in full.
	let mut contained = vec![false; table.cols.len()];
	for field in &fields {
		if !field.column.is_virtual && field.prefix_len == 0 {
			contained[field.column.ordinal as usize] = true;
		}
	}
	for ordinal in 0..table.n_user_cols() {
		if !contained[ordinal] {
			fields.push(IndexField {
				column: ColumnRef::physical(ordinal as u32),
				name: table.cols[ordinal].name.clone(),
				prefix_len: 0,
			});
		}
	}

	Index::new(def.id, def.name.clone(), table.id, def.kind, def.unique, fields, n_user, n_uniq)
}

/// Secondary case: user fields, then whichever clustered unique-key
/// fields are not already present as whole columns, so every entry can
/// locate its row through the clustered key.
fn build_internal_secondary(table: &Table, def: &IndexDef, user_fields: Vec<IndexField>) -> Index {
	let clustered = table.clustered_index().expect("clustered index must be first");
	let n_user = user_fields.len() as u32;
	let mut fields = user_fields;

	let mut contained = vec![false; table.cols.len()];
	for field in &fields {
		if !field.column.is_virtual && field.prefix_len == 0 {
			contained[field.column.ordinal as usize] = true;
		}
	}
	for key_field in clustered.unique_key_prefix() {
		if !contained[key_field.column.ordinal as usize] {
			fields.push(key_field.clone());
		}
	}

	let n_uniq = if def.unique { n_user } else { fields.len() as u32 };

	Index::new(def.id, def.name.clone(), table.id, def.kind, def.unique, fields, n_user, n_uniq)
}

/// Full-text case: no key augmentation at all, empty unique prefix.
fn build_internal_fts(table: &Table, def: &IndexDef, user_fields: Vec<IndexField>) -> Index {
	let n_user = user_fields.len() as u32;
	Index::new(def.id, def.name.clone(), table.id, def.kind, def.unique, user_fields, n_user, 0)
}

#[cfg(test)]
mod tests {
	use talus_core::{DataType, IndexFieldDef, IndexId, TableDef, TableId};

	use super::*;

	fn create_test_table(unique_key: bool) -> Table {
		let def = TableDef {
			id: TableId(1),
			name: "db/t".to_string(),
			temporary: false,
			columns: vec![
				ColumnDef::new("a", DataType::Int, false),
				ColumnDef::new("b", DataType::Int, true),
				ColumnDef::new(
					"c",
					DataType::Varchar {
						max_len: 255,
						char_width: 1,
					},
					true,
				),
			],
			indexes: vec![],
			foreign_keys: vec![],
		};
		let (mut table, _, _) = Table::from_def(def).unwrap();
		let clustered = IndexDef::new(
			IndexId(1),
			"PRIMARY",
			IndexKind::Clustered,
			unique_key,
			vec![IndexFieldDef::whole("a")],
		);
		install_index(&mut table, clustered, &[]).unwrap();
		table
	}

	#[test]
	fn test_clustered_unique_key_skips_row_id() {
		let table = create_test_table(true);
		let clustered = table.clustered_index().unwrap();
		assert_eq!(clustered.n_uniq, 1);
		let names: Vec<_> = clustered.fields.iter().map(|f| f.name.as_str()).collect();
		assert_eq!(names, ["a", "DB_TRX_ID", "DB_ROLL_PTR", "b", "c"]);
	}

	#[test]
	fn test_clustered_non_unique_key_gets_row_id() {
		let table = create_test_table(false);
		let clustered = table.clustered_index().unwrap();
		assert_eq!(clustered.n_uniq, 2);
		let names: Vec<_> = clustered.fields.iter().map(|f| f.name.as_str()).collect();
		assert_eq!(names, ["a", "DB_ROW_ID", "DB_TRX_ID", "DB_ROLL_PTR", "b", "c"]);
	}

	#[test]
	fn test_secondary_appends_missing_clustered_key_fields() {
		let mut table = create_test_table(false);
		let secondary = IndexDef::new(
			IndexId(2),
			"idx_b",
			IndexKind::Secondary,
			false,
			vec![IndexFieldDef::whole("b")],
		);
		let index = install_index(&mut table, secondary, &[]).unwrap();
		let names: Vec<_> = index.fields.iter().map(|f| f.name.as_str()).collect();
		// Clustered unique prefix is {a, DB_ROW_ID}; both are missing.
		assert_eq!(names, ["b", "a", "DB_ROW_ID"]);
		assert_eq!(index.n_uniq, 3);
		assert_eq!(index.n_user_fields, 1);
	}

	#[test]
	fn test_unique_secondary_key_prefix_is_user_fields_only() {
		let mut table = create_test_table(true);
		let secondary = IndexDef::new(
			IndexId(2),
			"uniq_b",
			IndexKind::Secondary,
			true,
			vec![IndexFieldDef::whole("b")],
		);
		let index = install_index(&mut table, secondary, &[]).unwrap();
		assert_eq!(index.n_uniq, 1);
		let names: Vec<_> = index.fields.iter().map(|f| f.name.as_str()).collect();
		assert_eq!(names, ["b", "a"]);
	}

	#[test]
	fn test_prefix_field_does_not_count_as_containment() {
		let mut table = create_test_table(true);
		let secondary = IndexDef::new(
			IndexId(2),
			"idx_c",
			IndexKind::Secondary,
			false,
			vec![IndexFieldDef::prefix("c", 10), IndexFieldDef::prefix("a", 2)],
		);
		let index = install_index(&mut table, secondary, &[]).unwrap();
		let names: Vec<_> = index.fields.iter().map(|f| f.name.as_str()).collect();
		// `a` appears only as a prefix, so the whole column is added.
		assert_eq!(names, ["c", "a", "a"]);
		assert_eq!(index.fields[2].prefix_len, 0);
	}

	#[test]
	fn test_max_prefix_bookkeeping() {
		let mut table = create_test_table(true);
		let idx1 = IndexDef::new(
			IndexId(2),
			"idx_c10",
			IndexKind::Secondary,
			true,
			vec![IndexFieldDef::prefix("c", 10)],
		);
		install_index(&mut table, idx1, &[]).unwrap();
		let c = table.lookup_column("c").unwrap();
		assert_eq!(table.col(c).max_prefix, 10);
		assert!(table.col(c).ord_part);

		let idx2 = IndexDef::new(
			IndexId(3),
			"idx_c20",
			IndexKind::Secondary,
			true,
			vec![IndexFieldDef::prefix("c", 20)],
		);
		install_index(&mut table, idx2, &[]).unwrap();
		assert_eq!(table.col(c).max_prefix, 20);

		// A whole-column reference subsumes all prefixes for good.
		let idx3 = IndexDef::new(IndexId(4), "idx_c", IndexKind::Secondary, true, vec![IndexFieldDef::whole("c")]);
		install_index(&mut table, idx3, &[]).unwrap();
		assert_eq!(table.col(c).max_prefix, 0);

		let idx4 = IndexDef::new(
			IndexId(5),
			"idx_c30",
			IndexKind::Secondary,
			true,
			vec![IndexFieldDef::prefix("c", 30)],
		);
		install_index(&mut table, idx4, &[]).unwrap();
		assert_eq!(table.col(c).max_prefix, 0);
	}

	#[test]
	fn test_unresolved_column_leaves_table_unchanged() {
		let mut table = create_test_table(true);
		let n_indexes = table.indexes.len();
		let bad = IndexDef::new(
			IndexId(2),
			"idx_missing",
			IndexKind::Secondary,
			false,
			vec![IndexFieldDef::whole("nope")],
		);
		let err = install_index(&mut table, bad, &[]).unwrap_err();
		assert!(matches!(err, Error::ColumnResolution { .. }));
		assert_eq!(table.indexes.len(), n_indexes);
	}

	#[test]
	fn test_duplicate_column_fails_resolution() {
		let mut table = create_test_table(true);
		let bad = IndexDef::new(
			IndexId(2),
			"idx_dup",
			IndexKind::Secondary,
			false,
			vec![IndexFieldDef::whole("b"), IndexFieldDef::whole("B")],
		);
		assert!(matches!(install_index(&mut table, bad, &[]), Err(Error::ColumnResolution { .. })));
	}

	#[test]
	fn test_concurrently_added_virtual_column_resolves() {
		let mut table = create_test_table(true);
		let add_v = vec![ColumnDef::virtual_("v1", DataType::Int, true)];
		let def = IndexDef::new(
			IndexId(2),
			"idx_v",
			IndexKind::Secondary,
			false,
			vec![IndexFieldDef::whole("v1")],
		);
		let index = install_index(&mut table, def, &add_v).unwrap();
		assert!(index.fields[0].column.is_virtual);
		assert_eq!(table.v_cols.len(), 1);
	}

	#[test]
	fn test_fts_index_has_empty_unique_prefix_and_registers() {
		let mut table = create_test_table(true);
		let def = IndexDef::new(IndexId(7), "ft_c", IndexKind::FullText, false, vec![IndexFieldDef::whole("c")]);
		let index = install_index(&mut table, def, &[]).unwrap();
		assert_eq!(index.n_uniq, 0);
		assert_eq!(index.fields.len(), 1);
		assert_eq!(table.fts.as_ref().unwrap().indexes, vec![IndexId(7)]);
	}
}
