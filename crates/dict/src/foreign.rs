// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The foreign key constraint graph.
//!
//! Constraints resolve each side independently against whatever tables are
//! cached; a side whose table is absent stays unresolved until that table
//! arrives (`reconcile_for_table`). A table participating in a resolved
//! constraint, on either side, is pinned against eviction.

use talus_core::{DataType, ForeignKeyDef, IndexId, IndexKind};
use tracing::{debug, warn};

use crate::{
	Error,
	directory::DirectoryInner,
	object::{ForeignHandle, ForeignKey, Table, TableHandle, base_name, db_name_len},
};

/// Suffix of generated constraint identifiers, between the qualified table
/// name and the running number.
pub const GENERATED_FK_SUFFIX: &str = "_fk_";

#[derive(Debug, Copy, Clone)]
pub(crate) struct ForeignAddOptions {
	/// Require matching column types between the two sides' indexes.
	pub(crate) check_types: bool,
	/// Link a side with no qualifying index instead of failing; the load
	/// path uses this so one broken constraint cannot hide a table.
	pub(crate) ignore_missing_index: bool,
}

/// First index of `table`, in creation order, whose leading fields are
/// exactly `columns` as whole columns. Committed, not to-be-dropped,
/// non-full-text indexes only; column names compare case-insensitively.
pub(crate) fn find_qualifying_index(
	table: &Table,
	columns: &[String],
	types: Option<&[DataType]>,
	require_nullable: bool,
) -> Option<IndexId> {
	'indexes: for index in &table.indexes {
		if index.fields.len() < columns.len()
			|| index.kind == IndexKind::FullText
			|| index.to_be_dropped()
			|| !index.is_committed()
		{
			continue;
		}
		for (position, column_name) in columns.iter().enumerate() {
			let field = &index.fields[position];
			if field.prefix_len != 0
				|| field.column.is_virtual
				|| !field.name.eq_ignore_ascii_case(column_name)
			{
				continue 'indexes;
			}
			let column = table.col(field.column);
			// SET NULL actions will write NULL into these columns.
			if require_nullable && !column.nullable {
				continue 'indexes;
			}
			if let Some(types) = types {
				if types[position] != column.data_type {
					continue 'indexes;
				}
			}
		}
		return Some(index.id);
	}
	None
}

fn find_in_table(inner: &DirectoryInner, handle: TableHandle, constraint: &str) -> Option<ForeignHandle> {
	let table = inner.table(handle);
	table
		.foreign_set
		.iter()
		.chain(table.referenced_set.iter())
		.copied()
		.find(|&fk| inner.foreigns.get(fk).is_some_and(|fk| fk.id == constraint))
}

/// Key column types of the already resolved opposite side, used to check
/// type compatibility when resolving a side.
fn side_types(
	inner: &DirectoryInner,
	table: Option<TableHandle>,
	index: Option<IndexId>,
	n_fields: usize,
) -> Option<Vec<DataType>> {
	let table = inner.tables.get(table?)?;
	let index = table.index_by_id(index?)?;
	Some(index.fields.iter().take(n_fields).map(|field| table.col(field.column).data_type).collect())
}

/// Add a constraint to the graph, resolving whichever sides are cached.
/// At least one side must be; otherwise nothing could own the constraint.
///
/// When a side cannot be matched to an index and the options do not allow
/// ignoring that, everything this call changed is rolled back.
pub(crate) fn add_foreign_locked(
	inner: &mut DirectoryInner,
	def: ForeignKeyDef,
	options: ForeignAddOptions,
) -> crate::Result<ForeignHandle> {
	let foreign_handle = inner.lookup_by_name(&def.foreign_table);
	let referenced_handle = inner.lookup_by_name(&def.referenced_table);
	assert!(
		foreign_handle.is_some() || referenced_handle.is_some(),
		"neither side of constraint `{}` is cached",
		def.id
	);

	let mut existing = foreign_handle.and_then(|h| find_in_table(inner, h, &def.id));
	if existing.is_none() {
		existing = referenced_handle.and_then(|h| find_in_table(inner, h, &def.id));
	}
	if let Some(fk) = existing {
		// A copy left behind under the same id but owned elsewhere (the
		// foreign table was renamed over) is dropped, not reused.
		let stale = foreign_handle.is_some()
			&& inner.foreigns.get(fk).is_some_and(|fk| fk.foreign_table.is_some() && fk.foreign_table != foreign_handle);
		if stale {
			remove_foreign_locked(inner, fk);
			existing = None;
		}
	}

	let constraint = def.id.clone();
	let (fk_handle, newly_created) = match existing {
		Some(fk) => {
			debug!(constraint = %constraint, "constraint already cached");
			(fk, false)
		}
		None => (inner.foreigns.insert(ForeignKey::from_def(def)), true),
	};

	let mut linked_referenced = false;
	if let Some(handle) = referenced_handle {
		let fk = inner.foreigns.get(fk_handle).expect("constraint just located");
		if fk.referenced_table.is_none() {
			let types = if options.check_types {
				side_types(inner, fk.foreign_table, fk.foreign_index, fk.n_fields())
			} else {
				None
			};
			let fk = inner.foreigns.get(fk_handle).expect("constraint just located");
			let columns = fk.referenced_columns.clone();
			let index = find_qualifying_index(inner.table(handle), &columns, types.as_deref(), false);
			if index.is_none() && !options.ignore_missing_index {
				if newly_created {
					inner.foreigns.remove(fk_handle);
				}
				return Err(Error::NoMatchingIndex {
					constraint,
					table: inner.table(handle).name.clone(),
				});
			}
			let fk = inner.foreigns.get_mut(fk_handle).expect("constraint just located");
			fk.referenced_table = Some(handle);
			fk.referenced_index = index;
			inner.table_mut(handle).referenced_set.push(fk_handle);
			inner.prevent_eviction(handle);
			linked_referenced = true;
		}
	}

	if let Some(handle) = foreign_handle {
		let fk = inner.foreigns.get(fk_handle).expect("constraint just located");
		if fk.foreign_table.is_none() {
			let require_nullable = fk.has_set_null_action();
			let types = if options.check_types {
				side_types(inner, fk.referenced_table, fk.referenced_index, fk.n_fields())
			} else {
				None
			};
			let fk = inner.foreigns.get(fk_handle).expect("constraint just located");
			let columns = fk.foreign_columns.clone();
			let index = find_qualifying_index(inner.table(handle), &columns, types.as_deref(), require_nullable);
			if index.is_none() && !options.ignore_missing_index {
				if linked_referenced {
					let referenced = inner.foreigns.get(fk_handle).expect("constraint just located").referenced_table;
					if let Some(referenced) = referenced {
						inner.table_mut(referenced).referenced_set.retain(|&fk| fk != fk_handle);
					}
					let fk = inner.foreigns.get_mut(fk_handle).expect("constraint just located");
					fk.referenced_table = None;
					fk.referenced_index = None;
				}
				if newly_created {
					inner.foreigns.remove(fk_handle);
				}
				return Err(Error::NoMatchingIndex {
					constraint,
					table: inner.table(handle).name.clone(),
				});
			}
			let fk = inner.foreigns.get_mut(fk_handle).expect("constraint just located");
			fk.foreign_table = Some(handle);
			fk.foreign_index = index;
			inner.table_mut(handle).foreign_set.push(fk_handle);
			inner.prevent_eviction(handle);
		}
	}

	Ok(fk_handle)
}

/// Unlink a constraint from both sides and free it.
pub(crate) fn remove_foreign_locked(inner: &mut DirectoryInner, fk_handle: ForeignHandle) {
	let Some(fk) = inner.foreigns.get(fk_handle) else {
		return;
	};
	let foreign = fk.foreign_table;
	let referenced = fk.referenced_table;
	if let Some(handle) = foreign {
		if let Some(table) = inner.tables.get_mut(handle) {
			table.foreign_set.retain(|&fk| fk != fk_handle);
		}
	}
	if let Some(handle) = referenced {
		if let Some(table) = inner.tables.get_mut(handle) {
			table.referenced_set.retain(|&fk| fk != fk_handle);
		}
	}
	inner.foreigns.remove(fk_handle);
}

/// Resolve half-resolved constraints that name a table which just entered
/// the cache. A foreign side that still cannot be matched to an index
/// stays unresolved; data operations on the constraint will refuse it.
pub(crate) fn reconcile_for_table(inner: &mut DirectoryInner, handle: TableHandle) {
	let name = inner.table(handle).name.clone();
	let constraints: Vec<ForeignHandle> = inner.foreigns.iter().map(|(fk, _)| fk).collect();

	for fk_handle in constraints {
		let Some(fk) = inner.foreigns.get(fk_handle) else {
			continue;
		};
		let needs_referenced = fk.referenced_table.is_none() && fk.referenced_table_name == name;
		let needs_foreign = fk.foreign_table.is_none() && fk.foreign_table_name == name;

		if needs_referenced {
			let fk = inner.foreigns.get(fk_handle).expect("constraint just located");
			let columns = fk.referenced_columns.clone();
			let index = find_qualifying_index(inner.table(handle), &columns, None, false);
			if index.is_none() {
				warn!(constraint = %fk.id, table = %name, "no index matches the referenced columns");
			}
			let fk = inner.foreigns.get_mut(fk_handle).expect("constraint just located");
			fk.referenced_table = Some(handle);
			fk.referenced_index = index;
			inner.table_mut(handle).referenced_set.push(fk_handle);
			inner.prevent_eviction(handle);
		}

		if needs_foreign {
			let fk = inner.foreigns.get(fk_handle).expect("constraint just located");
			let require_nullable = fk.has_set_null_action();
			let columns = fk.foreign_columns.clone();
			match find_qualifying_index(inner.table(handle), &columns, None, require_nullable) {
				Some(index) => {
					let fk = inner.foreigns.get_mut(fk_handle).expect("constraint just located");
					fk.foreign_table = Some(handle);
					fk.foreign_index = Some(index);
					inner.table_mut(handle).foreign_set.push(fk_handle);
					inner.prevent_eviction(handle);
				}
				None => {
					let fk = inner.foreigns.get(fk_handle).expect("constraint just located");
					warn!(constraint = %fk.id, table = %name, "no index matches the foreign columns");
				}
			}
		}
	}
}

/// Detach the table from the constraint graph: outgoing constraints are
/// freed, incoming ones fall back to the half-resolved state.
pub(crate) fn detach_all(inner: &mut DirectoryInner, handle: TableHandle) {
	let outgoing = std::mem::take(&mut inner.table_mut(handle).foreign_set);
	for fk_handle in outgoing {
		let referenced = inner.foreigns.get(fk_handle).and_then(|fk| fk.referenced_table);
		if let Some(referenced) = referenced {
			if referenced != handle {
				if let Some(table) = inner.tables.get_mut(referenced) {
					table.referenced_set.retain(|&fk| fk != fk_handle);
				}
			}
		}
		inner.foreigns.remove(fk_handle);
	}

	let incoming = std::mem::take(&mut inner.table_mut(handle).referenced_set);
	for fk_handle in incoming {
		if let Some(fk) = inner.foreigns.get_mut(fk_handle) {
			fk.referenced_table = None;
			fk.referenced_index = None;
		}
	}
}

/// Propagate a completed rename of `handle` (its name already updated in
/// the table and the maps) into the constraints of both sides.
///
/// Generated constraint identifiers embed the qualified table name and are
/// rebased onto the new name; other qualified identifiers only have their
/// database prefix moved along.
pub(crate) fn rename_propagate(inner: &mut DirectoryInner, handle: TableHandle, old_name: &str) {
	let new_name = inner.table(handle).name.clone();

	let outgoing = inner.table(handle).foreign_set.clone();
	for fk_handle in outgoing {
		let fk = inner.foreigns.get_mut(fk_handle).expect("constraint in foreign set");
		fk.foreign_table_name = new_name.clone();
		if !fk.id.contains('/') {
			continue;
		}
		let generated = fk
			.id
			.get(..old_name.len())
			.is_some_and(|prefix| prefix.eq_ignore_ascii_case(old_name))
			&& fk.id[old_name.len()..].starts_with(GENERATED_FK_SUFFIX);
		if generated {
			fk.id = format!("{new_name}{}", &fk.id[old_name.len()..]);
		} else {
			let database = &new_name[..db_name_len(&new_name)];
			fk.id = format!("{database}/{}", base_name(&fk.id));
		}
	}

	let incoming = inner.table(handle).referenced_set.clone();
	for fk_handle in incoming {
		inner.foreigns.get_mut(fk_handle).expect("constraint in referenced set").referenced_table_name = new_name.clone();
	}
}
