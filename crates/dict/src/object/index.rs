// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use talus_core::{IndexId, IndexKind, TableId};

use crate::object::ColumnRef;

/// One field of the internal index representation: a column reference and
/// an optional prefix length (0 indexes the whole column).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexField {
	pub column: ColumnRef,
	/// Column name at build time; kept so the index remains
	/// self-describing for foreign-key matching and diagnostics.
	pub name: String,
	pub prefix_len: u32,
}

/// Per-index statistics placeholders, sized to the unique key prefix.
/// Collection is outside this subsystem; the arrays exist so the clone
/// performed by deferred reclamation has something real to deep-copy.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
	pub n_diff_key_vals: Vec<u64>,
	pub n_sample_sizes: Vec<u64>,
	pub n_non_null_key_vals: Vec<u64>,
}

impl IndexStats {
	pub fn zeroed(n_uniq: usize) -> Self {
		Self {
			n_diff_key_vals: vec![0; n_uniq],
			n_sample_sizes: vec![0; n_uniq],
			n_non_null_key_vals: vec![0; n_uniq],
		}
	}
}

/// The internal (augmented) representation of an index.
///
/// Bulk data — the field sequence and counts — is immutable once the
/// index is published. The flags and the accelerator pin counter are the
/// only shared-mutable state: flags change under the cache mutex, the pin
/// counter is driven by the accelerator without the mutex.
#[derive(Debug)]
pub struct Index {
	pub id: IndexId,
	pub name: String,
	pub table_id: TableId,
	pub kind: IndexKind,
	pub unique: bool,
	/// Augmented field sequence; the first `n_user_fields` are the
	/// user-declared ones.
	pub fields: Vec<IndexField>,
	pub n_user_fields: u32,
	/// Length of the unique key prefix used for uniqueness and locking
	/// comparisons.
	pub n_uniq: u32,
	pub stats: IndexStats,

	committed: AtomicBool,
	to_be_dropped: AtomicBool,
	freed: AtomicBool,
	/// Pages of this index held by the external lookup accelerator.
	pins: AtomicU32,
}

impl Index {
	pub fn new(
		id: IndexId,
		name: String,
		table_id: TableId,
		kind: IndexKind,
		unique: bool,
		fields: Vec<IndexField>,
		n_user_fields: u32,
		n_uniq: u32,
	) -> Self {
		Self {
			id,
			name,
			table_id,
			kind,
			unique,
			fields,
			n_user_fields,
			n_uniq,
			stats: IndexStats::zeroed(n_uniq as usize),
			committed: AtomicBool::new(true),
			to_be_dropped: AtomicBool::new(false),
			freed: AtomicBool::new(false),
			pins: AtomicU32::new(0),
		}
	}

	pub fn is_clustered(&self) -> bool {
		self.kind == IndexKind::Clustered
	}

	/// The fields compared for uniqueness and locking.
	pub fn unique_key_prefix(&self) -> &[IndexField] {
		&self.fields[..self.n_uniq as usize]
	}

	/// Whether the index orders by the given whole column (prefix-only
	/// appearances do not count).
	pub fn contains_whole_column(&self, column: ColumnRef) -> bool {
		self.fields.iter().any(|field| field.column == column && field.prefix_len == 0)
	}

	pub fn is_committed(&self) -> bool {
		self.committed.load(Ordering::Relaxed)
	}

	pub fn set_committed(&self, committed: bool) {
		self.committed.store(committed, Ordering::Relaxed);
	}

	pub fn to_be_dropped(&self) -> bool {
		self.to_be_dropped.load(Ordering::Relaxed)
	}

	pub fn set_to_be_dropped(&self, value: bool) {
		self.to_be_dropped.store(value, Ordering::Relaxed);
	}

	/// Whether the index has been logically dropped but kept alive by
	/// accelerator pins.
	pub fn is_freed(&self) -> bool {
		self.freed.load(Ordering::Relaxed)
	}

	pub(crate) fn set_freed(&self) {
		self.freed.store(true, Ordering::Relaxed);
	}

	/// Accelerator attach: one more page of this index is cached.
	pub fn pin(&self) -> u32 {
		self.pins.fetch_add(1, Ordering::Relaxed) + 1
	}

	/// Accelerator detach. The caller is expected to run
	/// `Directory::sweep_freed` eventually once this returns 0 for a
	/// freed index.
	pub fn unpin(&self) -> u32 {
		let previous = self.pins.fetch_sub(1, Ordering::Relaxed);
		assert!(previous > 0, "accelerator pin count underflow on index {}", self.id);
		previous - 1
	}

	pub fn pin_count(&self) -> u32 {
		self.pins.load(Ordering::Relaxed)
	}

	/// Deep copy for clone-and-splice: fresh flags, zero pins, copied
	/// field list and statistics. The copy starts life unfreed and
	/// inherits committed/to-be-dropped state.
	pub(crate) fn deep_clone(&self) -> Index {
		Index {
			id: self.id,
			name: self.name.clone(),
			table_id: self.table_id,
			kind: self.kind,
			unique: self.unique,
			fields: self.fields.clone(),
			n_user_fields: self.n_user_fields,
			n_uniq: self.n_uniq,
			stats: self.stats.clone(),
			committed: AtomicBool::new(self.is_committed()),
			to_be_dropped: AtomicBool::new(self.to_be_dropped()),
			freed: AtomicBool::new(false),
			pins: AtomicU32::new(0),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn create_test_index() -> Index {
		Index::new(
			IndexId(10),
			"PRIMARY".to_string(),
			TableId(1),
			IndexKind::Clustered,
			true,
			vec![IndexField {
				column: ColumnRef::physical(0),
				name: "a".to_string(),
				prefix_len: 0,
			}],
			1,
			1,
		)
	}

	#[test]
	fn test_pin_unpin() {
		let index = create_test_index();
		assert_eq!(index.pin(), 1);
		assert_eq!(index.pin(), 2);
		assert_eq!(index.unpin(), 1);
		assert_eq!(index.unpin(), 0);
		assert_eq!(index.pin_count(), 0);
	}

	#[test]
	fn test_deep_clone_resets_pins_and_freed() {
		let index = create_test_index();
		index.pin();
		index.set_freed();
		let clone = index.deep_clone();
		assert_eq!(clone.pin_count(), 0);
		assert!(!clone.is_freed());
		assert_eq!(clone.fields, index.fields);
		assert_eq!(clone.stats.n_diff_key_vals, index.stats.n_diff_key_vals);
	}
}
