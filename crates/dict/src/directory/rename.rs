// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use tracing::instrument;

use crate::{
	Error,
	directory::{Directory, DirectoryInner},
	foreign,
	object::TableHandle,
};

impl DirectoryInner {
	pub(crate) fn rename_table(&mut self, handle: TableHandle, new_name: &str, propagate: bool) -> crate::Result<()> {
		if self.by_name.contains_key(new_name) {
			return Err(Error::AlreadyExists {
				name: new_name.to_string(),
			});
		}
		let old_name = self.table(handle).name.clone();
		self.by_name.remove(&old_name);
		self.table_mut(handle).name = new_name.to_string();
		self.by_name.insert(new_name.to_string(), handle);

		if propagate {
			foreign::rename_propagate(self, handle, &old_name);
		} else {
			// The table changes identity (ALTER swaps it for a rebuilt
			// copy); its constraints do not follow.
			foreign::detach_all(self, handle);
		}
		Ok(())
	}
}

impl Directory {
	/// Rename a cached table. With `propagate` the foreign key graph
	/// follows the new name, including the rebase of generated constraint
	/// identifiers; without it the table leaves the graph entirely.
	#[instrument(name = "dict::rename", level = "trace", skip(self))]
	pub fn rename(&self, handle: TableHandle, new_name: &str, propagate: bool) -> crate::Result<()> {
		self.inner.lock().rename_table(handle, new_name, propagate)
	}
}
