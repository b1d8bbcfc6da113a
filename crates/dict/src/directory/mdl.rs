// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Opening a table by id under an external metadata lock.
//!
//! The lock manager keys locks by qualified name, but the name can change
//! between reading it and holding the lock. The protocol locks the name
//! the table had, then re-checks it under the cache mutex and retries with
//! the new name if a rename slipped in between.

use talus_core::{NameLockManager, TableId};
use tracing::{instrument, trace};

use crate::{
	Error,
	directory::Directory,
	object::{TableHandle, db_name_len},
};

/// An opened table together with the metadata lock protecting it, when one
/// was taken. The caller owns both: close the handle, release the lock.
#[derive(Debug)]
pub struct OpenedTable<L> {
	pub handle: TableHandle,
	pub lock: Option<L>,
}

impl Directory {
	/// Open a table by id and take the shared metadata lock on its name.
	///
	/// Unqualified (engine-internal) and mid-DDL intermediate names are
	/// not lockable; such tables come back without a lock. With `try_only`
	/// a contended lock fails immediately instead of waiting.
	#[instrument(name = "dict::open_by_id_locked", level = "trace", skip(self, manager))]
	pub fn open_by_id_locked<M: NameLockManager>(
		&self,
		id: TableId,
		manager: &M,
		try_only: bool,
	) -> crate::Result<OpenedTable<M::Lock>> {
		loop {
			let handle = self.open_by_id(id, false)?;
			let (name, readable, intermediate) = self
				.with_table(handle, |table| (table.name.clone(), table.is_readable(), table.is_intermediate()))
				.expect("table just opened");

			if db_name_len(&name) == 0 || intermediate {
				return Ok(OpenedTable {
					handle,
					lock: None,
				});
			}
			if !readable {
				self.close(handle, false);
				return Err(Error::NotAccessible { name });
			}

			// The reference is given up before the manager may block, so
			// a concurrent drop is not held up by our wait.
			self.close(handle, false);
			let lock = if try_only {
				match manager.try_acquire(&name) {
					Some(lock) => lock,
					None => return Err(Error::LockContended { name }),
				}
			} else {
				match manager.acquire(&name, self.config.name_lock_timeout) {
					Ok(lock) => lock,
					Err(_) => return Err(Error::LockTimeout { name }),
				}
			};

			// Re-resolve: the table may be gone, mid-DDL, or renamed by
			// the time the lock arrived.
			let handle = match self.open_by_id(id, false) {
				Ok(handle) => handle,
				Err(err) => {
					manager.release(lock);
					return Err(err);
				}
			};
			let (current_name, readable, intermediate) = self
				.with_table(handle, |table| (table.name.clone(), table.is_readable(), table.is_intermediate()))
				.expect("table just opened");
			if db_name_len(&current_name) == 0 || intermediate {
				manager.release(lock);
				return Ok(OpenedTable {
					handle,
					lock: None,
				});
			}
			if !readable {
				manager.release(lock);
				self.close(handle, false);
				return Err(Error::NotAccessible { name: current_name });
			}
			if current_name == name {
				return Ok(OpenedTable {
					handle,
					lock: Some(lock),
				});
			}

			trace!(table = %name, "table renamed while waiting for its lock, retrying");
			manager.release(lock);
			self.close(handle, false);
		}
	}
}
