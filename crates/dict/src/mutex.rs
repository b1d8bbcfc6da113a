// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::{
	sync::{
		OnceLock,
		atomic::{AtomicU64, Ordering},
	},
	time::{Duration, Instant},
};

use parking_lot::{Mutex, MutexGuard};
use tracing::{error, warn};

fn millis_since_start() -> u64 {
	static START: OnceLock<Instant> = OnceLock::new();
	let start = *START.get_or_init(Instant::now);
	Instant::now().duration_since(start).as_millis() as u64
}

/// The cache mutex with a starvation watchdog.
///
/// The first thread to block on the mutex records its wait start; any
/// later waiter checks how long that first waiter has been blocked. Past a
/// quarter of the fatal threshold the wait is logged as a warning; past
/// the threshold the mutex is assumed permanently stuck (a latching bug or
/// deadlock) and the process is terminated.
pub(crate) struct WatchdogMutex<T> {
	mutex: Mutex<T>,
	wait_start: AtomicU64,
	fatal_after: Duration,
}

impl<T> WatchdogMutex<T> {
	pub(crate) fn new(value: T, fatal_after: Duration) -> Self {
		Self {
			mutex: Mutex::new(value),
			wait_start: AtomicU64::new(0),
			fatal_after,
		}
	}

	pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
		if let Some(guard) = self.mutex.try_lock() {
			return guard;
		}
		self.lock_contended()
	}

	#[cold]
	fn lock_contended(&self) -> MutexGuard<'_, T> {
		// +1 so that a wait starting at process start is not mistaken
		// for "no waiter".
		let now = millis_since_start() + 1;
		if self
			.wait_start
			.compare_exchange(0, now, Ordering::Relaxed, Ordering::Relaxed)
			.is_ok()
		{
			let guard = self.mutex.lock();
			self.wait_start.store(0, Ordering::Relaxed);
			return guard;
		}

		let old = self.wait_start.load(Ordering::Relaxed);
		let waited = Duration::from_millis(now.saturating_sub(old));
		if old != 0 {
			if waited >= self.fatal_after {
				error!(
					waited_ms = waited.as_millis() as u64,
					"dictionary cache mutex has been stuck past the fatal threshold; aborting"
				);
				std::process::abort();
			}
			if waited > self.fatal_after / 4 {
				warn!(
					waited_ms = waited.as_millis() as u64,
					"long wait observed for the dictionary cache mutex"
				);
			}
		}
		self.mutex.lock()
	}
}

#[cfg(test)]
mod tests {
	use std::{sync::Arc, thread, time::Duration};

	use super::*;

	#[test]
	fn test_uncontended_lock() {
		let mutex = WatchdogMutex::new(7u32, Duration::from_secs(600));
		assert_eq!(*mutex.lock(), 7);
	}

	/// Exercises the watchdog branch: a second waiter arrives after the
	/// first has been blocked past a quarter of the fatal threshold.
	#[test]
	fn test_long_wait_crosses_warn_threshold() {
		let mutex = Arc::new(WatchdogMutex::new(0u32, Duration::from_secs(10)));
		let held = mutex.lock();

		let first = {
			let mutex = Arc::clone(&mutex);
			thread::spawn(move || {
				*mutex.lock() += 1;
			})
		};
		thread::sleep(Duration::from_millis(3100));
		let second = {
			let mutex = Arc::clone(&mutex);
			thread::spawn(move || {
				*mutex.lock() += 1;
			})
		};
		thread::sleep(Duration::from_millis(100));

		drop(held);
		first.join().unwrap();
		second.join().unwrap();
		assert_eq!(*mutex.lock(), 2);
	}

	#[test]
	fn test_contended_lock_hands_over() {
		let mutex = Arc::new(WatchdogMutex::new(0u32, Duration::from_secs(600)));
		let held = mutex.lock();
		let worker = {
			let mutex = Arc::clone(&mutex);
			thread::spawn(move || {
				*mutex.lock() += 1;
			})
		};
		thread::sleep(Duration::from_millis(20));
		drop(held);
		worker.join().unwrap();
		assert_eq!(*mutex.lock(), 1);
	}
}
