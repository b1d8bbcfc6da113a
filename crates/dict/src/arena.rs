// Copyright (c) talusdb.org 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Slot arena with generation-checked handles.
//!
//! Cached tables and foreign keys live in arenas and refer to each other
//! by handle instead of by pointer; a handle to a freed slot simply stops
//! resolving once the slot is reused, which turns the dangling-pointer
//! hazards of an intrusive design into lookup misses.

use std::{fmt, hash::Hash, marker::PhantomData};

pub struct Handle<T> {
	index: u32,
	generation: u32,
	_marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
	fn new(index: u32, generation: u32) -> Self {
		Self {
			index,
			generation,
			_marker: PhantomData,
		}
	}
}

impl<T> Clone for Handle<T> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
	fn eq(&self, other: &Self) -> bool {
		self.index == other.index && self.generation == other.generation
	}
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.index.hash(state);
		self.generation.hash(state);
	}
}

impl<T> fmt::Debug for Handle<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Handle({}v{})", self.index, self.generation)
	}
}

struct Slot<T> {
	generation: u32,
	value: Option<T>,
}

pub struct Arena<T> {
	slots: Vec<Slot<T>>,
	free: Vec<u32>,
	len: usize,
}

impl<T> Arena<T> {
	pub fn new() -> Self {
		Self {
			slots: Vec::new(),
			free: Vec::new(),
			len: 0,
		}
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn insert(&mut self, value: T) -> Handle<T> {
		self.len += 1;
		if let Some(index) = self.free.pop() {
			let slot = &mut self.slots[index as usize];
			debug_assert!(slot.value.is_none());
			slot.value = Some(value);
			Handle::new(index, slot.generation)
		} else {
			let index = self.slots.len() as u32;
			self.slots.push(Slot {
				generation: 0,
				value: Some(value),
			});
			Handle::new(index, 0)
		}
	}

	pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
		let slot = self.slots.get_mut(handle.index as usize)?;
		if slot.generation != handle.generation || slot.value.is_none() {
			return None;
		}
		slot.generation = slot.generation.wrapping_add(1);
		self.len -= 1;
		self.free.push(handle.index);
		slot.value.take()
	}

	pub fn get(&self, handle: Handle<T>) -> Option<&T> {
		let slot = self.slots.get(handle.index as usize)?;
		if slot.generation != handle.generation {
			return None;
		}
		slot.value.as_ref()
	}

	pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
		let slot = self.slots.get_mut(handle.index as usize)?;
		if slot.generation != handle.generation {
			return None;
		}
		slot.value.as_mut()
	}

	pub fn contains(&self, handle: Handle<T>) -> bool {
		self.get(handle).is_some()
	}

	pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
		self.slots.iter().enumerate().filter_map(|(index, slot)| {
			slot.value.as_ref().map(|value| (Handle::new(index as u32, slot.generation), value))
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_insert_get_remove() {
		let mut arena = Arena::new();
		let a = arena.insert("a");
		let b = arena.insert("b");
		assert_eq!(arena.len(), 2);
		assert_eq!(arena.get(a), Some(&"a"));
		assert_eq!(arena.remove(a), Some("a"));
		assert_eq!(arena.get(a), None);
		assert_eq!(arena.get(b), Some(&"b"));
	}

	#[test]
	fn test_stale_handle_does_not_resolve_after_reuse() {
		let mut arena = Arena::new();
		let a = arena.insert(1);
		arena.remove(a);
		let b = arena.insert(2);
		// The slot was reused; the old handle must miss.
		assert_eq!(arena.get(a), None);
		assert_eq!(arena.get(b), Some(&2));
		assert_ne!(a, b);
	}
}
