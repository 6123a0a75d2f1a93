//! Arena storage with typed handles.
//!
//! Every entity of a lowered module (types, constants, globals, functions, blocks and instructions) lives in an arena
//! and is referred to by a [`Handle`]. Types and constants go in a [`UniqueArena`] so that structurally equal entries
//! share the same handle, which is what gives the emitted module its deduplicated type and constant section.

use std::{
  cmp::Ordering,
  collections::HashMap,
  fmt,
  hash::{Hash, Hasher},
  marker::PhantomData,
  ops::{Index, IndexMut},
};

/// A typed index into an [`Arena`] or a [`UniqueArena`].
pub struct Handle<T> {
  index: u32,
  _phantom: PhantomData<T>,
}

impl<T> Clone for Handle<T> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
  fn eq(&self, other: &Self) -> bool {
    self.index == other.index
  }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl<T> Ord for Handle<T> {
  fn cmp(&self, other: &Self) -> Ordering {
    self.index.cmp(&other.index)
  }
}

impl<T> Hash for Handle<T> {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.index.hash(state);
  }
}

impl<T> fmt::Debug for Handle<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}]", self.index)
  }
}

impl<T> Handle<T> {
  pub(crate) fn new(index: u32) -> Self {
    Self {
      index,
      _phantom: PhantomData,
    }
  }

  /// Zero-based index of the handle.
  pub fn index(self) -> usize {
    self.index as usize
  }
}

fn next_index(len: usize) -> u32 {
  u32::try_from(len).unwrap_or_else(|_| panic!("arena overflow: {} items exceeds u32::MAX", len))
}

/// Append-only arena.
#[derive(Clone, Debug, PartialEq)]
pub struct Arena<T> {
  data: Vec<T>,
}

impl<T> Default for Arena<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Arena<T> {
  pub fn new() -> Self {
    Self { data: Vec::new() }
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// Append a value and return its handle.
  pub fn append(&mut self, value: T) -> Handle<T> {
    let index = next_index(self.data.len());
    self.data.push(value);
    Handle::new(index)
  }

  pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
    self.data.get(handle.index())
  }

  pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
    self.data.iter().enumerate().map(|(i, v)| (Handle::new(i as u32), v))
  }

  pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
    self.data.iter_mut().enumerate().map(|(i, v)| (Handle::new(i as u32), v))
  }
}

impl<T> Index<Handle<T>> for Arena<T> {
  type Output = T;

  fn index(&self, handle: Handle<T>) -> &T {
    &self.data[handle.index()]
  }
}

impl<T> IndexMut<Handle<T>> for Arena<T> {
  fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
    &mut self.data[handle.index()]
  }
}

/// Deduplicating arena: inserting a value equal to one already stored returns the existing handle.
#[derive(Clone, Debug)]
pub struct UniqueArena<T> {
  data: Vec<T>,
  map: HashMap<T, u32>,
}

impl<T: Hash + Eq> Default for UniqueArena<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Hash + Eq> UniqueArena<T> {
  pub fn new() -> Self {
    Self {
      data: Vec::new(),
      map: HashMap::new(),
    }
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// Insert a value, returning the handle of an equal value if there is one already.
  pub fn insert(&mut self, value: T) -> Handle<T>
  where
    T: Clone,
  {
    if let Some(&index) = self.map.get(&value) {
      return Handle::new(index);
    }

    let index = next_index(self.data.len());
    self.map.insert(value.clone(), index);
    self.data.push(value);
    Handle::new(index)
  }

  pub fn get_handle(&self, value: &T) -> Option<Handle<T>> {
    self.map.get(value).map(|&index| Handle::new(index))
  }

  pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
    self.data.get(handle.index())
  }

  pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
    self.data.iter().enumerate().map(|(i, v)| (Handle::new(i as u32), v))
  }
}

impl<T> Index<Handle<T>> for UniqueArena<T> {
  type Output = T;

  fn index(&self, handle: Handle<T>) -> &T {
    &self.data[handle.index()]
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn arena_append_and_index() {
    let mut arena = Arena::new();
    let a = arena.append("block0");
    let b = arena.append("block1");

    assert_eq!(arena[a], "block0");
    assert_eq!(arena[b], "block1");
    assert_eq!(arena.len(), 2);
    assert!(a < b);
  }

  #[test]
  fn unique_arena_dedup() {
    let mut arena = UniqueArena::new();
    let a = arena.insert(42);
    let b = arena.insert(7);
    let c = arena.insert(42);

    assert_eq!(a, c);
    assert_ne!(a, b);
    assert_eq!(arena.len(), 2);
    assert_eq!(arena.get_handle(&7), Some(b));
    assert_eq!(arena.get_handle(&3), None);
  }

  #[test]
  fn try_get_out_of_bounds() {
    let mut arena = Arena::new();
    let a = arena.append(1u8);

    assert_eq!(arena.try_get(a), Some(&1));
    assert_eq!(arena.try_get(Handle::new(10)), None);
  }
}
