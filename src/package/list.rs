// src/package/list.rs

//! Owning, growable sequence used for every per-package collection
//!
//! Each collection kind (dependencies, files, scripts, ...) is its own
//! instantiation of `OwnedList<T>`; elements are released through their
//! `Drop` impl when the list is reset or freed.

use std::ops::Index;
use std::slice;

/// An ordered sequence of owned elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedList<T> {
    items: Vec<T>,
}

impl<T> OwnedList<T> {
    /// Create an empty list. No storage is allocated until the first push.
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Create an empty list with room for at least `hint` elements
    pub fn with_capacity(hint: usize) -> Self {
        Self {
            items: Vec::with_capacity(hint),
        }
    }

    /// Make sure at least `hint` elements fit without reallocating.
    ///
    /// Only ever grows; calling it again with the same or a smaller hint
    /// is a no-op and never reorders existing elements.
    pub fn ensure_capacity(&mut self, hint: usize) {
        if self.items.capacity() < hint {
            self.items.reserve_exact(hint - self.items.len());
        }
    }

    /// Append an element, taking ownership of it
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Live view of the elements in insertion order
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    /// Drop every element in order and truncate to zero length.
    ///
    /// Capacity is kept so the list can be refilled without reallocating.
    pub fn reset(&mut self) {
        self.items.clear();
    }

    /// Drop every element and release the backing storage
    pub fn free(self) {
        drop(self);
    }
}

impl<T> Default for OwnedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for OwnedList<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<'a, T> IntoIterator for &'a OwnedList<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> IntoIterator for OwnedList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<T> FromIterator<T> for OwnedList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
