//! Lock-free round-robin selection over a fixed list

use std::sync::atomic::{AtomicUsize, Ordering};

/// Hands out items in turn, wrapping around at the end.
///
/// `next` may be called from many threads at once; each call advances a
/// shared cursor.
#[derive(Debug)]
pub struct Rotor<T> {
    items: Vec<T>,
    cursor: AtomicUsize,
}

impl<T> Rotor<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next item, or `None` when the rotor is empty
    pub fn next(&self) -> Option<&T> {
        if self.items.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.items.len();
        self.items.get(idx)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }
}

impl<T> FromIterator<T> for Rotor<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
