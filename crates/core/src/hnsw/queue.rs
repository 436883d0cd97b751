//! Comparator-driven binary heap.
//!
//! `std::collections::BinaryHeap` fixes the order through `Ord`; graph search
//! needs the same element type ordered both ways (nearest-first candidates and
//! farthest-first results), so the order is injected as a closure instead.

use std::cmp::Ordering;

/// Binary min-heap relative to `compare`: `pop` returns the item that compares
/// least. Pass a reversed comparator for max-heap behavior.
///
/// No capacity is enforced; callers bound the size by popping after a push.
pub struct PriorityQueue<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    items: Vec<T>,
    compare: F,
}

impl<T, F> PriorityQueue<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    pub fn new(compare: F) -> Self {
        Self {
            items: Vec::new(),
            compare,
        }
    }

    pub fn with_capacity(capacity: usize, compare: F) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            compare,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Root of the heap without removing it.
    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Removes and returns the root, or `None` if empty.
    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let top = self.items.swap_remove(0);
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Some(top)
    }

    /// Consumes the queue, returning the items in heap (not sorted) order.
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) >> 1;
            if (self.compare)(&self.items[index], &self.items[parent]) != Ordering::Less {
                break;
            }
            self.items.swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.items.len();
        loop {
            let left = (index << 1) + 1;
            let right = left + 1;
            let mut smallest = index;

            if left < len && (self.compare)(&self.items[left], &self.items[smallest]) == Ordering::Less
            {
                smallest = left;
            }
            if right < len
                && (self.compare)(&self.items[right], &self.items[smallest]) == Ordering::Less
            {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.items.swap(index, smallest);
            index = smallest;
        }
    }
}
