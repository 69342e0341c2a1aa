use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// FIFO of unique items with constant-time membership.
///
/// Used for breadth-first traversal, the download tiers and the per-frame
/// render sets. Enqueueing an item that is already queued is ignored.
#[derive(Debug, Clone)]
pub struct Queue<T> {
    items: VecDeque<T>,
    members: HashSet<T>,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
            members: HashSet::new(),
        }
    }
}

impl<T: Copy + Eq + Hash> Queue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `item`. Returns false if it was already queued.
    pub fn enqueue(&mut self, item: T) -> bool {
        if !self.members.insert(item) {
            return false;
        }
        self.items.push_back(item);
        true
    }

    pub fn dequeue(&mut self) -> Option<T> {
        let item = self.items.pop_front()?;
        self.members.remove(&item);
        Some(item)
    }

    pub fn peek(&self) -> Option<T> {
        self.items.front().copied()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.members.contains(item)
    }

    /// Remove `item` wherever it sits. Returns false if absent.
    pub fn remove(&mut self, item: &T) -> bool {
        if !self.members.remove(item) {
            return false;
        }
        self.items.retain(|queued| queued != item);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.members.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Items of `self` absent from `other`, in `self`'s order.
    pub fn difference(&self, other: &Queue<T>) -> Vec<T> {
        self.items
            .iter()
            .filter(|item| !other.contains(item))
            .copied()
            .collect()
    }

    /// Reorder the queue in place. Membership is unaffected.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.items.make_contiguous().sort_by(compare);
    }
}
