use std::collections::VecDeque;

/// Fixed-capacity event log, newest entry first.
///
/// Pushing past the capacity evicts the oldest entry, so `len()` never
/// exceeds `capacity()`.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(entry);
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.front()
    }

    /// Entries from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.entries.retain(keep);
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn newest_entry_comes_first() {
        let mut history = BoundedHistory::new(3);
        history.push(1);
        history.push(2);
        assert_eq!(history.latest(), Some(&2));
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn overflow_drops_the_oldest() {
        let mut history = BoundedHistory::new(3);
        for n in 1..=5 {
            history.push(n);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![5, 4, 3]);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut history = BoundedHistory::new(0);
        history.push("a");
        history.push("b");
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.latest(), Some(&"b"));
    }

    proptest! {
        #[test]
        fn keeps_exactly_the_most_recent(limit in 1usize..120, extra in 0usize..200) {
            let total = limit + extra;
            let mut history = BoundedHistory::new(limit);
            for n in 0..total {
                history.push(n);
            }
            prop_assert_eq!(history.len(), limit);
            let expected: Vec<usize> = (total - limit..total).rev().collect();
            prop_assert_eq!(history.iter().copied().collect::<Vec<_>>(), expected);
        }
    }
}
