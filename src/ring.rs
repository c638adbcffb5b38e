use std::collections::VecDeque;

/// BoundedBuffer keeps at most `capacity` items, dropping the oldest item first when a new one
/// would exceed it. Retained items stay in insertion order.
#[derive(Clone, Debug)]
pub(crate) struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            // avoid reserving huge capacities up front for generously sized buffers
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Appends `item`, returning the item that was evicted to make room for it, if any.
    ///
    /// A zero-capacity buffer retains nothing; the item itself is handed back.
    pub(crate) fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> BoundedBuffer<T> {
    /// Point-in-time copy of the retained items, oldest first.
    pub(crate) fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// Copy of the newest `n` items, oldest first.
    pub(crate) fn last(&self, n: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use spectral::prelude::*;

    #[test]
    fn evicts_oldest_first() {
        let mut buffer = BoundedBuffer::new(3);
        assert_that!(buffer.push(1)).is_none();
        assert_that!(buffer.push(2)).is_none();
        assert_that!(buffer.push(3)).is_none();
        assert_that!(buffer.push(4)).contains_value(1);
        assert_that!(buffer.push(5)).contains_value(2);
        assert_that!(buffer.to_vec()).is_equal_to(vec![3, 4, 5]);
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let mut buffer = BoundedBuffer::new(0);
        assert_that!(buffer.push("a")).contains_value("a");
        assert_that!(buffer.len()).is_equal_to(0);
    }

    #[test]
    fn last_returns_newest_in_insertion_order() {
        let mut buffer = BoundedBuffer::new(10);
        for i in 0..6 {
            buffer.push(i);
        }
        assert_that!(buffer.last(2)).is_equal_to(vec![4, 5]);
        assert_that!(buffer.last(100)).is_equal_to(vec![0, 1, 2, 3, 4, 5]);
        assert_that!(buffer.last(0)).is_empty();
    }

    proptest! {
        #[test]
        fn keeps_exactly_the_last_capacity_items(capacity in 1usize..50, extra in 0usize..100) {
            let mut buffer = BoundedBuffer::new(capacity);
            let total = capacity + extra;
            for i in 0..total {
                buffer.push(i);
            }
            let expected: Vec<usize> = (extra..total).collect();
            prop_assert_eq!(buffer.len(), capacity);
            prop_assert_eq!(buffer.to_vec(), expected);
        }
    }
}
