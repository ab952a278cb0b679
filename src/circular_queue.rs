use std::fmt;

/// Fixed-capacity ring buffer backed by a single allocation.
///
/// Once full, every push overwrites the oldest item in place.
pub struct CircularQueue<T> {
    items: Vec<T>,
    head: usize,
    capacity: usize,
}

impl<T: Clone> Clone for CircularQueue<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            head: self.head,
            capacity: self.capacity,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CircularQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.asc_iter()).finish()
    }
}

impl<T> CircularQueue<T> {
    #[inline]
    pub fn with_capacity(cap: usize) -> Self {
        let capacity = cap.max(1);

        Self {
            items: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Appends `item`, returning the evicted oldest item when the queue was full.
    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.items.len() < self.capacity {
            self.items.push(item);
            return None;
        }

        let evicted = std::mem::replace(&mut self.items[self.head], item);
        self.head = (self.head + 1) % self.capacity;

        Some(evicted)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
        self.head = 0;
    }

    /// Newest first.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &'_ T> {
        self.asc_iter().rev()
    }

    /// Oldest first.
    #[inline]
    pub fn asc_iter(&self) -> impl DoubleEndedIterator<Item = &'_ T> {
        let (older, newer) = self.items.split_at(self.head);
        newer.iter().chain(older.iter())
    }
}
