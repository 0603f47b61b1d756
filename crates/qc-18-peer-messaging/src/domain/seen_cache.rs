//! Bounded set of envelope hashes this node has already processed.
//!
//! Oldest entries are evicted first once the capacity is reached.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Default)]
struct SeenInner {
    set: HashSet<String>,
    order: VecDeque<String>,
}

/// FIFO-bounded seen-message set.
#[derive(Debug)]
pub struct SeenMessageCache {
    inner: Mutex<SeenInner>,
    capacity: usize,
}

impl SeenMessageCache {
    /// Create a cache holding at most `capacity` hashes (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(SeenInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Record `hash`. Returns `false` if it was already present.
    pub fn insert(&self, hash: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.set.contains(hash) {
            return false;
        }

        while inner.order.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.set.remove(&oldest);
                }
                None => break,
            }
        }

        inner.set.insert(hash.to_string());
        inner.order.push_back(hash.to_string());
        true
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.inner.lock().set.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
