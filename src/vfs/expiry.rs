/*!
 * Expiration Queue
 * Indexed min-heap of cache deadlines with O(log n) arbitrary delete
 */

use std::collections::HashMap;
use std::time::SystemTime;

use ahash::RandomState;

use super::types::{Filename, Pathname};

/// Identity of a cached entry: its parent directory and its key there
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpiryKey {
    pub parent: Pathname,
    pub child: Filename,
}

impl ExpiryKey {
    #[must_use]
    pub fn new(parent: Pathname, child: Filename) -> Self {
        Self { parent, child }
    }

    /// Key of the node at `path`; `None` for the root
    #[must_use]
    pub fn for_path(path: &Pathname) -> Option<Self> {
        let (parent, child) = path.split().ok()?;
        Some(Self { parent, child })
    }

    #[must_use]
    pub fn path(&self) -> Pathname {
        self.parent.join(&self.child)
    }
}

/// Time-ordered staleness bookkeeping
///
/// Only a reaping aid: a node's own expiry field stays authoritative, and a
/// key missing from the queue says nothing about freshness.
#[derive(Debug, Default)]
pub struct ExpiryQueue {
    heap: Vec<(SystemTime, ExpiryKey)>,
    index: HashMap<ExpiryKey, usize, RandomState>,
}

impl ExpiryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, key: &ExpiryKey) -> bool {
        self.index.contains_key(key)
    }

    /// Record `key` as expiring at `at`, moving an existing entry
    pub fn put(&mut self, at: SystemTime, key: ExpiryKey) {
        if let Some(&pos) = self.index.get(&key) {
            let old = self.heap[pos].0;
            self.heap[pos].0 = at;
            if at < old {
                self.sift_up(pos);
            } else {
                self.sift_down(pos);
            }
            return;
        }
        let pos = self.heap.len();
        self.index.insert(key.clone(), pos);
        self.heap.push((at, key));
        self.sift_up(pos);
    }

    /// Drop `key`, returning its deadline if it was queued
    pub fn delete(&mut self, key: &ExpiryKey) -> Option<SystemTime> {
        let pos = self.index.remove(key)?;
        let last = self.heap.len() - 1;
        if pos != last {
            self.heap.swap(pos, last);
        }
        let (at, _) = self.heap.pop()?;
        if pos != last {
            self.index.insert(self.heap[pos].1.clone(), pos);
            self.sift_down(pos);
            self.sift_up(pos);
        }
        Some(at)
    }

    /// Drop every key at or below `prefix`
    pub fn delete_under(&mut self, prefix: &Pathname) -> usize {
        let doomed: Vec<ExpiryKey> = self
            .index
            .keys()
            .filter(|key| key.path().starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            self.delete(key);
        }
        doomed.len()
    }

    #[must_use]
    pub fn peek(&self) -> Option<(SystemTime, &ExpiryKey)> {
        self.heap.first().map(|(at, key)| (*at, key))
    }

    /// Pop the earliest entry if its deadline has passed
    pub fn pop_due(&mut self, now: SystemTime) -> Option<(SystemTime, ExpiryKey)> {
        let (at, key) = self.peek()?;
        if at > now {
            return None;
        }
        let key = key.clone();
        self.delete(&key).map(|at| (at, key))
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.index.clear();
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.index.insert(self.heap[a].1.clone(), a);
        self.index.insert(self.heap[b].1.clone(), b);
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos].0 >= self.heap[parent].0 {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < len && self.heap[left].0 < self.heap[smallest].0 {
                smallest = left;
            }
            if right < len && self.heap[right].0 < self.heap[smallest].0 {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }
}
