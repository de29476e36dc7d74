//! # Work Queue
//!
//! Deduplicating FIFO of reconciliation targets with per-key serialization.
//!
//! - A key is queued at most once.
//! - A key handed out by [`WorkQueue::pop`] is *processing* until [`WorkQueue::done`].
//! - Pushing a processing key marks it *dirty*; it is queued again on `done`.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

#[derive(Debug)]
pub struct WorkQueue<K> {
    pending: VecDeque<K>,
    queued: HashSet<K>,
    processing: HashSet<K>,
    dirty: HashSet<K>,
}

impl<K> Default for WorkQueue<K> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            queued: HashSet::new(),
            processing: HashSet::new(),
            dirty: HashSet::new(),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `key` unless it is already queued; defer it if it is processing
    pub fn push(&mut self, key: K) {
        if self.processing.contains(&key) {
            self.dirty.insert(key);
        } else if self.queued.insert(key.clone()) {
            self.pending.push_back(key);
        }
    }

    /// Take the next key and mark it processing
    pub fn pop(&mut self) -> Option<K> {
        let key = self.pending.pop_front()?;
        self.queued.remove(&key);
        self.processing.insert(key.clone());
        Some(key)
    }

    /// Finish processing `key`, re-queueing it if it was pushed meanwhile
    ///
    /// Returns `true` when the key was re-queued.
    pub fn done(&mut self, key: &K) -> bool {
        self.processing.remove(key);
        if self.dirty.remove(key) {
            self.push(key.clone());
            return true;
        }
        false
    }

    #[must_use]
    pub fn is_processing(&self, key: &K) -> bool {
        self.processing.contains(key)
    }

    /// Keys waiting to be popped
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
