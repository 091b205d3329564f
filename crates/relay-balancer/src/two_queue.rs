//! Bounded key/value store with a 2Q replacement policy.
//!
//! Keys enter a small FIFO of recently admitted entries. Evicting from that
//! FIFO remembers the key in a ghost list, and a key re-admitted while it is
//! still remembered goes straight to the LRU of frequently used entries.
//! One-off keys are therefore flushed before keys that keep coming back.
//!
//! The store is meant for small budgets (tens of entries), so lookups are
//! linear scans over `VecDeque`s.

use std::borrow::Borrow;
use std::collections::VecDeque;

pub struct TwoQueue<K, V> {
    capacity: usize,
    recent_capacity: usize,
    ghost_capacity: usize,
    /// Admitted once, newest at the front
    recent: VecDeque<(K, V)>,
    /// Re-admitted after a ghost hit, most recently used at the front
    frequent: VecDeque<(K, V)>,
    /// Keys recently evicted from `recent`, newest at the front
    ghost: VecDeque<K>,
}

impl<K: Eq, V> TwoQueue<K, V> {
    /// Creates a store holding at most `capacity` live entries.
    ///
    /// A quarter of the budget (at least one slot) is reserved for the recent
    /// FIFO, and the ghost list remembers up to half the budget in keys.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            recent_capacity: (capacity / 4).max(1),
            ghost_capacity: (capacity / 2).max(1),
            recent: VecDeque::new(),
            frequent: VecDeque::new(),
            ghost: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.recent.len() + self.frequent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts or updates `key`.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(pos) = position(&self.frequent, &key) {
            if let Some(mut entry) = self.frequent.remove(pos) {
                entry.1 = value;
                self.frequent.push_front(entry);
            }
            return;
        }

        if let Some(pos) = position(&self.recent, &key) {
            self.recent[pos].1 = value;
            return;
        }

        if let Some(pos) = self.ghost.iter().position(|k| *k == key) {
            self.ghost.remove(pos);
            self.make_room();
            self.frequent.push_front((key, value));
            return;
        }

        self.make_room();
        self.recent.push_front((key, value));
    }

    /// Looks up `key`, marking it as used when it lives in the frequent LRU.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        if let Some(pos) = position(&self.frequent, key) {
            if pos > 0 {
                let entry = self.frequent.remove(pos)?;
                self.frequent.push_front(entry);
            }
            return self.frequent.front().map(|(_, v)| v);
        }

        position(&self.recent, key).map(|pos| &self.recent[pos].1)
    }

    /// Looks up `key` without touching recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        position(&self.frequent, key)
            .map(|pos| &self.frequent[pos].1)
            .or_else(|| position(&self.recent, key).map(|pos| &self.recent[pos].1))
    }

    /// Removes `key` and returns its value. The key is not remembered as a
    /// ghost, so a later insert starts over in the recent FIFO.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        if let Some(pos) = position(&self.frequent, key) {
            return self.frequent.remove(pos).map(|(_, v)| v);
        }
        if let Some(pos) = position(&self.recent, key) {
            return self.recent.remove(pos).map(|(_, v)| v);
        }
        None
    }

    /// Removes every live entry for which `expired` returns true and hands
    /// the removed entries back.
    pub fn remove_where<F>(&mut self, mut expired: F) -> Vec<(K, V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut removed = Vec::new();
        for queue in [&mut self.recent, &mut self.frequent] {
            let mut kept = VecDeque::with_capacity(queue.len());
            for (k, v) in queue.drain(..) {
                if expired(&k, &v) {
                    removed.push((k, v));
                } else {
                    kept.push_back((k, v));
                }
            }
            *queue = kept;
        }
        removed
    }

    /// Iterates live entries, frequent LRU first.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.frequent
            .iter()
            .chain(self.recent.iter())
            .map(|(k, v)| (k, v))
    }

    fn make_room(&mut self) {
        while self.len() >= self.capacity {
            if self.recent.len() > self.recent_capacity || self.frequent.is_empty() {
                if let Some((key, _)) = self.recent.pop_back() {
                    self.ghost.push_front(key);
                    self.ghost.truncate(self.ghost_capacity);
                }
            } else {
                self.frequent.pop_back();
            }
        }
    }
}

fn position<K, V, Q>(queue: &VecDeque<(K, V)>, key: &Q) -> Option<usize>
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    queue.iter().position(|(k, _)| k.borrow() == key)
}
