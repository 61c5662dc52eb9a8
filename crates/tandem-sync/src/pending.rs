//! Apply-when-ready buffer for messages about entities that do not exist yet.
//!
//! A message naming an entity that is not resolvable on this side is parked
//! under the entity's key. When the entity appears, the owner calls
//! [`PendingBuffer::take`] before any default initialization. A key that is in
//! the buffer never has a live entity.

use std::collections::HashMap;
use std::hash::Hash;

/// What [`PendingBuffer::apply_or_defer`] did with a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferral {
    /// The target resolved and the payload was applied.
    Applied,
    /// The payload was parked.
    Deferred,
    /// The payload replaced an older parked payload.
    Replaced,
}

/// Keyed last-write-wins parking lot.
#[derive(Debug, Clone)]
pub struct PendingBuffer<K, P> {
    label: &'static str,
    entries: HashMap<K, P>,
}

impl<K, P> PendingBuffer<K, P>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    /// Empty buffer. `label` names it in logs.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: HashMap::new(),
        }
    }

    /// Try `apply`; park the payload if it hands it back.
    ///
    /// `apply` returns `Err(payload)` when the target is not resolvable.
    /// On success any stale entry for the key is dropped.
    pub fn apply_or_defer<F>(&mut self, key: K, payload: P, apply: F) -> Deferral
    where
        F: FnOnce(P) -> Result<(), P>,
    {
        match apply(payload) {
            Ok(()) => {
                if self.entries.remove(&key).is_some() {
                    tracing::trace!("{}: dropped stale entry for {key:?}", self.label);
                }
                Deferral::Applied
            }
            Err(payload) => {
                tracing::debug!("{}: deferring payload for {key:?}", self.label);
                match self.entries.insert(key, payload) {
                    Some(_) => Deferral::Replaced,
                    None => Deferral::Deferred,
                }
            }
        }
    }

    /// Park a payload without trying to apply it.
    pub fn defer(&mut self, key: K, payload: P) {
        self.entries.insert(key, payload);
    }

    /// Remove and return the parked payload, called when `key` resolves.
    pub fn take(&mut self, key: &K) -> Option<P> {
        self.entries.remove(key)
    }

    /// Peek at a parked payload.
    pub fn get(&self, key: &K) -> Option<&P> {
        self.entries.get(key)
    }

    /// Whether `key` has a parked payload.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Keep only entries matching `keep`.
    pub fn retain<F: FnMut(&K, &mut P) -> bool>(&mut self, keep: F) {
        self.entries.retain(keep);
    }

    /// Number of parked payloads.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is parked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolvable_target_applies_without_entry() {
        let mut buf: PendingBuffer<u32, i32> = PendingBuffer::new("test");
        let mut applied = Vec::new();
        let result = buf.apply_or_defer(1, 10, |p| {
            applied.push(p);
            Ok(())
        });
        assert_eq!(result, Deferral::Applied);
        assert_eq!(applied, vec![10]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unresolvable_target_is_last_write_wins() {
        let mut buf: PendingBuffer<u32, i32> = PendingBuffer::new("test");
        assert_eq!(buf.apply_or_defer(1, 10, Err), Deferral::Deferred);
        assert_eq!(buf.apply_or_defer(1, 20, Err), Deferral::Replaced);
        assert_eq!(buf.len(), 1);

        // Resolution flushes exactly once.
        assert_eq!(buf.take(&1), Some(20));
        assert_eq!(buf.take(&1), None);
    }

    #[test]
    fn test_later_apply_drops_stale_entry() {
        let mut buf: PendingBuffer<&str, i32> = PendingBuffer::new("test");
        buf.apply_or_defer("a", 1, Err);
        assert!(buf.contains(&"a"));
        buf.apply_or_defer("a", 2, |_| Ok(()));
        assert!(!buf.contains(&"a"));
    }

    #[test]
    fn test_retain_drops_keys() {
        let mut buf: PendingBuffer<u32, i32> = PendingBuffer::new("test");
        for k in 0..5 {
            buf.defer(k, k as i32);
        }
        buf.retain(|k, _| k % 2 == 0);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.get(&2), Some(&2));
    }
}
