//! In-memory registries keyed by monotonically generated ids.
//!
//! Every component owns the registries it mutates and receives them at
//! construction time, so tests can seed a registry with fixtures before
//! handing it over.

use std::collections::BTreeMap;

/// Ordering key: the numeric suffix of `<prefix>-<n>` ids first, so
/// `task-2` precedes `task-10`. Foreign ids sort after generated ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct EntryKey {
    seq: u64,
    id: String,
}

/// Map-backed store that hands out ids of the form `<prefix>-<n>`.
///
/// Ids are never handed out twice. Seeding an entry under a `<prefix>-<n>`
/// id moves the counter past `n`.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    prefix: String,
    next_id: u64,
    entries: BTreeMap<EntryKey, T>,
}

impl<T> Registry<T> {
    /// Create an empty registry whose ids start with `prefix`.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            next_id: 1,
            entries: BTreeMap::new(),
        }
    }

    /// Reserve the next id without inserting anything.
    pub fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.prefix, self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert or replace a value under `id`.
    pub fn put(&mut self, id: &str, value: T) -> Option<T> {
        let key = self.key(id);
        if key.seq != u64::MAX {
            self.next_id = self.next_id.max(key.seq + 1);
        }
        self.entries.insert(key, value)
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(&self.key(id))
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        let key = self.key(id);
        self.entries.get_mut(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Values in creation order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    fn key(&self, id: &str) -> EntryKey {
        let seq = id
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|n| n.parse::<u64>().ok())
            .filter(|n| *n != u64::MAX)
            .unwrap_or(u64::MAX);
        EntryKey {
            seq,
            id: id.to_string(),
        }
    }
}
