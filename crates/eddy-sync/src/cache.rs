//! Keyed snapshot store backing the visible views.
//!
//! Each key holds one immutable snapshot; replacing it is a single atomic
//! swap. In-flight async work takes a write token first; cancelling the key
//! bumps its generation so a stale commit is dropped instead of clobbering
//! a newer snapshot.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

struct Entry<T> {
    value: Option<T>,
    generation: u64,
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self { value: None, generation: 0 }
    }
}

/// Token tying an in-flight computation to the generation it started from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteToken {
    key: String,
    generation: u64,
}

pub struct ViewCache<T> {
    entries: RwLock<HashMap<String, Entry<T>>>,
}

impl<T: Clone> ViewCache<T> {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().expect("cache lock poisoned");
        entries.get(key).and_then(|e| e.value.clone())
    }

    /// Start an async computation against the current generation.
    pub fn begin_write(&self, key: &str) -> WriteToken {
        let entries = self.entries.read().expect("cache lock poisoned");
        let generation = entries.get(key).map(|e| e.generation).unwrap_or(0);
        WriteToken { key: key.to_string(), generation }
    }

    /// Commit a computed snapshot. Returns false (and drops the value) if
    /// the key was cancelled or replaced since the token was taken.
    pub fn commit(&self, token: &WriteToken, value: T) -> bool {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        let entry = entries.entry(token.key.clone()).or_default();
        if entry.generation != token.generation {
            debug!("dropping stale snapshot for {}", token.key);
            return false;
        }
        entry.value = Some(value);
        true
    }

    /// Unconditional atomic swap of the current snapshot.
    pub fn set(&self, key: &str, value: T) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.entry(key.to_string()).or_default().value = Some(value);
    }

    /// Invalidate the stored snapshot and orphan any in-flight writers.
    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        if let Some(entry) = entries.get_mut(key) {
            entry.value = None;
            entry.generation += 1;
        }
    }

    /// Orphan in-flight writers without touching the visible snapshot.
    pub fn cancel_in_flight(&self, key: &str) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.entry(key.to_string()).or_default().generation += 1;
    }
}

impl<T: Clone> Default for ViewCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
