//! Temporary-to-permanent uid remapping
//!
//! Messages appended or transferred while offline get a client-local
//! temporary uid. Replay records the server-assigned permanent uid here so
//! higher layers (draft tracking, message composition) can translate a
//! just-replayed identifier.

use std::collections::HashMap;
use uuid::Uuid;

/// Pure lookup table; entries are only ever added, never removed, for the
/// lifetime of the owning journal.
#[derive(Debug, Default)]
pub struct UidRemap {
    entries: HashMap<String, String>,
}

impl UidRemap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `old` (temporary) was replayed as `new` (permanent).
    pub fn add(&mut self, old: impl Into<String>, new: impl Into<String>) {
        self.entries.insert(old.into(), new.into());
    }

    /// Permanent uid for a temporary uid, if that record has been replayed.
    pub fn lookup(&self, old: &str) -> Option<&str> {
        self.entries.get(old).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Allocate a fresh client-local temporary uid.
pub fn temporary_uid() -> String {
    format!("tmp-{}", Uuid::new_v4())
}
