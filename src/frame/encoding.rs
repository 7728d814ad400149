//! Append-only interned string dictionaries.
//!
//! Categorical values and join keys are stored as integer ids into a shared
//! encoding. Encodings only ever grow; once an id is assigned it never
//! changes meaning, so readers can hold ids across fit/transform without
//! revalidation.
//!
//! The reader-writer lock lives at the session boundary: ingestion interns
//! under a write lock, the engine core only ever reads ids (lock-free) and
//! resolves strings under a read lock when emitting SQL or importances.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Id used for null / missing string values. Any negative id is null.
pub const NULL_ID: i64 = -1;

/// An append-only string interner.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StringEncoding {
    strings: Vec<String>,
    #[serde(skip)]
    map: HashMap<String, i64>,
}

impl StringEncoding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its id. Existing strings keep their id.
    pub fn intern(&mut self, s: &str) -> i64 {
        if let Some(&id) = self.map.get(s) {
            return id;
        }
        let id = self.strings.len() as i64;
        self.strings.push(s.to_string());
        self.map.insert(s.to_string(), id);
        id
    }

    /// Resolve an id back to its string. Negative ids are null.
    pub fn get(&self, id: i64) -> Option<&str> {
        if id < 0 {
            return None;
        }
        self.strings.get(id as usize).map(String::as_str)
    }

    /// Look up the id of a string without interning it.
    pub fn find(&self, s: &str) -> Option<i64> {
        self.map.get(s).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Rebuild the reverse map after deserialization (`map` is `#[serde(skip)]`).
    pub fn rebuild_map(&mut self) {
        self.map = self
            .strings
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as i64))
            .collect();
    }
}

/// A process-wide encoding shared between the session and the engine.
pub type SharedEncoding = Arc<RwLock<StringEncoding>>;

/// Create a fresh shared encoding.
pub fn shared_encoding() -> SharedEncoding {
    Arc::new(RwLock::new(StringEncoding::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let mut enc = StringEncoding::new();
        let a = enc.intern("alpha");
        let b = enc.intern("beta");
        assert_ne!(a, b);
        assert_eq!(enc.intern("alpha"), a);
        assert_eq!(enc.get(a), Some("alpha"));
        assert_eq!(enc.get(b), Some("beta"));
    }

    #[test]
    fn test_null_id_resolves_to_none() {
        let enc = StringEncoding::new();
        assert_eq!(enc.get(NULL_ID), None);
        assert_eq!(enc.get(-42), None);
    }

    #[test]
    fn test_ids_are_append_only() {
        let mut enc = StringEncoding::new();
        let ids: Vec<i64> = (0..100).map(|i| enc.intern(&format!("v{i}"))).collect();
        // Interning more strings must not disturb earlier ids.
        enc.intern("later");
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(enc.get(*id), Some(format!("v{i}").as_str()));
        }
    }

    #[test]
    fn test_rebuild_map_after_deserialize() {
        let mut enc = StringEncoding::new();
        enc.intern("x");
        enc.intern("y");
        let json = serde_json::to_string(&enc).unwrap();
        let mut back: StringEncoding = serde_json::from_str(&json).unwrap();
        back.rebuild_map();
        assert_eq!(back.find("x"), Some(0));
        assert_eq!(back.find("y"), Some(1));
        assert_eq!(back.intern("y"), 1);
    }
}
