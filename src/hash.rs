//! xxHash-based key hashing for join-key indexes.
//!
//! Composite join keys are reduced to a deterministic 64-bit hash so the
//! matchmaker can index peripheral rows by a single integer regardless of
//! how many columns make up the key.

use xxhash_rust::xxh64;

/// Fixed seed so key hashes are stable across runs and processes.
const SEED: u64 = 0x517cc1b727220a95;

/// Hash a single interned key id.
///
/// Negative ids denote null keys; callers are expected to filter those out
/// before indexing (a null key never matches).
pub fn hash_key(id: i64) -> u64 {
    xxh64::xxh64(&id.to_le_bytes(), SEED)
}

/// Hash a composite key from multiple interned ids.
///
/// A record separator is mixed in between components so `(12, 3)` and
/// `(1, 23)` cannot collide by concatenation.
pub fn hash_composite_key(ids: &[i64]) -> u64 {
    let mut buf = Vec::with_capacity(ids.len() * 9);
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            buf.push(0x1E); // record separator
        }
        buf.extend_from_slice(&id.to_le_bytes());
    }
    xxh64::xxh64(&buf, SEED)
}
