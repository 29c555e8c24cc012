//! Time-based stage id tokens.
//!
//! Ids look like `stg-k3x9q1`: a BLAKE3 digest of (clock millis, process
//! counter, title) rendered in base36. The token starts at
//! [`MIN_TOKEN_LEN`] characters and grows one character at a time until it
//! does not collide with an id already in use.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::clock::{Clock, SystemClock};
use crate::model::StageId;

/// Prefix shared by generated stage ids.
pub const PREFIX: &str = "stg-";
/// Shortest token length.
pub const MIN_TOKEN_LEN: usize = 6;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generates fresh stage ids.
#[derive(Clone)]
pub struct StageIdGenerator {
    clock: Arc<dyn Clock>,
    counter: Arc<AtomicU64>,
}

impl fmt::Debug for StageIdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageIdGenerator")
            .field("counter", &self.counter.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for StageIdGenerator {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }
}

impl StageIdGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Produce an id for `title` that `taken` reports as unused.
    pub fn next(&self, title: &str, taken: impl Fn(&str) -> bool) -> StageId {
        loop {
            let seq = self.counter.fetch_add(1, Ordering::Relaxed);
            let token = encode(self.clock.now_ms(), seq, title);
            for len in MIN_TOKEN_LEN..=token.len() {
                let candidate = format!("{PREFIX}{}", &token[..len]);
                if !taken(&candidate) {
                    return StageId::new(candidate);
                }
            }
        }
    }
}

fn encode(now_ms: i64, seq: u64, title: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&now_ms.to_le_bytes());
    hasher.update(&seq.to_le_bytes());
    hasher.update(title.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest.as_bytes()[..16]);
    let mut value = u128::from_le_bytes(bytes);

    let mut out = Vec::with_capacity(25);
    while value > 0 {
        out.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    while out.len() < MIN_TOKEN_LEN {
        out.push(b'0');
    }
    out.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::collections::HashSet;

    fn generator() -> StageIdGenerator {
        StageIdGenerator::new(Arc::new(ManualClock::new(1_700_000_000_000)))
    }

    #[test]
    fn ids_have_prefix_and_min_length() {
        let id = generator().next("Review", |_| false);
        assert!(id.as_str().starts_with(PREFIX));
        assert_eq!(id.as_str().len(), PREFIX.len() + MIN_TOKEN_LEN);
        assert!(
            id.as_str()[PREFIX.len()..]
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
        );
    }

    #[test]
    fn ids_are_unique_under_a_frozen_clock() {
        let ids = generator();
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let id = ids.next("Same title", |candidate| seen.contains(candidate));
            assert!(seen.insert(id.as_str().to_string()));
        }
    }

    #[test]
    fn collision_lengthens_the_token() {
        let first = generator().next("x", |_| false);
        // Same clock and counter: the first candidate is identical and must be skipped.
        let second = generator().next("x", |candidate| candidate == first.as_str());
        assert_ne!(first, second);
        assert!(second.as_str().starts_with(first.as_str()));
        assert_eq!(second.as_str().len(), first.as_str().len() + 1);
    }
}
