//! Deterministic session-to-bucket mapping for Sticky/IpAddressHash balancing.
//!
//! §9 Open Question (b): the exact hash used upstream is
//! `MurmurHash3 → Guava consistentHash`, which this crate does not need to
//! reproduce bit-for-bit (no cross-version session continuity requirement
//! for a ground-up implementation). We use a stable, documented,
//! deterministic pair instead: `std::hash::DefaultHasher` (SipHash-1-3)
//! to turn the session identifier into a 64-bit digest, then Jump
//! Consistent Hash (Lamping & Veach, 2014) to map the digest onto one of
//! `n` buckets. Jump consistent hash is the right choice here because it
//! gives exactly the glossary's "changes minimally when bucket count
//! changes" property, in O(1) time and space.

use std::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

/// Map a 64-bit hash onto one of `buckets` slots via jump consistent hash.
fn jump_consistent_hash(mut key: u64, buckets: i64) -> i64 {
    let mut b: i64 = -1;
    let mut j: i64 = 0;
    while j < buckets {
        b = j;
        key = key.wrapping_mul(2862933555777941757).wrapping_add(1);
        j = ((b.wrapping_add(1)) as f64 * (1i64 << 31) as f64 / (((key >> 33).wrapping_add(1)) as f64)) as i64;
    }
    b
}

/// Deterministically select an index in `[0, bucket_count)` for `session_id`.
/// Same `session_id` + same `bucket_count` always yields the same index.
pub fn select_index(session_id: &str, bucket_count: usize) -> usize {
    if bucket_count == 0 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    session_id.hash(&mut hasher);
    let digest = hasher.finish();
    jump_consistent_hash(digest, bucket_count as i64) as usize
}
