//! Coordination-free identifiers
//!
//! Hashtags have no identifier of their own in the source documents. Every
//! extraction worker derives one from the tag text, so the same tag maps to the
//! same row no matter which worker (or which run) saw it first.

use sha2::{Digest, Sha256};

/// Mask keeping the low 63 bits, so identifiers fit a signed 64-bit column.
const ID_MASK: u64 = (1 << 63) - 1;

/// Identifier of a hashtag given its normalized (trimmed, case-preserving) text.
///
/// SHA-256 of the UTF-8 text, read as a big-endian integer, reduced modulo 2^63.
/// Only the last eight digest bytes survive that reduction.
pub fn tag_id(normalized: &str) -> i64 {
    let digest = Sha256::digest(normalized.as_bytes());
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest[24..32]);
    (u64::from_be_bytes(tail) & ID_MASK) as i64
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tag_id_known_values() {
        assert_eq!(tag_id("rust"), 7022377116954654115);
        assert_eq!(tag_id("DataEngineering"), 3176349613235452720);
        assert_eq!(tag_id("#x"), 4600796053308856989);
    }

    #[test]
    fn test_tag_id_is_case_sensitive() {
        assert_ne!(tag_id("Rust"), tag_id("rust"));
    }

    proptest! {
        #[test]
        fn prop_tag_id_non_negative_and_stable(text in ".*") {
            let first = tag_id(&text);
            prop_assert!(first >= 0);
            prop_assert_eq!(first, tag_id(&text.clone()));
        }
    }
}
