//! Disambiguation suffix policy.
//!
//! A colliding natural key `K` is made unique by appending `-1`, `-2`, ...
//! The bare key and its suffixed variants form the key's *family*. The bare
//! key always belongs to the first record that claims it, so callers must
//! feed records in a stable order for results to be reproducible.
//!
//! This module is the pure half of the Disambiguator. Committing the chosen
//! key atomically against the store lives in `projtrack-reconcile`.

use std::collections::HashSet;

/// Separator between a natural key and its disambiguation suffix.
pub const SUFFIX_SEPARATOR: char = '-';

/// Build the `n`-th variant of a key family. Variant 0 is the bare key.
///
/// ```
/// use projtrack_core::disambiguate::with_suffix;
///
/// assert_eq!(with_suffix("694531", 0), "694531");
/// assert_eq!(with_suffix("694531", 2), "694531-2");
/// ```
pub fn with_suffix(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{base}{SUFFIX_SEPARATOR}{n}")
    }
}

/// Position of `candidate` within the family of `base`, if it belongs to it.
///
/// Returns `Some(0)` for the bare key and `Some(n)` for `base-n` where `n`
/// is a positive decimal without leading zeros.
pub fn suffix_of(candidate: &str, base: &str) -> Option<u32> {
    if candidate == base {
        return Some(0);
    }
    let rest = candidate.strip_prefix(base)?.strip_prefix(SUFFIX_SEPARATOR)?;
    if rest.is_empty() || rest.starts_with('0') || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Returns `true` if `candidate` is `base` or one of its suffixed variants.
pub fn in_family(candidate: &str, base: &str) -> bool {
    suffix_of(candidate, base).is_some()
}

/// Pick the first free variant of `natural_key`.
///
/// Scans strictly upward from the bare key: `K`, `K-1`, `K-2`, ... and
/// returns the first one not present in `taken`. The snapshot must include
/// every key the store already holds for the family plus every key issued
/// earlier in the same run.
pub fn assign_unique_key(natural_key: &str, taken: &HashSet<String>) -> String {
    (0..=u32::MAX)
        .map(|n| with_suffix(natural_key, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| with_suffix(natural_key, u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taken(keys: &[&str]) -> HashSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn free_key_is_kept_bare() {
        assert_eq!(assign_unique_key("694531", &taken(&[])), "694531");
    }

    #[test]
    fn taken_key_gets_first_suffix() {
        assert_eq!(assign_unique_key("694531", &taken(&["694531"])), "694531-1");
    }

    #[test]
    fn scan_is_strictly_upward() {
        let t = taken(&["694531", "694531-1", "694531-2"]);
        assert_eq!(assign_unique_key("694531", &t), "694531-3");
    }

    #[test]
    fn gaps_are_filled_from_the_bottom() {
        let t = taken(&["694531", "694531-2"]);
        assert_eq!(assign_unique_key("694531", &t), "694531-1");
    }

    #[test]
    fn unrelated_keys_do_not_count() {
        let t = taken(&["6945310", "694531-x"]);
        assert_eq!(assign_unique_key("694531", &t), "694531");
    }

    #[test]
    fn suffix_of_recognises_family_members() {
        assert_eq!(suffix_of("694531", "694531"), Some(0));
        assert_eq!(suffix_of("694531-1", "694531"), Some(1));
        assert_eq!(suffix_of("694531-12", "694531"), Some(12));
        assert_eq!(suffix_of("694531-01", "694531"), None);
        assert_eq!(suffix_of("694531-", "694531"), None);
        assert_eq!(suffix_of("6945311", "694531"), None);
        assert_eq!(suffix_of("RMA-7", "RMA-7-1"), None);
    }

    #[test]
    fn with_suffix_round_trips_through_suffix_of() {
        for n in [0, 1, 9, 10, 250] {
            assert_eq!(suffix_of(&with_suffix("K", n), "K"), Some(n));
        }
    }
}
