//! Site name comparison keys.
//!
//! Two keys exist on purpose:
//!
//! - [`site_match_key`] is what the Reconciler matches on: trimmed,
//!   whitespace-collapsed, lowercased. No spelling is ever changed.
//! - [`site_audit_key`] additionally applies the [`TYPO_CORRECTIONS`] table
//!   word by word. Only the Integrity Auditor uses it, to propose merges.
//!
//! [`edit_distance`] backs the auditor's fuzzy *suggestions*, which are
//! never executed automatically.

use crate::normalize::collapse_whitespace;

/// Known misspellings seen in site sheets, as `(wrong, right)` word pairs.
pub const TYPO_CORRECTIONS: &[(&str, &str)] = &[
    ("ghandhinagar", "gandhinagar"),
    ("gandhinager", "gandhinagar"),
    ("ahmedabd", "ahmedabad"),
    ("ahemdabad", "ahmedabad"),
    ("banglore", "bangalore"),
    ("hydrabad", "hyderabad"),
    ("cinepolise", "cinepolis"),
    ("multiplx", "multiplex"),
];

/// Maximum edit distance between audit keys for a fuzzy merge suggestion.
pub const SUGGESTION_MAX_DISTANCE: usize = 2;

/// Key used by the Reconciler to match an incoming site name.
pub fn site_match_key(name: &str) -> String {
    collapse_whitespace(name).to_lowercase()
}

/// Key used by the Integrity Auditor to group duplicate sites.
pub fn site_audit_key(name: &str) -> String {
    site_match_key(name)
        .split(' ')
        .map(|word| {
            TYPO_CORRECTIONS
                .iter()
                .find(|(wrong, _)| *wrong == word)
                .map(|(_, right)| *right)
                .unwrap_or(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Levenshtein distance over Unicode scalar values.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
