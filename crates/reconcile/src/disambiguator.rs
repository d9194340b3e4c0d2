//! Disambiguation index and the commit half of the Disambiguator.
//!
//! Choosing a free key is pure ([`assign_unique_key`]); making that choice
//! stick is not. [`create_case`] re-reads the store immediately before each
//! attempt and retries when a concurrent writer took the key first, up to
//! a configured bound.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, PoisonError};

use projtrack_core::disambiguate::assign_unique_key;
use projtrack_core::matcher::{CaseIdentity, CaseKeyField, CaseKeys};
use projtrack_core::types::DbId;
use projtrack_db::models::{CreateServiceCase, ServiceCase};
use projtrack_db::store::CaseFilter;
use projtrack_db::StoreError;
use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;
use crate::timed::TimedStore;

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Per-run disambiguation state.
///
/// Passed into a batch and returned in its report. Feeding a report's index
/// into the next batch makes the two batches behave like one run; start
/// from an empty index to replay a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisambiguationIndex {
    /// Cases already matched or created by a row of this run.
    claimed_cases: HashSet<DbId>,
    /// Keys issued by this run, per `field:base` family.
    issued: BTreeMap<String, BTreeSet<String>>,
}

impl DisambiguationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a case as taken by this run. Returns `false` if it already was.
    pub fn claim(&mut self, id: DbId) -> bool {
        self.claimed_cases.insert(id)
    }

    pub fn is_claimed(&self, id: DbId) -> bool {
        self.claimed_cases.contains(&id)
    }

    pub fn claimed(&self) -> &HashSet<DbId> {
        &self.claimed_cases
    }

    pub fn record_issued(&mut self, field: CaseKeyField, base: &str, key: &str) {
        self.issued
            .entry(family_id(field, base))
            .or_default()
            .insert(key.to_string());
    }

    /// Keys this run issued within the family of `base`.
    pub fn issued(&self, field: CaseKeyField, base: &str) -> impl Iterator<Item = &str> {
        self.issued
            .get(&family_id(field, base))
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn issued_count(&self) -> usize {
        self.issued.values().map(BTreeSet::len).sum()
    }
}

fn family_id(field: CaseKeyField, base: &str) -> String {
    format!("{field}:{base}")
}

/// The index shared by all lanes of a running batch.
#[derive(Debug, Default)]
pub(crate) struct SharedIndex(Mutex<DisambiguationIndex>);

impl SharedIndex {
    pub(crate) fn new(index: DisambiguationIndex) -> Self {
        Self(Mutex::new(index))
    }

    /// Run `f` with exclusive access. `f` must not await.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut DisambiguationIndex) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub(crate) fn into_inner(self) -> DisambiguationIndex {
        self.0.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Pick the first free variant of `base`, given the family members the
/// store holds and the keys this run already issued.
pub(crate) fn next_free_key<'a>(
    field: CaseKeyField,
    base: &str,
    existing: &'a [ServiceCase],
    issued: impl Iterator<Item = &'a str>,
) -> String {
    let taken: HashSet<String> = existing
        .iter()
        .filter_map(|c| c.case_key(field))
        .chain(issued)
        .map(str::to_string)
        .collect();
    assign_unique_key(base, &taken)
}

/// Create a case whose natural keys are made unique first.
///
/// `draft` carries the row's natural keys; each present key is replaced by
/// its first free family variant. Both keys are suffixed independently.
/// The caller must hold the key locks for every family involved.
pub(crate) async fn create_case(
    store: &TimedStore,
    index: &SharedIndex,
    draft: &CreateServiceCase,
    max_attempts: u32,
) -> Result<ServiceCase, ReconcileError> {
    let keys = CaseKeys {
        call_log_number: draft.call_log_number.clone(),
        rma_number: draft.rma_number.clone(),
    };
    let fields = [CaseKeyField::CallLogNumber, CaseKeyField::RmaNumber];

    for attempt in 1..=max_attempts {
        let mut input = draft.clone();
        for field in fields {
            let Some(base) = keys.get(field) else {
                continue;
            };
            let filter = CaseFilter::key_family(field, base);
            let existing = store.timed("find_cases", store.find_cases(&filter)).await?;
            let key = index.with(|idx| next_free_key(field, base, &existing, idx.issued(field, base)));
            match field {
                CaseKeyField::CallLogNumber => input.call_log_number = Some(key),
                CaseKeyField::RmaNumber => input.rma_number = Some(key),
            }
        }

        match store.timed("create_case", store.create_case(&input)).await {
            Ok(case) => {
                index.with(|idx| {
                    for field in fields {
                        if let (Some(base), Some(key)) = (keys.get(field), case.case_key(field)) {
                            idx.record_issued(field, base, key);
                        }
                    }
                    idx.claim(case.id);
                });
                return Ok(case);
            }
            Err(ReconcileError::Store(StoreError::UniqueViolation { constraint })) => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    %constraint,
                    call_log_number = ?input.call_log_number,
                    rma_number = ?input.rma_number,
                    "Disambiguated key taken concurrently, retrying",
                );
            }
            Err(e) => return Err(e),
        }
    }

    tracing::error!(
        call_log_number = ?draft.call_log_number,
        rma_number = ?draft.rma_number,
        max_attempts,
        "No free case key could be committed",
    );
    Err(ReconcileError::InvariantViolation(format!(
        "no free key for case {} after {max_attempts} attempts",
        keys.primary().map(|(_, k)| k).unwrap_or("?"),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn stored(id: DbId, call_log: &str) -> ServiceCase {
        ServiceCase {
            id,
            call_log_number: Some(call_log.to_string()),
            rma_number: None,
            serial_number: None,
            site_id: 1,
            audi_id: None,
            case_type: None,
            status: None,
            reported_on: None,
            payload: serde_json::json!({}),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn next_key_skips_store_and_issued_keys() {
        let existing = [stored(1, "694531")];
        let issued = ["694531-1"];
        let key = next_free_key(
            CaseKeyField::CallLogNumber,
            "694531",
            &existing,
            issued.iter().copied(),
        );
        assert_eq!(key, "694531-2");
    }

    #[test]
    fn next_key_ignores_the_other_field() {
        let existing = [stored(1, "694531")];
        let key = next_free_key(
            CaseKeyField::RmaNumber,
            "694531",
            &existing,
            std::iter::empty(),
        );
        assert_eq!(key, "694531");
    }

    #[test]
    fn index_tracks_claims_and_issued_keys_per_family() {
        let mut index = DisambiguationIndex::new();
        assert!(index.claim(7));
        assert!(!index.claim(7));
        assert!(index.is_claimed(7));

        index.record_issued(CaseKeyField::CallLogNumber, "K", "K-1");
        index.record_issued(CaseKeyField::RmaNumber, "K", "K");
        assert_eq!(
            index.issued(CaseKeyField::CallLogNumber, "K").collect::<Vec<_>>(),
            ["K-1"]
        );
        assert_eq!(index.issued_count(), 2);
    }

    #[test]
    fn index_survives_a_json_round_trip() {
        let mut index = DisambiguationIndex::new();
        index.claim(3);
        index.record_issued(CaseKeyField::CallLogNumber, "694531", "694531-1");
        let json = serde_json::to_string(&index).unwrap();
        let back: DisambiguationIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, index);
    }
}
