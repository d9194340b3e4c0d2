//! Batch scheduling and the batch report.
//!
//! Rows that share a case key family must be handled in source order, or
//! the bare key would go to whichever row won the race. Such rows are
//! grouped into a *lane*; lanes run concurrently, rows within a lane run
//! one after another.

use std::collections::{BTreeMap, HashMap};

use futures::stream::{self, StreamExt};
use projtrack_core::matcher::CaseKeyField;
use projtrack_core::types::EntityType;
use serde::Serialize;

use crate::diagnostics::{Diagnostic, Outcome};
use crate::disambiguator::DisambiguationIndex;
use crate::error::ErrorKind;
use crate::reconciler::{Reconciler, RowReport};
use crate::row::NormalizedRow;

// ---------------------------------------------------------------------------
// Lanes
// ---------------------------------------------------------------------------

/// Group rows into lanes by shared case key families.
///
/// Two rows land in the same lane when they carry the same value for the
/// same key field, directly or through a chain of rows. Lanes are ordered
/// by their first row; rows keep source order within a lane.
pub(crate) fn plan_lanes(rows: Vec<NormalizedRow>) -> Vec<Vec<NormalizedRow>> {
    let mut parent: Vec<usize> = (0..rows.len()).collect();
    {
        let mut owner: HashMap<(CaseKeyField, &str), usize> = HashMap::new();
        for (pos, row) in rows.iter().enumerate() {
            for field in [CaseKeyField::CallLogNumber, CaseKeyField::RmaNumber] {
                let Some(key) = row.case_keys.get(field) else {
                    continue;
                };
                match owner.get(&(field, key)) {
                    Some(&other) => union(&mut parent, pos, other),
                    None => {
                        owner.insert((field, key), pos);
                    }
                }
            }
        }
    }

    let roots: Vec<usize> = (0..rows.len()).map(|pos| find(&mut parent, pos)).collect();
    let mut lane_of_root: HashMap<usize, usize> = HashMap::new();
    let mut lanes: Vec<Vec<NormalizedRow>> = Vec::new();
    for (row, root) in rows.into_iter().zip(roots) {
        let lane = *lane_of_root.entry(root).or_insert_with(|| {
            lanes.push(Vec::new());
            lanes.len() - 1
        });
        lanes[lane].push(row);
    }
    lanes
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    // The smaller root wins so a lane's root is its first row.
    if ra < rb {
        parent[rb] = ra;
    } else {
        parent[ra] = rb;
    }
}

/// Reconcile lanes with at most `workers` in flight. Reports come back in
/// source order.
pub(crate) async fn run_lanes(
    reconciler: &Reconciler<'_>,
    lanes: Vec<Vec<NormalizedRow>>,
    workers: usize,
) -> Vec<RowReport> {
    let mut reports: Vec<RowReport> = stream::iter(lanes)
        .map(move |lane| async move {
            let mut reports = Vec::with_capacity(lane.len());
            for row in &lane {
                reports.push(reconciler.reconcile_row(row).await);
            }
            reports
        })
        .buffer_unordered(workers.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .flatten()
        .collect();
    reports.sort_by_key(|r| r.index);
    reports
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Summary of one batch. Always produced, whatever happened to the rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub rows_total: usize,
    /// Rows that ran every stage (possibly with ambiguities or gaps).
    pub rows_succeeded: usize,
    /// Rows rejected by validation before any write.
    pub rows_skipped: usize,
    /// Rows aborted by a store failure, timeout or invariant violation.
    pub rows_failed: usize,
    pub by_outcome: BTreeMap<Outcome, usize>,
    pub by_entity: BTreeMap<EntityType, BTreeMap<Outcome, usize>>,
    pub by_error_kind: BTreeMap<ErrorKind, usize>,
    /// Index to pass into a follow-up batch of the same run.
    pub index: DisambiguationIndex,
}

impl BatchReport {
    pub(crate) fn count(&mut self, diagnostic: &Diagnostic) {
        *self.by_outcome.entry(diagnostic.outcome).or_default() += 1;
        if let Some(entity) = diagnostic.entity_type {
            *self
                .by_entity
                .entry(entity)
                .or_default()
                .entry(diagnostic.outcome)
                .or_default() += 1;
        }
        if let Some(kind) = diagnostic.error_kind {
            *self.by_error_kind.entry(kind).or_default() += 1;
        }
    }

    pub(crate) fn add_row(&mut self, report: &RowReport) {
        self.rows_total += 1;
        if report.failed {
            self.rows_failed += 1;
        } else {
            self.rows_succeeded += 1;
        }
        for diagnostic in &report.diagnostics {
            self.count(diagnostic);
        }
    }

    pub(crate) fn add_skipped(&mut self, diagnostics: &[Diagnostic]) {
        self.rows_total += 1;
        self.rows_skipped += 1;
        for diagnostic in diagnostics {
            self.count(diagnostic);
        }
    }

    /// Count of one outcome for one entity type.
    pub fn entity_outcome(&self, entity: EntityType, outcome: Outcome) -> usize {
        self.by_entity
            .get(&entity)
            .and_then(|m| m.get(&outcome))
            .copied()
            .unwrap_or(0)
    }

    pub fn error_count(&self, kind: ErrorKind) -> usize {
        self.by_error_kind.get(&kind).copied().unwrap_or(0)
    }
}
