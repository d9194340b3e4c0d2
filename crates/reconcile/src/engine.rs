//! The reconciliation engine: a store handle plus the coordination state
//! shared by every batch and audit run against it.

use std::sync::Arc;

use projtrack_core::error::CoreError;
use projtrack_db::CanonicalStore;
use tokio::sync::RwLock;

use crate::auditor::{self, RepairCheck, RepairOutcome, RepairPlan};
use crate::batch::{self, BatchReport};
use crate::config::ReconcileConfig;
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::disambiguator::{DisambiguationIndex, SharedIndex};
use crate::error::ReconcileError;
use crate::locks::KeyLocks;
use crate::reconciler::Reconciler;
use crate::row::{ColumnMap, NormalizedRow};
use crate::source::RowSource;
use crate::timed::TimedStore;

pub struct Engine {
    store: TimedStore,
    config: ReconcileConfig,
    locks: KeyLocks,
    /// Batches hold it shared; applying a repair plan holds it exclusively.
    gate: RwLock<()>,
    columns: ColumnMap,
}

impl Engine {
    pub fn new(store: Arc<dyn CanonicalStore>, config: ReconcileConfig) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self {
            store: TimedStore::new(store, config.store_timeout),
            config,
            locks: KeyLocks::new(),
            gate: RwLock::new(()),
            columns: ColumnMap::default(),
        })
    }

    /// Replace the header alias table.
    pub fn with_columns(mut self, columns: ColumnMap) -> Self {
        self.columns = columns;
        self
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Reconcile every row of `source`.
    ///
    /// Rows are validated up front; rows that fail are reported and never
    /// touch the store. Per-row failures are recorded in the report and
    /// `sink`; only a source that cannot be opened fails the batch.
    pub async fn reconcile_batch(
        &self,
        source: &dyn RowSource,
        index: DisambiguationIndex,
        sink: &dyn DiagnosticsSink,
    ) -> Result<BatchReport, ReconcileError> {
        let _gate = self.gate.read().await;
        let mut report = BatchReport::default();

        let mut rows = Vec::new();
        for (position, raw) in source.rows()?.enumerate() {
            let normalized = raw
                .map_err(|e| vec![e])
                .and_then(|raw| NormalizedRow::from_raw(position, &raw, &self.columns));
            match normalized {
                Ok(row) => rows.push(row),
                Err(errors) => {
                    let diagnostics: Vec<Diagnostic> = errors
                        .iter()
                        .map(|e| Diagnostic::from_error(position, None, e))
                        .collect();
                    for diagnostic in &diagnostics {
                        sink.record(diagnostic);
                    }
                    report.add_skipped(&diagnostics);
                }
            }
        }

        let lanes = batch::plan_lanes(rows);
        tracing::info!(
            rows = report.rows_skipped + lanes.iter().map(Vec::len).sum::<usize>(),
            skipped = report.rows_skipped,
            lanes = lanes.len(),
            workers = self.config.workers,
            "Batch started",
        );

        let shared = SharedIndex::new(index);
        let reconciler = Reconciler {
            store: &self.store,
            locks: &self.locks,
            index: &shared,
            sink,
            max_suffix_attempts: self.config.max_suffix_attempts,
        };
        for row_report in batch::run_lanes(&reconciler, lanes, self.config.workers).await {
            report.add_row(&row_report);
        }
        report.index = shared.into_inner();

        tracing::info!(
            rows = report.rows_total,
            succeeded = report.rows_succeeded,
            skipped = report.rows_skipped,
            failed = report.rows_failed,
            "Batch finished",
        );
        Ok(report)
    }

    /// Run the selected integrity checks. Read-only.
    pub async fn plan_repairs(&self, checks: &[RepairCheck]) -> Result<RepairPlan, ReconcileError> {
        let _gate = self.gate.read().await;
        auditor::plan(&self.store, checks).await
    }

    /// Apply a repair plan with exclusive access: no batch runs meanwhile.
    pub async fn apply_repairs(&self, plan: &RepairPlan) -> Result<RepairOutcome, ReconcileError> {
        let _gate = self.gate.write().await;
        tracing::info!(
            site_merges = plan.site_merges.len(),
            audi_merges = plan.audi_merges.len(),
            dangling_links = plan.dangling_links.len(),
            "Applying repair plan",
        );
        let outcome = auditor::apply(&self.store, plan).await?;
        tracing::info!(?outcome, "Repair plan applied");
        Ok(outcome)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
