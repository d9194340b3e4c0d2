//! Structured per-row diagnostics.
//!
//! The engine reports what it did to every entity of every row through a
//! [`DiagnosticsSink`]. Sinks are for external reporting; the engine never
//! reads them back.

use std::sync::{Mutex, PoisonError};

use projtrack_core::types::{DbId, EntityType};
use serde::Serialize;

use crate::error::{ErrorKind, ReconcileError};

/// What happened to one entity of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Updated,
    /// Matched an existing entity that needed no change.
    Matched,
    /// Not processed: validation failure or an unresolved dependency.
    Skipped,
    Ambiguous,
    /// Case written but its projector/audi relationship could not be
    /// resolved.
    Orphaned,
    /// Row aborted by a store failure, timeout or invariant violation.
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Matched => "matched",
            Self::Skipped => "skipped",
            Self::Ambiguous => "ambiguous",
            Self::Orphaned => "orphaned",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub row_index: usize,
    /// `None` for row-level records (validation of the row as a whole).
    pub entity_type: Option<EntityType>,
    pub outcome: Outcome,
    pub entity_id: Option<DbId>,
    pub error_kind: Option<ErrorKind>,
    pub reason: Option<String>,
}

impl Diagnostic {
    pub fn new(row_index: usize, entity_type: EntityType, outcome: Outcome) -> Self {
        Self {
            row_index,
            entity_type: Some(entity_type),
            outcome,
            entity_id: None,
            error_kind: None,
            reason: None,
        }
    }

    /// Record for an error, with the outcome implied by its kind.
    pub fn from_error(
        row_index: usize,
        entity_type: Option<EntityType>,
        err: &ReconcileError,
    ) -> Self {
        let outcome = match err.kind() {
            ErrorKind::Validation | ErrorKind::Source => Outcome::Skipped,
            ErrorKind::AmbiguousMatch => Outcome::Ambiguous,
            ErrorKind::ReferentialGap => Outcome::Orphaned,
            ErrorKind::StoreTimeout | ErrorKind::InvariantViolation | ErrorKind::Store => {
                Outcome::Failed
            }
        };
        Self {
            row_index,
            entity_type,
            outcome,
            entity_id: None,
            error_kind: Some(err.kind()),
            reason: Some(err.to_string()),
        }
    }

    pub fn with_id(mut self, id: DbId) -> Self {
        self.entity_id = Some(id);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }
}

/// Receiver of diagnostics. Must tolerate concurrent calls from lanes.
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, diagnostic: &Diagnostic);
}

/// Collects diagnostics in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, in arrival order.
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records for one row, in arrival order.
    pub fn for_row(&self, row_index: usize) -> Vec<Diagnostic> {
        self.records()
            .into_iter()
            .filter(|d| d.row_index == row_index)
            .collect()
    }
}

impl DiagnosticsSink for MemorySink {
    fn record(&self, diagnostic: &Diagnostic) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic.clone());
    }
}

/// Forwards diagnostics to `tracing`, at a level chosen by outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn record(&self, d: &Diagnostic) {
        let entity = d.entity_type.map(|e| e.as_str()).unwrap_or("row");
        let reason = d.reason.as_deref().unwrap_or("");
        match d.outcome {
            Outcome::Created | Outcome::Updated | Outcome::Matched => tracing::debug!(
                row_index = d.row_index,
                entity,
                outcome = %d.outcome,
                entity_id = ?d.entity_id,
                "Row reconciled",
            ),
            Outcome::Skipped | Outcome::Ambiguous | Outcome::Orphaned => tracing::warn!(
                row_index = d.row_index,
                entity,
                outcome = %d.outcome,
                entity_id = ?d.entity_id,
                reason,
                "Row needs review",
            ),
            Outcome::Failed => tracing::error!(
                row_index = d.row_index,
                entity,
                error_kind = ?d.error_kind,
                reason,
                "Row failed",
            ),
        }
    }
}
