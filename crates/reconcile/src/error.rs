//! Engine error taxonomy.
//!
//! Every per-row failure maps to an [`ErrorKind`] so a batch can always be
//! summarized by counts. Only batch-level failures (the row source cannot
//! be opened, the auditor's store calls fail) are returned as `Err` from
//! the engine; per-row errors are recorded and the batch carries on.

use projtrack_core::error::CoreError;
use projtrack_core::types::{DbId, EntityType};
use projtrack_db::StoreError;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// A required field is missing or a value failed normalization.
    #[error("Validation failed for '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// The Matcher returned several candidates; nothing was written.
    #[error("Ambiguous {entity} match for '{key}': candidates {candidates:?}")]
    AmbiguousMatch {
        entity: EntityType,
        key: String,
        candidates: Vec<DbId>,
    },

    /// A related entity the row implies does not exist.
    #[error("Referential gap on {entity}: {reason}")]
    ReferentialGap { entity: EntityType, reason: String },

    /// A store call exceeded its time bound. The row is aborted and can be
    /// retried by re-running the batch.
    #[error("Store operation '{operation}' timed out after {timeout_ms} ms")]
    StoreTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// An engine guarantee could not be upheld (e.g. no free key could be
    /// committed within the retry bound).
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// The row source could not be read.
    #[error("Row source error: {0}")]
    Source(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn gap(entity: EntityType, reason: impl Into<String>) -> Self {
        Self::ReferentialGap {
            entity,
            reason: reason.into(),
        }
    }

    /// Attach the offending field to a normalization failure.
    pub fn from_field(field: &str, err: CoreError) -> Self {
        match err {
            CoreError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::validation(field, other.to_string()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            Self::ReferentialGap { .. } => ErrorKind::ReferentialGap,
            Self::StoreTimeout { .. } => ErrorKind::StoreTimeout,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::Source(_) => ErrorKind::Source,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// Whether this error aborts the rest of the row.
    ///
    /// Ambiguity and referential gaps only affect one stage; store
    /// failures, timeouts and invariant violations stop the row.
    pub fn aborts_row(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StoreTimeout | ErrorKind::InvariantViolation | ErrorKind::Store
        )
    }
}

impl From<CoreError> for ReconcileError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::validation("value", other.to_string()),
        }
    }
}

/// Error classes used for batch summary counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    AmbiguousMatch,
    ReferentialGap,
    StoreTimeout,
    InvariantViolation,
    Source,
    Store,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::AmbiguousMatch => "ambiguous_match",
            Self::ReferentialGap => "referential_gap",
            Self::StoreTimeout => "store_timeout",
            Self::InvariantViolation => "invariant_violation",
            Self::Source => "source",
            Self::Store => "store",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
