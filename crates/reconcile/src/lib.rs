//! `projtrack-reconcile`: the identity resolution and reconciliation engine.
//!
//! - [`source`]: row sources (restartable, ordered sequences of raw rows).
//! - [`row`]: header aliasing and up-front row validation.
//! - [`reconciler`]: the per-row Site → ProjectorModel → Projector → Audi →
//!   Case state machine.
//! - [`disambiguator`]: collision-free case key assignment and the
//!   per-run [`DisambiguationIndex`](disambiguator::DisambiguationIndex).
//! - [`batch`]: lane scheduling and the batch summary.
//! - [`auditor`]: post-hoc integrity checks and repair plans.
//! - [`engine`]: the entry point tying these to a store.

pub mod auditor;
pub mod batch;
pub mod config;
pub mod diagnostics;
pub mod disambiguator;
pub mod engine;
pub mod error;
pub mod locks;
pub mod reconciler;
pub mod row;
pub mod source;
pub mod timed;

pub use auditor::{RepairCheck, RepairOutcome, RepairPlan};
pub use batch::BatchReport;
pub use config::ReconcileConfig;
pub use diagnostics::{Diagnostic, DiagnosticsSink, MemorySink, Outcome, TracingSink};
pub use disambiguator::DisambiguationIndex;
pub use engine::Engine;
pub use error::{ErrorKind, ReconcileError};
pub use source::{JsonLinesSource, RawRow, RowSource, VecSource};
