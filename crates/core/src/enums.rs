//! Enum-like field domains (case type, case status, projector status).
//!
//! Source sheets spell these values many ways. Each domain has a fixed list
//! of canonical values plus an explicit synonym table keyed by
//! [`enum_key`](crate::normalize::enum_key). Anything else is rejected.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::normalize::{enum_key, is_placeholder};

// ---------------------------------------------------------------------------
// Case type
// ---------------------------------------------------------------------------

pub const CASE_TYPE_DTR: &str = "DTR";
pub const CASE_TYPE_RMA: &str = "RMA";
pub const CASE_TYPE_RMA_CL: &str = "RMA_CL";
pub const VALID_CASE_TYPES: &[&str] = &[CASE_TYPE_DTR, CASE_TYPE_RMA, CASE_TYPE_RMA_CL];

const CASE_TYPE_SYNONYMS: &[(&str, &str)] = &[
    ("rma_ci", CASE_TYPE_RMA_CL),
    ("rma-cl", CASE_TYPE_RMA_CL),
    ("rma_claim", CASE_TYPE_RMA_CL),
    ("dtr_call", CASE_TYPE_DTR),
    ("service_call", CASE_TYPE_DTR),
];

// ---------------------------------------------------------------------------
// Case status
// ---------------------------------------------------------------------------

pub const CASE_STATUS_OPEN: &str = "open";
pub const CASE_STATUS_IN_PROGRESS: &str = "in_progress";
pub const CASE_STATUS_FAULTY_IN_TRANSIT: &str = "faulty_in_transit_to_cds";
pub const CASE_STATUS_UNDER_REPAIR: &str = "under_repair";
pub const CASE_STATUS_REPLACEMENT_SHIPPED: &str = "replacement_shipped";
pub const CASE_STATUS_REPLACEMENT_RECEIVED: &str = "replacement_received";
pub const CASE_STATUS_CLOSED: &str = "closed";
pub const CASE_STATUS_CANCELLED: &str = "cancelled";
pub const VALID_CASE_STATUSES: &[&str] = &[
    CASE_STATUS_OPEN,
    CASE_STATUS_IN_PROGRESS,
    CASE_STATUS_FAULTY_IN_TRANSIT,
    CASE_STATUS_UNDER_REPAIR,
    CASE_STATUS_REPLACEMENT_SHIPPED,
    CASE_STATUS_REPLACEMENT_RECEIVED,
    CASE_STATUS_CLOSED,
    CASE_STATUS_CANCELLED,
];

const CASE_STATUS_SYNONYMS: &[(&str, &str)] = &[
    ("faulty_in_transit_to_ascomp", CASE_STATUS_FAULTY_IN_TRANSIT),
    ("in_transit_to_cds", CASE_STATUS_FAULTY_IN_TRANSIT),
    ("under_process", CASE_STATUS_IN_PROGRESS),
    ("wip", CASE_STATUS_IN_PROGRESS),
    ("shipped", CASE_STATUS_REPLACEMENT_SHIPPED),
    ("received", CASE_STATUS_REPLACEMENT_RECEIVED),
    ("completed", CASE_STATUS_CLOSED),
    ("resolved", CASE_STATUS_CLOSED),
    ("canceled", CASE_STATUS_CANCELLED),
];

// ---------------------------------------------------------------------------
// Projector status
// ---------------------------------------------------------------------------

pub const PROJECTOR_STATUS_ACTIVE: &str = "active";
pub const PROJECTOR_STATUS_UNDER_SERVICE: &str = "under_service";
pub const PROJECTOR_STATUS_NEEDS_REPAIR: &str = "needs_repair";
pub const PROJECTOR_STATUS_INACTIVE: &str = "inactive";
pub const PROJECTOR_STATUS_DECOMMISSIONED: &str = "decommissioned";
pub const VALID_PROJECTOR_STATUSES: &[&str] = &[
    PROJECTOR_STATUS_ACTIVE,
    PROJECTOR_STATUS_UNDER_SERVICE,
    PROJECTOR_STATUS_NEEDS_REPAIR,
    PROJECTOR_STATUS_INACTIVE,
    PROJECTOR_STATUS_DECOMMISSIONED,
];

const PROJECTOR_STATUS_SYNONYMS: &[(&str, &str)] = &[
    ("working", PROJECTOR_STATUS_ACTIVE),
    ("in_service", PROJECTOR_STATUS_UNDER_SERVICE),
    ("not_working", PROJECTOR_STATUS_NEEDS_REPAIR),
    ("faulty", PROJECTOR_STATUS_NEEDS_REPAIR),
    ("scrapped", PROJECTOR_STATUS_DECOMMISSIONED),
];

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

/// Which enum-like field a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumDomain {
    CaseType,
    CaseStatus,
    ProjectorStatus,
}

impl EnumDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CaseType => "case type",
            Self::CaseStatus => "case status",
            Self::ProjectorStatus => "projector status",
        }
    }

    /// The canonical values of this domain.
    pub fn values(&self) -> &'static [&'static str] {
        match self {
            Self::CaseType => VALID_CASE_TYPES,
            Self::CaseStatus => VALID_CASE_STATUSES,
            Self::ProjectorStatus => VALID_PROJECTOR_STATUSES,
        }
    }

    fn synonyms(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::CaseType => CASE_TYPE_SYNONYMS,
            Self::CaseStatus => CASE_STATUS_SYNONYMS,
            Self::ProjectorStatus => PROJECTOR_STATUS_SYNONYMS,
        }
    }
}

impl std::fmt::Display for EnumDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a raw enum-like value to its canonical spelling.
///
/// Lookup order: synonym table, then exact (case-insensitive) match against
/// the canonical values. Placeholders yield `Ok(None)`.
pub fn normalize_enum(domain: EnumDomain, raw: &str) -> Result<Option<&'static str>, CoreError> {
    if is_placeholder(raw) {
        return Ok(None);
    }
    let key = enum_key(raw);

    if let Some((_, canonical)) = domain.synonyms().iter().find(|(syn, _)| *syn == key) {
        return Ok(Some(*canonical));
    }
    if let Some(canonical) = domain
        .values()
        .iter()
        .find(|v| v.eq_ignore_ascii_case(&key))
    {
        return Ok(Some(*canonical));
    }

    Err(CoreError::UnknownEnumValue {
        domain: domain.as_str(),
        value: raw.trim().to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
