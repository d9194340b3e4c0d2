//! Service case model (DTR and RMA cases share one table).

use chrono::NaiveDate;
use projtrack_core::matcher::{CaseIdentity, Identified};
use projtrack_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `service_cases` table.
///
/// At least one of `call_log_number` / `rma_number` is set; both are unique
/// when present. `payload` carries source columns the engine does not
/// interpret.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ServiceCase {
    pub id: DbId,
    pub call_log_number: Option<String>,
    pub rma_number: Option<String>,
    pub serial_number: Option<String>,
    pub site_id: DbId,
    pub audi_id: Option<DbId>,
    pub case_type: Option<String>,
    pub status: Option<String>,
    pub reported_on: Option<NaiveDate>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new service case.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateServiceCase {
    pub call_log_number: Option<String>,
    pub rma_number: Option<String>,
    pub serial_number: Option<String>,
    pub site_id: DbId,
    pub audi_id: Option<DbId>,
    pub case_type: Option<String>,
    pub status: Option<String>,
    pub reported_on: Option<NaiveDate>,
    pub payload: Option<serde_json::Value>,
}

/// DTO for updating a service case. Natural keys cannot be changed.
///
/// `audi_id` follows the same doubly-optional convention as
/// [`UpdateAudi::projector_id`](super::audi::UpdateAudi::projector_id).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdateServiceCase {
    pub site_id: Option<DbId>,
    pub audi_id: Option<Option<DbId>>,
    pub status: Option<String>,
}

impl UpdateServiceCase {
    pub fn is_empty(&self) -> bool {
        self.site_id.is_none() && self.audi_id.is_none() && self.status.is_none()
    }
}

impl Identified for ServiceCase {
    fn id(&self) -> DbId {
        self.id
    }
}

impl CaseIdentity for ServiceCase {
    fn call_log_number(&self) -> Option<&str> {
        self.call_log_number.as_deref()
    }

    fn rma_number(&self) -> Option<&str> {
        self.rma_number.as_deref()
    }
}
