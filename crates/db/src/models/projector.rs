//! Projector model.

use projtrack_core::matcher::{Identified, ProjectorIdentity};
use projtrack_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `projectors` table. `serial_number` is globally unique.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Projector {
    pub id: DbId,
    pub serial_number: String,
    pub projector_model_id: DbId,
    pub status: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new projector.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjector {
    pub serial_number: String,
    pub projector_model_id: DbId,
    pub status: Option<String>,
}

/// DTO for updating a projector. All fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdateProjector {
    pub projector_model_id: Option<DbId>,
    pub status: Option<String>,
}

impl UpdateProjector {
    pub fn is_empty(&self) -> bool {
        self.projector_model_id.is_none() && self.status.is_none()
    }
}

impl Identified for Projector {
    fn id(&self) -> DbId {
        self.id
    }
}

impl ProjectorIdentity for Projector {
    fn serial_number(&self) -> &str {
        &self.serial_number
    }
}
