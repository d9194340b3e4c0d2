//! Audi (auditorium) model.

use projtrack_core::matcher::{AudiIdentity, Identified};
use projtrack_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `audis` table. `audi_no` is unique only within its site
/// and only by convention; duplicates are merged by the integrity auditor.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Audi {
    pub id: DbId,
    pub audi_no: String,
    pub site_id: DbId,
    pub projector_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new audi.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAudi {
    pub audi_no: String,
    pub site_id: DbId,
    pub projector_id: Option<DbId>,
}

/// DTO for updating an audi.
///
/// `projector_id` is doubly optional: `None` leaves the link alone,
/// `Some(None)` clears it, `Some(Some(id))` re-points it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdateAudi {
    pub site_id: Option<DbId>,
    pub projector_id: Option<Option<DbId>>,
}

impl UpdateAudi {
    pub fn relink(projector_id: DbId) -> Self {
        Self {
            projector_id: Some(Some(projector_id)),
            ..Self::default()
        }
    }

    pub fn unlink() -> Self {
        Self {
            projector_id: Some(None),
            ..Self::default()
        }
    }

    pub fn move_to_site(site_id: DbId) -> Self {
        Self {
            site_id: Some(site_id),
            ..Self::default()
        }
    }
}

impl Identified for Audi {
    fn id(&self) -> DbId {
        self.id
    }
}

impl AudiIdentity for Audi {
    fn site_id(&self) -> DbId {
        self.site_id
    }

    fn audi_no(&self) -> &str {
        &self.audi_no
    }

    fn projector_id(&self) -> Option<DbId> {
        self.projector_id
    }
}
