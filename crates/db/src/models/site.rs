//! Site model.

use projtrack_core::matcher::{Identified, SiteIdentity};
use projtrack_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `sites` table. Names are free text and not unique.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Site {
    pub id: DbId,
    pub name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new site.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSite {
    pub name: String,
}

/// DTO for updating a site. All fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSite {
    pub name: Option<String>,
}

impl Identified for Site {
    fn id(&self) -> DbId {
        self.id
    }
}

impl SiteIdentity for Site {
    fn site_name(&self) -> &str {
        &self.name
    }
}
