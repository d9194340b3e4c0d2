//! Projector model (catalog) model.

use projtrack_core::matcher::{Identified, ModelIdentity};
use projtrack_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `projector_models` table.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ProjectorModel {
    pub id: DbId,
    pub model_no: String,
    pub manufacturer: Option<String>,
    pub specifications: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new projector model.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectorModel {
    pub model_no: String,
    pub manufacturer: Option<String>,
    pub specifications: Option<serde_json::Value>,
}

/// DTO for updating a projector model. `model_no` is the natural key and
/// cannot be changed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProjectorModel {
    pub manufacturer: Option<String>,
    pub specifications: Option<serde_json::Value>,
}

impl Identified for ProjectorModel {
    fn id(&self) -> DbId {
        self.id
    }
}

impl ModelIdentity for ProjectorModel {
    fn model_no(&self) -> &str {
        &self.model_no
    }
}
