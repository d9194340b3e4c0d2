use serde::{Deserialize, Serialize};

/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// The canonical entity kinds, listed in reconciliation dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Site,
    ProjectorModel,
    Projector,
    Audi,
    Case,
}

impl EntityType {
    /// Processing order for a single row.
    pub const ORDER: [EntityType; 5] = [
        Self::Site,
        Self::ProjectorModel,
        Self::Projector,
        Self::Audi,
        Self::Case,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::ProjectorModel => "projector_model",
            Self::Projector => "projector",
            Self::Audi => "audi",
            Self::Case => "case",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
