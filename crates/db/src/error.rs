//! Storage error type shared by every [`CanonicalStore`](crate::store::CanonicalStore)
//! implementation.

use projtrack_core::types::{DbId, EntityType};

/// PostgreSQL SQLSTATE for `unique_violation`.
const PG_UNIQUE_VIOLATION: &str = "23505";
/// PostgreSQL SQLSTATE for `foreign_key_violation`.
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A write collided with a unique index (`uq_*` constraint).
    #[error("Duplicate value violates unique constraint: {constraint}")]
    UniqueViolation { constraint: String },

    /// A write or delete would leave a dangling reference.
    #[error("Foreign key constraint violated: {constraint}")]
    ForeignKeyViolation { constraint: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: EntityType, id: DbId },

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn not_found(entity: EntityType, id: DbId) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }

    /// Name of the violated constraint, for unique and foreign key errors.
    pub fn constraint(&self) -> Option<&str> {
        match self {
            Self::UniqueViolation { constraint } | Self::ForeignKeyViolation { constraint } => {
                Some(constraint)
            }
            _ => None,
        }
    }
}

/// Classify a raw sqlx error.
///
/// - SQLSTATE 23505 on a `uq_` constraint becomes [`StoreError::UniqueViolation`].
/// - SQLSTATE 23503 becomes [`StoreError::ForeignKeyViolation`].
/// - Everything else is wrapped as [`StoreError::Database`].
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.code().as_deref() {
                Some(PG_UNIQUE_VIOLATION) if constraint.starts_with("uq_") => {
                    return Self::UniqueViolation { constraint };
                }
                Some(PG_FOREIGN_KEY_VIOLATION) => {
                    return Self::ForeignKeyViolation { constraint };
                }
                _ => {}
            }
        }
        Self::Database(err)
    }
}
