//! Repository for the `projectors` table.

use projtrack_core::types::DbId;
use sqlx::PgPool;

use crate::models::projector::{CreateProjector, Projector, UpdateProjector};
use crate::store::ProjectorFilter;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, serial_number, projector_model_id, status, created_at, updated_at";

/// Provides CRUD operations for projectors.
pub struct ProjectorRepo;

impl ProjectorRepo {
    /// Insert a new projector, returning the created row.
    ///
    /// Fails with a `uq_projectors_serial_number` violation if the serial
    /// is already registered.
    pub async fn create(pool: &PgPool, input: &CreateProjector) -> Result<Projector, sqlx::Error> {
        let query = format!(
            "INSERT INTO projectors (serial_number, projector_model_id, status)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Projector>(&query)
            .bind(&input.serial_number)
            .bind(input.projector_model_id)
            .bind(&input.status)
            .fetch_one(pool)
            .await
    }

    /// Find a projector by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Projector>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projectors WHERE id = $1");
        sqlx::query_as::<_, Projector>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a projector by serial number (case-insensitive).
    pub async fn find_by_serial(
        pool: &PgPool,
        serial_number: &str,
    ) -> Result<Option<Projector>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM projectors
             WHERE lower(serial_number) = lower($1)
             ORDER BY id ASC
             LIMIT 1"
        );
        sqlx::query_as::<_, Projector>(&query)
            .bind(serial_number)
            .fetch_optional(pool)
            .await
    }

    /// List projectors matching the filter, ordered by ID.
    pub async fn list(
        pool: &PgPool,
        filter: &ProjectorFilter,
    ) -> Result<Vec<Projector>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM projectors
             WHERE ($1::TEXT IS NULL OR lower(serial_number) = lower($1))
               AND ($2::BIGINT IS NULL OR projector_model_id = $2)
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, Projector>(&query)
            .bind(&filter.serial_number)
            .bind(filter.projector_model_id)
            .fetch_all(pool)
            .await
    }

    /// Update a projector. Only non-`None` fields are applied.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateProjector,
    ) -> Result<Option<Projector>, sqlx::Error> {
        let query = format!(
            "UPDATE projectors SET
                projector_model_id = COALESCE($2, projector_model_id),
                status = COALESCE($3, status),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Projector>(&query)
            .bind(id)
            .bind(input.projector_model_id)
            .bind(&input.status)
            .fetch_optional(pool)
            .await
    }

    /// Delete a projector by ID. Audis pointing at it are unlinked by the
    /// `ON DELETE SET NULL` foreign key. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projectors WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
