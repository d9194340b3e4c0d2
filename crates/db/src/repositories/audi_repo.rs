//! Repository for the `audis` table.

use projtrack_core::types::DbId;
use sqlx::PgPool;

use crate::models::audi::{Audi, CreateAudi, UpdateAudi};
use crate::store::AudiFilter;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, audi_no, site_id, projector_id, created_at, updated_at";

/// Provides CRUD operations for audis.
pub struct AudiRepo;

impl AudiRepo {
    /// Insert a new audi, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateAudi) -> Result<Audi, sqlx::Error> {
        let query = format!(
            "INSERT INTO audis (audi_no, site_id, projector_id)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Audi>(&query)
            .bind(&input.audi_no)
            .bind(input.site_id)
            .bind(input.projector_id)
            .fetch_one(pool)
            .await
    }

    /// Find an audi by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Audi>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM audis WHERE id = $1");
        sqlx::query_as::<_, Audi>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List audis matching the filter, ordered by ID.
    pub async fn list(pool: &PgPool, filter: &AudiFilter) -> Result<Vec<Audi>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audis
             WHERE ($1::BIGINT IS NULL OR site_id = $1)
               AND ($2::TEXT IS NULL OR lower(audi_no) = lower($2))
               AND ($3::BIGINT IS NULL OR projector_id = $3)
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, Audi>(&query)
            .bind(filter.site_id)
            .bind(&filter.audi_no)
            .bind(filter.projector_id)
            .fetch_all(pool)
            .await
    }

    /// Update an audi.
    ///
    /// `site_id` is applied when set. `projector_id` is only touched when
    /// the outer option is `Some`, which allows clearing the link.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateAudi,
    ) -> Result<Option<Audi>, sqlx::Error> {
        let query = format!(
            "UPDATE audis SET
                site_id = COALESCE($2, site_id),
                projector_id = CASE WHEN $3 THEN $4 ELSE projector_id END,
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Audi>(&query)
            .bind(id)
            .bind(input.site_id)
            .bind(input.projector_id.is_some())
            .bind(input.projector_id.flatten())
            .fetch_optional(pool)
            .await
    }

    /// Delete an audi by ID. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM audis WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
