//! Repository for the `projector_models` table.

use projtrack_core::types::DbId;
use sqlx::PgPool;

use crate::models::projector_model::{CreateProjectorModel, ProjectorModel, UpdateProjectorModel};
use crate::store::ProjectorModelFilter;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, model_no, manufacturer, specifications, created_at, updated_at";

/// Provides CRUD operations for projector models.
pub struct ProjectorModelRepo;

impl ProjectorModelRepo {
    /// Insert a new projector model, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateProjectorModel,
    ) -> Result<ProjectorModel, sqlx::Error> {
        let query = format!(
            "INSERT INTO projector_models (model_no, manufacturer, specifications)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProjectorModel>(&query)
            .bind(&input.model_no)
            .bind(&input.manufacturer)
            .bind(&input.specifications)
            .fetch_one(pool)
            .await
    }

    /// Find a projector model by its internal ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ProjectorModel>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projector_models WHERE id = $1");
        sqlx::query_as::<_, ProjectorModel>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a projector model by its model number (case-insensitive).
    pub async fn find_by_model_no(
        pool: &PgPool,
        model_no: &str,
    ) -> Result<Option<ProjectorModel>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM projector_models
             WHERE lower(model_no) = lower($1)
             ORDER BY id ASC
             LIMIT 1"
        );
        sqlx::query_as::<_, ProjectorModel>(&query)
            .bind(model_no)
            .fetch_optional(pool)
            .await
    }

    /// List projector models matching the filter, ordered by ID.
    pub async fn list(
        pool: &PgPool,
        filter: &ProjectorModelFilter,
    ) -> Result<Vec<ProjectorModel>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM projector_models
             WHERE ($1::TEXT IS NULL OR lower(manufacturer) = lower($1))
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, ProjectorModel>(&query)
            .bind(&filter.manufacturer)
            .fetch_all(pool)
            .await
    }

    /// Update a projector model. Only non-`None` fields are applied.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateProjectorModel,
    ) -> Result<Option<ProjectorModel>, sqlx::Error> {
        let query = format!(
            "UPDATE projector_models SET
                manufacturer = COALESCE($2, manufacturer),
                specifications = COALESCE($3, specifications),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProjectorModel>(&query)
            .bind(id)
            .bind(&input.manufacturer)
            .bind(&input.specifications)
            .fetch_optional(pool)
            .await
    }

    /// Delete a projector model by ID. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projector_models WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
