//! Repository for the `sites` table.

use projtrack_core::site_names::site_match_key;
use projtrack_core::types::DbId;
use sqlx::PgPool;

use crate::models::site::{CreateSite, Site, UpdateSite};
use crate::store::SiteFilter;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, name, created_at, updated_at";

/// Provides CRUD operations for sites.
pub struct SiteRepo;

impl SiteRepo {
    /// Insert a new site, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateSite) -> Result<Site, sqlx::Error> {
        let query = format!("INSERT INTO sites (name) VALUES ($1) RETURNING {COLUMNS}");
        sqlx::query_as::<_, Site>(&query)
            .bind(&input.name)
            .fetch_one(pool)
            .await
    }

    /// Find a site by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Site>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sites WHERE id = $1");
        sqlx::query_as::<_, Site>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List sites matching the filter, ordered by ID.
    ///
    /// The name comparison mirrors `site_match_key`: trimmed, runs of
    /// whitespace collapsed to one space, lowercased.
    pub async fn list(pool: &PgPool, filter: &SiteFilter) -> Result<Vec<Site>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sites
             WHERE ($1::TEXT IS NULL
                    OR lower(regexp_replace(btrim(name), '\\s+', ' ', 'g')) = $1)
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, Site>(&query)
            .bind(filter.name.as_deref().map(site_match_key))
            .fetch_all(pool)
            .await
    }

    /// Update a site. Only non-`None` fields are applied.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateSite,
    ) -> Result<Option<Site>, sqlx::Error> {
        let query = format!(
            "UPDATE sites SET
                name = COALESCE($2, name),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Site>(&query)
            .bind(id)
            .bind(&input.name)
            .fetch_optional(pool)
            .await
    }

    /// Delete a site by ID. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sites WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
