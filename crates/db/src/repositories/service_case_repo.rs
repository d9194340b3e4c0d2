//! Repository for the `service_cases` table.

use projtrack_core::matcher::CaseKeyField;
use projtrack_core::types::DbId;
use sqlx::PgPool;

use crate::models::service_case::{CreateServiceCase, ServiceCase, UpdateServiceCase};
use crate::store::CaseFilter;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, call_log_number, rma_number, serial_number, site_id, audi_id, \
    case_type, status, reported_on, payload, created_at, updated_at";

/// Provides CRUD operations for service cases.
pub struct ServiceCaseRepo;

impl ServiceCaseRepo {
    /// Insert a new case, returning the created row.
    ///
    /// Fails with `uq_cases_call_log_number` / `uq_cases_rma_number` if a
    /// natural key is already taken. Callers pick a free key first.
    pub async fn create(
        pool: &PgPool,
        input: &CreateServiceCase,
    ) -> Result<ServiceCase, sqlx::Error> {
        let payload = input
            .payload
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        let query = format!(
            "INSERT INTO service_cases
                (call_log_number, rma_number, serial_number, site_id, audi_id,
                 case_type, status, reported_on, payload)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ServiceCase>(&query)
            .bind(&input.call_log_number)
            .bind(&input.rma_number)
            .bind(&input.serial_number)
            .bind(input.site_id)
            .bind(input.audi_id)
            .bind(&input.case_type)
            .bind(&input.status)
            .bind(input.reported_on)
            .bind(&payload)
            .fetch_one(pool)
            .await
    }

    /// Find a case by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ServiceCase>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM service_cases WHERE id = $1");
        sqlx::query_as::<_, ServiceCase>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a case by the exact value of one natural key.
    pub async fn find_by_key(
        pool: &PgPool,
        field: CaseKeyField,
        key: &str,
    ) -> Result<Option<ServiceCase>, sqlx::Error> {
        // Column name comes from a closed enum, never from input.
        let query = format!(
            "SELECT {COLUMNS} FROM service_cases WHERE {} = $1",
            field.as_str()
        );
        sqlx::query_as::<_, ServiceCase>(&query)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// List cases matching the filter, ordered by ID.
    ///
    /// Key family filters select the bare key and every `key-N` variant;
    /// `starts_with` keeps wildcard characters in keys literal.
    pub async fn list(pool: &PgPool, filter: &CaseFilter) -> Result<Vec<ServiceCase>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM service_cases
             WHERE ($1::TEXT IS NULL
                    OR call_log_number = $1
                    OR starts_with(call_log_number, $1 || '-'))
               AND ($2::TEXT IS NULL
                    OR rma_number = $2
                    OR starts_with(rma_number, $2 || '-'))
               AND ($3::TEXT IS NULL OR lower(serial_number) = lower($3))
               AND ($4::BIGINT IS NULL OR site_id = $4)
               AND ($5::BIGINT IS NULL OR audi_id = $5)
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, ServiceCase>(&query)
            .bind(&filter.call_log_family)
            .bind(&filter.rma_family)
            .bind(&filter.serial_number)
            .bind(filter.site_id)
            .bind(filter.audi_id)
            .fetch_all(pool)
            .await
    }

    /// Update a case. `audi_id` is only touched when the outer option is
    /// `Some`, which allows clearing the link.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateServiceCase,
    ) -> Result<Option<ServiceCase>, sqlx::Error> {
        let query = format!(
            "UPDATE service_cases SET
                site_id = COALESCE($2, site_id),
                audi_id = CASE WHEN $3 THEN $4 ELSE audi_id END,
                status = COALESCE($5, status),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ServiceCase>(&query)
            .bind(id)
            .bind(input.site_id)
            .bind(input.audi_id.is_some())
            .bind(input.audi_id.flatten())
            .bind(&input.status)
            .fetch_optional(pool)
            .await
    }

    /// Delete a case by ID. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM service_cases WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
