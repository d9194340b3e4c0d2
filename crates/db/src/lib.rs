//! `projtrack-db`: canonical store access.
//!
//! - [`models`]: row structs and create/update DTOs for the five canonical
//!   entity tables.
//! - [`repositories`]: zero-sized repositories with async sqlx queries that
//!   take `&PgPool` as the first argument.
//! - [`store`]: the [`CanonicalStore`](store::CanonicalStore) trait the
//!   reconciliation engine is written against, with a Postgres
//!   implementation ([`PgStore`](pg_store::PgStore)) and an in-memory one
//!   ([`MemoryStore`](memory::MemoryStore)).

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod memory;
pub mod models;
pub mod pg_store;
pub mod repositories;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use pg_store::PgStore;
pub use store::CanonicalStore;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
}

/// Verify the pool can reach the database.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .map(|_| ())
}

/// Apply all pending migrations from `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
