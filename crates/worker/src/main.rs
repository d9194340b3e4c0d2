use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use projtrack_db::{CanonicalStore, MemoryStore, PgStore};
use projtrack_reconcile::{
    DisambiguationIndex, Engine, JsonLinesSource, ReconcileConfig, RepairCheck, TracingSink,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default pool size when `DB_MAX_CONNECTIONS` is unset.
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Exit status when some rows were aborted and the batch should be re-run.
const EXIT_ROWS_FAILED: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "projtrack-worker", version, about = "Projector fleet reconciliation worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile a JSON-lines file of source rows into the canonical store.
    Reconcile {
        /// One JSON object per line, keys are the sheet's column headers.
        rows: PathBuf,

        /// Lanes reconciled concurrently (overrides RECON_WORKERS).
        #[arg(long)]
        workers: Option<usize>,

        /// Continue a run: start from the index a previous batch wrote.
        #[arg(long)]
        index_in: Option<PathBuf>,

        /// Write the batch's disambiguation index here.
        #[arg(long)]
        index_out: Option<PathBuf>,

        /// Reconcile into an empty in-memory store; nothing is persisted.
        #[arg(long)]
        dry_run: bool,
    },

    /// Run integrity checks and print the repair plan.
    Audit {
        /// Check to run; repeatable. Defaults to every check.
        #[arg(long = "check")]
        checks: Vec<RepairCheck>,

        /// Apply the plan's merges and link repairs.
        #[arg(long)]
        apply: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = ReconcileConfig::from_env().context("Invalid reconciliation settings")?;

    match cli.command {
        Command::Reconcile {
            rows,
            workers,
            index_in,
            index_out,
            dry_run,
        } => {
            if let Some(workers) = workers {
                config.workers = workers;
            }
            let store: Arc<dyn CanonicalStore> = if dry_run {
                tracing::info!("Dry run: reconciling into an in-memory store");
                Arc::new(MemoryStore::new())
            } else {
                connect().await?
            };
            let engine = Engine::new(store, config)?;

            let index = match index_in {
                Some(path) => read_index(&path)?,
                None => DisambiguationIndex::new(),
            };
            let source = JsonLinesSource::new(&rows);
            let report = engine
                .reconcile_batch(&source, index, &TracingSink)
                .await
                .with_context(|| format!("Failed to reconcile {}", rows.display()))?;

            if let Some(path) = index_out {
                let json = serde_json::to_string_pretty(&report.index)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            println!("{}", serde_json::to_string_pretty(&report)?);

            if report.rows_failed > 0 {
                tracing::warn!(
                    failed = report.rows_failed,
                    "Some rows failed; re-run the batch to retry them",
                );
                std::process::exit(EXIT_ROWS_FAILED);
            }
        }
        Command::Audit { checks, apply } => {
            let checks = if checks.is_empty() {
                RepairCheck::ALL.to_vec()
            } else {
                checks
            };
            let engine = Engine::new(connect().await?, config)?;

            let plan = engine.plan_repairs(&checks).await?;
            let outcome = if apply && plan.has_actions() {
                Some(engine.apply_repairs(&plan).await?)
            } else {
                None
            };
            let output = serde_json::json!({ "plan": plan, "outcome": outcome });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "projtrack_worker=debug,projtrack_reconcile=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn connect() -> anyhow::Result<Arc<dyn CanonicalStore>> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let max_connections = match std::env::var("DB_MAX_CONNECTIONS") {
        Ok(raw) => raw
            .parse()
            .context("DB_MAX_CONNECTIONS must be a positive integer")?,
        Err(_) => DEFAULT_MAX_CONNECTIONS,
    };

    let pool = projtrack_db::create_pool(&database_url, max_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    projtrack_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    projtrack_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(Arc::new(PgStore::new(pool)))
}

fn read_index(path: &Path) -> anyhow::Result<DisambiguationIndex> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid index file {}", path.display()))
}
