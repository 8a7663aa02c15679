//! Conversation store
//!
//! SQLite-backed persistence for projects and their conversation logs.

pub mod projects;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Initialize database connection pool
///
/// Accepts any sqlx SQLite URL (`sqlite://path?mode=rwc`, `sqlite::memory:`).
/// Parent directories of file databases are created on demand.
pub async fn init_database_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("Invalid database URL: {}", database_url))?;

    let db_path = options.get_filename().to_path_buf();
    if !database_url.contains(":memory:") {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    tracing::debug!("Connecting to database: {}", database_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(
            options
                .create_if_missing(true)
                .foreign_keys(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(BUSY_TIMEOUT),
        )
        .await
        .context("Failed to open database")?;

    init_tables(&pool).await?;

    tracing::info!("Database ready: {}", db_path.display());
    Ok(pool)
}

/// Single-connection in-memory pool with the schema applied
///
/// One connection only: every new in-memory connection is a separate database.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// Create tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            current_phase TEXT NOT NULL,
            requirements TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // seq is the log order; AUTOINCREMENT keeps it monotonic across deletes
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversation_entries (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            content TEXT NOT NULL,
            data TEXT,
            timestamp TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_entries_project ON conversation_entries(project_id, seq)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_projects_updated ON projects(updated_at)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (projects, conversation_entries)");

    Ok(())
}
