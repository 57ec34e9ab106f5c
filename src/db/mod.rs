pub mod counters;
mod models;
pub mod slugs;

pub use models::*;

use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Sqlite, SqlitePool, Transaction,
};
use std::str::FromStr;
use tracing::info;

use crate::config::DatabaseConfig;

pub type DbPool = SqlitePool;

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    // Comments go first so a `;` inside one never splits a statement.
    let cleaned: String = sql
        .lines()
        .filter(|line| !line.trim().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    for statement in cleaned.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

/// Open the pool described by `config` and bring the schema up to date.
///
/// The returned pool is the only storage handle in the process; callers pass
/// it down explicitly (see `AppState`).
pub async fn init(config: &DatabaseConfig) -> Result<DbPool> {
    let pool = connect(&config.url, config.max_connections).await?;
    run_migrations(&pool).await?;
    info!("Database initialized successfully");
    Ok(pool)
}

/// Connect without running migrations
pub async fn connect(url: &str, max_connections: u32) -> Result<DbPool> {
    info!("Connecting to database at {}", url);

    let in_memory = url.contains(":memory:");
    let mut options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("Invalid database url: {}", url))?
        .create_if_missing(true)
        .foreign_keys(true);
    if !in_memory {
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }
        options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
    }

    let mut pool_options = SqlitePoolOptions::new();
    if in_memory {
        // Every connection to :memory: is a separate database; keep exactly one alive.
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    } else {
        pool_options = pool_options.max_connections(max_connections);
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database at {}", url))?;

    Ok(pool)
}

async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let found: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: Users
    if !table_exists(pool, "users").await? {
        execute_sql(pool, include_str!("../../migrations/001_users.sql")).await?;
    }

    // Migration 002: Courses
    if !table_exists(pool, "courses").await? {
        execute_sql(pool, include_str!("../../migrations/002_courses.sql")).await?;
    }

    // Migration 003: Lessons
    if !table_exists(pool, "lessons").await? {
        execute_sql(pool, include_str!("../../migrations/003_lessons.sql")).await?;
    }

    info!("Migrations completed");
    Ok(())
}

/// Open a transaction that takes the write lock up front.
///
/// A deferred transaction that reads and then writes fails with SQLITE_BUSY
/// when another connection committed in between; `BEGIN IMMEDIATE` instead
/// waits for the lock under the connection's busy timeout.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

/// True when `err` is SQLITE_BUSY or one of its extended codes
pub fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let primary = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            primary == Some(5) || db_err.message().contains("database is locked")
        }
        _ => false,
    }
}

/// True when `err` is a UNIQUE constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || db_err.message().contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}

/// Single-connection in-memory pool with the schema applied, for tests.
#[cfg(test)]
pub async fn test_pool() -> DbPool {
    let pool = connect("sqlite::memory:", 1).await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}
