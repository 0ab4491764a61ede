//! # PostgreSQL Storage Module
//!
//! Catalog and selection storage backed by PostgreSQL through sqlx.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, error, info};

use crate::catalog::{normalize_meal_names, CatalogStore, Meal};
use crate::errors::{StorageError, StorageResult};
use crate::selection::{SelectOutcome, SelectionStore, WeeklySelection};
use crate::week::WeekInterval;

/// Open a connection pool whose acquire step is bounded by `timeout`
pub async fn connect(database_url: &str, max_connections: u32, timeout: Duration) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(timeout)
        .connect(database_url)
        .await
        .context("Failed to connect to database")
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS meals (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            synced_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create meals table")?;

    // meal_id carries no foreign key: a sync deletes every meal, and older
    // selections are allowed to outlive the generation they pointed into.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_meal_selections (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL,
            meal_id BIGINT NOT NULL,
            selected_date DATE NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT unique_user_meal_date UNIQUE (user_id, meal_id, selected_date)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create user_meal_selections table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_user_meal_selections_user_id ON user_meal_selections(user_id)",
    )
    .execute(pool)
    .await
    .context("Failed to create user_id index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_user_meal_selections_selected_date ON user_meal_selections(selected_date)",
    )
    .execute(pool)
    .await
    .context("Failed to create selected_date index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// Create the schema and wrap `pool` in a store. The pool is closed when the
/// schema cannot be created.
pub async fn open_store(pool: PgPool, timeout: Duration) -> Result<PostgresStore> {
    if let Err(e) = init_database_schema(&pool).await {
        error!(error = %e, "Schema initialization failed, closing database pool");
        pool.close().await;
        return Err(e);
    }
    Ok(PostgresStore::new(pool, timeout))
}

/// Catalog and selection store on a shared connection pool
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> StorageResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(operation, error = %e, "Database operation failed");
                Err(StorageError::Database(e))
            }
            Err(_) => {
                error!(operation, timeout_secs = self.timeout.as_secs(), "Database operation timed out");
                Err(StorageError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

impl CatalogStore for PostgresStore {
    async fn replace_all(&self, names: &[String], synced_at: DateTime<Utc>) -> StorageResult<usize> {
        let names = normalize_meal_names(names);
        let pool = &self.pool;

        let stored = self
            .bounded("replace_all", async {
                let mut tx = pool.begin().await?;

                let cleared = sqlx::query("DELETE FROM meals").execute(&mut *tx).await?;
                debug!(cleared = cleared.rows_affected(), "Cleared cached meals");

                let mut stored = 0usize;
                for name in &names {
                    let inserted = sqlx::query(
                        "INSERT INTO meals (name, synced_at) VALUES ($1, $2)
                         ON CONFLICT (name) DO NOTHING",
                    )
                    .bind(name)
                    .bind(synced_at)
                    .execute(&mut *tx)
                    .await?;
                    stored += inserted.rows_affected() as usize;
                }

                // Dropping the transaction on any error above rolls it back
                tx.commit().await?;
                Ok::<_, sqlx::Error>(stored)
            })
            .await?;

        info!(meals = stored, "Replaced meal catalog");
        Ok(stored)
    }

    async fn list(&self) -> StorageResult<Vec<Meal>> {
        self.bounded(
            "list_meals",
            sqlx::query_as::<_, Meal>("SELECT id, name, synced_at FROM meals ORDER BY id")
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn get(&self, meal_id: i64) -> StorageResult<Option<Meal>> {
        self.bounded(
            "get_meal",
            sqlx::query_as::<_, Meal>("SELECT id, name, synced_at FROM meals WHERE id = $1")
                .bind(meal_id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn is_empty(&self) -> StorageResult<bool> {
        let exists: bool = self
            .bounded(
                "meals_exist",
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM meals)").fetch_one(&self.pool),
            )
            .await?;
        Ok(!exists)
    }
}

impl SelectionStore for PostgresStore {
    async fn select(&self, user_id: i64, meal_id: i64, date: NaiveDate) -> StorageResult<SelectOutcome> {
        // The unique constraint decides concurrent attempts for the same triple
        let inserted = self
            .bounded(
                "select_meal",
                sqlx::query(
                    "INSERT INTO user_meal_selections (user_id, meal_id, selected_date, created_at)
                     VALUES ($1, $2, $3, NOW())
                     ON CONFLICT ON CONSTRAINT unique_user_meal_date DO NOTHING",
                )
                .bind(user_id)
                .bind(meal_id)
                .bind(date)
                .execute(&self.pool),
            )
            .await?;

        if inserted.rows_affected() > 0 {
            info!(user_id, meal_id, %date, "Meal selected");
            Ok(SelectOutcome::Selected)
        } else {
            info!(user_id, meal_id, %date, "Meal already selected");
            Ok(SelectOutcome::AlreadySelected)
        }
    }

    async fn weekly(&self, user_id: i64, week_start: NaiveDate) -> StorageResult<Vec<WeeklySelection>> {
        let week = WeekInterval::starting(week_start);
        self.bounded(
            "weekly_selections",
            sqlx::query_as::<_, WeeklySelection>(
                "SELECT m.name AS meal_name, s.selected_date
                 FROM user_meal_selections s
                 INNER JOIN meals m ON m.id = s.meal_id
                 WHERE s.user_id = $1 AND s.selected_date >= $2 AND s.selected_date < $3
                 ORDER BY s.selected_date, s.id",
            )
            .bind(user_id)
            .bind(week.start)
            .bind(week.end)
            .fetch_all(&self.pool),
        )
        .await
    }
}
