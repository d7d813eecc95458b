use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{FoodId, FoodSummary};

/// Connection handle for the food database.
///
/// Built once by the process entry point and handed to whatever needs it; clones
/// share the same pool. Call [`Storage::close`] on shutdown.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to connect to '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run food migrations")?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn insert_food(&self, name: &str, description: Option<&str>) -> Result<FoodId> {
        let name = name.trim();
        if name.is_empty() {
            bail!("food name cannot be empty");
        }
        let description = description.map(str::trim).filter(|d| !d.is_empty());

        let rec = sqlx::query(
            "INSERT INTO foods (name, description) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET description = COALESCE(excluded.description, foods.description)
             RETURNING id",
        )
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert food '{name}'"))?;
        Ok(FoodId(rec.get::<i64, _>(0)))
    }

    pub async fn food(&self, food_id: FoodId) -> Result<Option<FoodSummary>> {
        let row = sqlx::query("SELECT id, name, description, created_at FROM foods WHERE id = ?")
            .bind(food_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| FoodSummary {
            food_id: FoodId(r.get::<i64, _>(0)),
            name: r.get::<String, _>(1),
            description: r.get::<Option<String>, _>(2),
            created_at: r.get::<DateTime<Utc>, _>(3),
        }))
    }

    pub async fn list_foods(&self) -> Result<Vec<FoodSummary>> {
        let rows = sqlx::query("SELECT id, name, description, created_at FROM foods ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("failed to list foods")?;
        Ok(rows
            .into_iter()
            .map(|r| FoodSummary {
                food_id: FoodId(r.get::<i64, _>(0)),
                name: r.get::<String, _>(1),
                description: r.get::<Option<String>, _>(2),
                created_at: r.get::<DateTime<Utc>, _>(3),
            })
            .collect())
    }

    /// Closes every pooled connection. Clones become unusable afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
