use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    str::FromStr,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use tokio::sync::Mutex;
use tracing::warn;

/// Namespaced key-value persistence for client wizard state: one JSON
/// payload per namespace key, last write wins. This is the durable
/// stand-in for the browser's localStorage contract.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_raw(&self, namespace: &str) -> Result<Option<String>>;
    async fn save_raw(&self, namespace: &str, payload: &str) -> Result<()>;
    async fn clear(&self, namespace: &str) -> Result<()>;
}

/// Reads and deserializes the payload stored under `namespace`.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    namespace: &str,
) -> Result<Option<T>> {
    let Some(raw) = store.load_raw(namespace).await? else {
        return Ok(None);
    };
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("invalid persisted payload under namespace '{namespace}'"))?;
    Ok(Some(value))
}

/// Serializes `value` and stores it under `namespace`, replacing any
/// previous payload.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn StateStore,
    namespace: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)
        .with_context(|| format!("failed to serialize payload for namespace '{namespace}'"))?;
    store.save_raw(namespace, &raw).await
}

/// SQLite-backed [`StateStore`].
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
            .await?;
        let storage = Self { pool };
        storage.ensure_client_state_table().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_client_state_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS client_state (
                namespace  TEXT PRIMARY KEY,
                payload    TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure client_state table exists")?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for Storage {
    async fn load_raw(&self, namespace: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT payload FROM client_state WHERE namespace = ?1")
            .bind(namespace)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load state for namespace '{namespace}'"))?;

        match row {
            Some(row) => Ok(Some(row.try_get("payload")?)),
            None => Ok(None),
        }
    }

    async fn save_raw(&self, namespace: &str, payload: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO client_state (namespace, payload, updated_at)
            VALUES (?1, ?2, CURRENT_TIMESTAMP)
            ON CONFLICT(namespace) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(namespace)
        .bind(payload)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save state for namespace '{namespace}'"))?;
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        let cleared = sqlx::query("DELETE FROM client_state WHERE namespace = ?1")
            .bind(namespace)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to clear state for namespace '{namespace}'"))?
            .rows_affected();
        if cleared == 0 {
            warn!(namespace, "storage: clear on empty namespace");
        }
        Ok(())
    }
}

/// In-memory [`StateStore`] for tests and offline operation.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load_raw(&self, namespace: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(namespace).cloned())
    }

    async fn save_raw(&self, namespace: &str, payload: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(namespace.to_string(), payload.to_string());
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        self.entries.lock().await.remove(namespace);
        Ok(())
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

    Some(PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
