use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};

use tunnelwatch_ports::KvStorePort;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
)";

/// Durable store in a single SQLite file, shared by every process that opens it.
#[derive(Clone)]
pub struct SqliteKvStore {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl SqliteKvStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .with_context(|| format!("failed to open store at {}", path.display()))?;
        pool.get()
            .context("failed to check out store connection")?
            .execute(SCHEMA, [])
            .context("failed to create kv table")?;
        tracing::info!(path = %path.display(), "sqlite store ready");
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().context("failed to check out store connection")?;
            op(&conn)
        })
        .await
        .context("store task panicked")?
    }
}

#[async_trait]
impl KvStorePort for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("failed to read {key}"))
        })
        .await
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        let updated_at = chrono::Utc::now().timestamp_millis();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, updated_at],
            )
            .with_context(|| format!("failed to write {key}"))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("tunnelwatch.db");

        let store = SqliteKvStore::open(&path).unwrap();
        store.put("permanent-mutes", r#"["tunA"]"#.into()).await.unwrap();
        store.put("quota:tunA", "1".into()).await.unwrap();
        store.put("quota:tunA", "2".into()).await.unwrap();
        drop(store);

        let reopened = SqliteKvStore::open(&path).unwrap();
        assert_eq!(reopened.path(), path.as_path());
        assert_eq!(
            reopened.get("permanent-mutes").await.unwrap().as_deref(),
            Some(r#"["tunA"]"#)
        );
        assert_eq!(reopened.get("quota:tunA").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_upsert_replaces_value() {
        let dir = tempdir().unwrap();
        let store = SqliteKvStore::open(&dir.path().join("kv.db")).unwrap();

        store.put("k", "old".into()).await.unwrap();
        store.put("k", "new".into()).await.unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
    }
}
