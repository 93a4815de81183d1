//! Local progress cache used when the server of record is unreachable.
//!
//! Holds two things per device: the last server snapshot per `(user, course)`
//! and the completions the server could not accept yet. Single writer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use uuid::Uuid;

use learnstreak_core::{CourseId, UserId};

use crate::config::ClientConfig;
use crate::types::{CachedProgress, PendingWrite};

#[async_trait]
pub trait FallbackCache: Send + Sync {
    /// Replace the snapshot for `(user, course)`; never merges.
    async fn put_snapshot(&self, snapshot: &CachedProgress) -> anyhow::Result<()>;

    async fn get_snapshot(&self, user_id: UserId, course_id: Option<CourseId>) -> anyhow::Result<Option<CachedProgress>>;

    /// Store a deferred completion. Re-queueing the same completion is a no-op.
    async fn push_pending(&self, write: &PendingWrite) -> anyhow::Result<()>;

    /// Pending writes for `user_id`, oldest first.
    async fn list_pending(&self, user_id: UserId) -> anyhow::Result<Vec<PendingWrite>>;

    async fn remove_pending(&self, id: Uuid) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
enum CacheTarget {
    File(PathBuf),
    Memory,
}

/// SQLite-backed fallback cache.
///
/// Cheap to clone; clones share the lazily created pool.
#[derive(Debug, Clone)]
pub struct SqliteProgressCache {
    target: CacheTarget,
    pool: Arc<Mutex<Option<SqlitePool>>>,
}

impl SqliteProgressCache {
    /// Cache stored at `path` (created on first use).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            target: CacheTarget::File(path.into()),
            pool: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.cache_path.clone())
    }

    /// Private in-memory database; lives as long as this handle.
    pub fn in_memory() -> Self {
        Self {
            target: CacheTarget::Memory,
            pool: Arc::new(Mutex::new(None)),
        }
    }

    async fn connect(&self) -> anyhow::Result<SqlitePool> {
        match &self.target {
            CacheTarget::Memory => SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .context("failed to open in-memory progress cache"),
            CacheTarget::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create cache directory at {:?}", parent))?;
                }
                let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
                SqlitePoolOptions::new()
                    .connect_with(options)
                    .await
                    .with_context(|| format!("failed to create SQLite pool for progress cache at {:?}", path))
            }
        }
    }

    /// Get the pool, creating the database and schema on first use.
    async fn get_pool(&self) -> anyhow::Result<SqlitePool> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        let pool = self.connect().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS progress_snapshots (
                user_id    TEXT NOT NULL,
                course_key TEXT NOT NULL,
                data       TEXT NOT NULL,
                cached_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, course_key)
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create progress_snapshots table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_writes (
                id           TEXT PRIMARY KEY,
                user_id      TEXT NOT NULL,
                course_id    TEXT NOT NULL,
                lesson_id    TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                queued_at    TEXT NOT NULL,
                UNIQUE (user_id, course_id, lesson_id, completed_at)
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create pending_writes table")?;

        *guard = Some(pool.clone());
        Ok(pool)
    }
}

/// Overall snapshots are stored under the empty course key.
fn course_key(course_id: Option<CourseId>) -> String {
    course_id.map(|c| c.to_string()).unwrap_or_default()
}

fn parse_time(raw: &str, column: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid {column} timestamp in cache"))
}

#[async_trait]
impl FallbackCache for SqliteProgressCache {
    async fn put_snapshot(&self, snapshot: &CachedProgress) -> anyhow::Result<()> {
        let pool = self.get_pool().await?;
        let data = serde_json::to_string(&snapshot.data).context("failed to serialize progress snapshot")?;

        sqlx::query(
            r#"
            INSERT INTO progress_snapshots (user_id, course_key, data, cached_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, course_key)
            DO UPDATE SET
                data = excluded.data,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(snapshot.user_id.to_string())
        .bind(course_key(snapshot.course_id))
        .bind(data)
        .bind(snapshot.cached_at.to_rfc3339())
        .execute(&pool)
        .await
        .context("failed to upsert progress snapshot")?;

        Ok(())
    }

    async fn get_snapshot(&self, user_id: UserId, course_id: Option<CourseId>) -> anyhow::Result<Option<CachedProgress>> {
        let pool = self.get_pool().await?;

        let row = sqlx::query(
            r#"
            SELECT data, cached_at
            FROM progress_snapshots
            WHERE user_id = ?1
              AND course_key = ?2
            "#,
        )
        .bind(user_id.to_string())
        .bind(course_key(course_id))
        .fetch_optional(&pool)
        .await
        .context("failed to fetch progress snapshot from cache")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data: String = row.try_get("data")?;
        let cached_at: String = row.try_get("cached_at")?;

        Ok(Some(CachedProgress {
            user_id,
            course_id,
            data: serde_json::from_str(&data).context("failed to deserialize progress snapshot")?,
            cached_at: parse_time(&cached_at, "cached_at")?,
        }))
    }

    async fn push_pending(&self, write: &PendingWrite) -> anyhow::Result<()> {
        let pool = self.get_pool().await?;

        sqlx::query(
            r#"
            INSERT INTO pending_writes (id, user_id, course_id, lesson_id, completed_at, queued_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(write.id.to_string())
        .bind(write.user_id.to_string())
        .bind(write.course_id.to_string())
        .bind(write.lesson_id.to_string())
        .bind(write.completed_at.to_rfc3339())
        .bind(write.queued_at.to_rfc3339())
        .execute(&pool)
        .await
        .context("failed to store pending write")?;

        Ok(())
    }

    async fn list_pending(&self, user_id: UserId) -> anyhow::Result<Vec<PendingWrite>> {
        let pool = self.get_pool().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, course_id, lesson_id, completed_at, queued_at
            FROM pending_writes
            WHERE user_id = ?1
            ORDER BY queued_at ASC, completed_at ASC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&pool)
        .await
        .context("failed to list pending writes")?;

        rows.into_iter()
            .map(|row| -> anyhow::Result<PendingWrite> {
                let id: String = row.try_get("id")?;
                let course_id: String = row.try_get("course_id")?;
                let lesson_id: String = row.try_get("lesson_id")?;
                let completed_at: String = row.try_get("completed_at")?;
                let queued_at: String = row.try_get("queued_at")?;
                Ok(PendingWrite {
                    id: Uuid::parse_str(&id).context("invalid pending write id")?,
                    user_id,
                    course_id: course_id.parse().context("invalid course id in pending write")?,
                    lesson_id: lesson_id.parse().context("invalid lesson id in pending write")?,
                    completed_at: parse_time(&completed_at, "completed_at")?,
                    queued_at: parse_time(&queued_at, "queued_at")?,
                })
            })
            .collect()
    }

    async fn remove_pending(&self, id: Uuid) -> anyhow::Result<()> {
        let pool = self.get_pool().await?;
        sqlx::query("DELETE FROM pending_writes WHERE id = ?1")
            .bind(id.to_string())
            .execute(&pool)
            .await
            .context("failed to remove pending write")?;
        Ok(())
    }
}

/// In-memory fallback cache for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryProgressCache {
    snapshots: Mutex<HashMap<(UserId, Option<CourseId>), CachedProgress>>,
    pending: Mutex<Vec<PendingWrite>>,
}

impl InMemoryProgressCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FallbackCache for InMemoryProgressCache {
    async fn put_snapshot(&self, snapshot: &CachedProgress) -> anyhow::Result<()> {
        self.snapshots
            .lock()
            .await
            .insert((snapshot.user_id, snapshot.course_id), snapshot.clone());
        Ok(())
    }

    async fn get_snapshot(&self, user_id: UserId, course_id: Option<CourseId>) -> anyhow::Result<Option<CachedProgress>> {
        Ok(self.snapshots.lock().await.get(&(user_id, course_id)).cloned())
    }

    async fn push_pending(&self, write: &PendingWrite) -> anyhow::Result<()> {
        let mut pending = self.pending.lock().await;
        let duplicate = pending.iter().any(|p| {
            p.id == write.id
                || (p.user_id == write.user_id
                    && p.course_id == write.course_id
                    && p.lesson_id == write.lesson_id
                    && p.completed_at == write.completed_at)
        });
        if !duplicate {
            pending.push(write.clone());
        }
        Ok(())
    }

    async fn list_pending(&self, user_id: UserId) -> anyhow::Result<Vec<PendingWrite>> {
        Ok(self
            .pending
            .lock()
            .await
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn remove_pending(&self, id: Uuid) -> anyhow::Result<()> {
        self.pending.lock().await.retain(|p| p.id != id);
        Ok(())
    }
}
