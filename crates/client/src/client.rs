//! Progress access with server-wins reconciliation.
//!
//! - reads go to the server; on an outage the last cached snapshot is served as stale
//! - writes go to the server; on an outage they are kept as pending writes
//! - every successful read overwrites the cached snapshot
//! - pending writes are only resubmitted on request

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use learnstreak_core::{CourseId, LessonId, UserId};
use learnstreak_infra::CompletionOutcome;

use crate::cache::FallbackCache;
use crate::config::ClientConfig;
use crate::offline::OfflineMode;
use crate::primary::{PrimaryError, PrimaryStore};
use crate::types::{CachedProgress, ConnectivityState, Freshness, PendingWrite, ProgressView, WriteOutcome};

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server is unreachable and the operation has no local fallback.
    #[error("server unavailable: {0}")]
    Unavailable(String),

    /// The server is unreachable and no usable snapshot is cached.
    #[error("server unavailable ({0}) and no usable cached snapshot")]
    NoSnapshot(String),

    #[error("rejected by server: {0}")]
    Rejected(String),

    #[error("progress cache failure: {0:#}")]
    Cache(#[from] anyhow::Error),
}

/// Result of [`ProgressClient::resubmit_pending`].
#[derive(Debug, Default)]
pub struct ResubmitSummary {
    pub committed: Vec<CompletionOutcome>,
    /// Dropped: the server will never accept these.
    pub rejected: Vec<(PendingWrite, String)>,
    /// Still pending because the server went away again.
    pub remaining: usize,
}

pub struct ProgressClient<P, F> {
    primary: P,
    cache: F,
    max_age: Option<Duration>,
    connectivity: Mutex<OfflineMode>,
}

impl<P, F> ProgressClient<P, F>
where
    P: PrimaryStore,
    F: FallbackCache,
{
    pub fn new(primary: P, cache: F) -> Self {
        Self {
            primary,
            cache,
            max_age: None,
            connectivity: Mutex::new(OfflineMode::new()),
        }
    }

    pub fn with_config(primary: P, cache: F, config: &ClientConfig) -> Self {
        let mut client = Self::new(primary, cache);
        client.max_age = config.max_age;
        client
    }

    /// Cached snapshots older than `max_age` are not served.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity
            .lock()
            .map(|mode| mode.state())
            .unwrap_or(ConnectivityState::Offline)
    }

    pub fn cache(&self) -> &F {
        &self.cache
    }

    pub async fn get_progress(&self, user_id: UserId, course_id: Option<CourseId>) -> Result<ProgressView, ClientError> {
        match self.primary.get_progress(user_id, course_id).await {
            Ok(data) => {
                self.mark_online();
                let snapshot = CachedProgress {
                    user_id,
                    course_id,
                    data: data.clone(),
                    cached_at: Utc::now(),
                };
                // The server answer stands even if the cache cannot be updated.
                if let Err(err) = self.cache.put_snapshot(&snapshot).await {
                    tracing::warn!(%user_id, "failed to refresh cached progress: {err:#}");
                }
                Ok(ProgressView {
                    data,
                    freshness: Freshness::Fresh,
                    cached_at: None,
                })
            }
            Err(PrimaryError::Unavailable(reason)) => {
                self.mark_offline(&reason);
                let cached = self.cache.get_snapshot(user_id, course_id).await?;
                match cached.filter(|c| self.is_servable(c.cached_at, Utc::now())) {
                    Some(cached) => {
                        tracing::warn!(%user_id, cached_at = %cached.cached_at, "serving stale progress from cache");
                        Ok(ProgressView {
                            data: cached.data,
                            freshness: Freshness::Stale,
                            cached_at: Some(cached.cached_at),
                        })
                    }
                    None => Err(ClientError::NoSnapshot(reason)),
                }
            }
            Err(PrimaryError::Rejected(reason)) => {
                self.mark_online();
                Err(ClientError::Rejected(reason))
            }
        }
    }

    pub async fn record_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        completed_at: DateTime<Utc>,
    ) -> Result<WriteOutcome, ClientError> {
        match self
            .primary
            .record_completion(user_id, course_id, lesson_id, completed_at)
            .await
        {
            Ok(outcome) => {
                self.mark_online();
                Ok(WriteOutcome::Committed(outcome))
            }
            Err(PrimaryError::Unavailable(reason)) => {
                self.mark_offline(&reason);
                let write = PendingWrite {
                    id: Uuid::now_v7(),
                    user_id,
                    course_id,
                    lesson_id,
                    completed_at,
                    queued_at: Utc::now(),
                };
                self.cache.push_pending(&write).await?;
                tracing::warn!(%user_id, %course_id, %lesson_id, "completion deferred until the server is reachable");
                Ok(WriteOutcome::Deferred(write))
            }
            Err(PrimaryError::Rejected(reason)) => {
                self.mark_online();
                Err(ClientError::Rejected(reason))
            }
        }
    }

    pub async fn pending_writes(&self, user_id: UserId) -> Result<Vec<PendingWrite>, ClientError> {
        Ok(self.cache.list_pending(user_id).await?)
    }

    /// Resubmit pending writes oldest first, stopping at the first outage.
    pub async fn resubmit_pending(&self, user_id: UserId) -> Result<ResubmitSummary, ClientError> {
        let pending = self.cache.list_pending(user_id).await?;
        let mut summary = ResubmitSummary::default();

        for (idx, write) in pending.iter().enumerate() {
            let result = self
                .primary
                .record_completion(write.user_id, write.course_id, write.lesson_id, write.completed_at)
                .await;
            match result {
                Ok(outcome) => {
                    self.mark_online();
                    self.cache.remove_pending(write.id).await?;
                    summary.committed.push(outcome);
                }
                Err(PrimaryError::Rejected(reason)) => {
                    tracing::warn!(%user_id, write_id = %write.id, "dropping pending write rejected by server: {reason}");
                    self.cache.remove_pending(write.id).await?;
                    summary.rejected.push((write.clone(), reason));
                }
                Err(PrimaryError::Unavailable(reason)) => {
                    self.mark_offline(&reason);
                    summary.remaining = pending.len() - idx;
                    break;
                }
            }
        }

        if !summary.committed.is_empty() {
            tracing::info!(%user_id, committed = summary.committed.len(), "pending writes resubmitted");
        }
        Ok(summary)
    }

    fn is_servable(&self, cached_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.max_age.is_none_or(|max| now.signed_duration_since(cached_at) <= max)
    }

    fn mark_online(&self) {
        if let Ok(mut mode) = self.connectivity.lock() {
            if mode.set_online() {
                tracing::info!("server reachable again");
            }
        }
    }

    fn mark_offline(&self, reason: &str) {
        if let Ok(mut mode) = self.connectivity.lock() {
            if mode.set_offline() {
                tracing::warn!(reason, "server unreachable; using local progress cache");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;
    use learnstreak_infra::{EngineConfig, InMemoryCatalog, InMemoryProgressStore, ManualClock, ProgressStore, StreakEngine};

    use crate::cache::{InMemoryProgressCache, SqliteProgressCache};
    use crate::primary::EngineBackend;

    type Backend = EngineBackend<Arc<InMemoryProgressStore>, Arc<InMemoryCatalog>, Arc<ManualClock>>;

    struct Fixture {
        store: Arc<InMemoryProgressStore>,
        course: CourseId,
        lessons: Vec<LessonId>,
        at: DateTime<Utc>,
    }

    fn backend() -> (Backend, Fixture) {
        let at = Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap();
        let store = Arc::new(InMemoryProgressStore::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let course = CourseId::new();
        let lessons = catalog.add_generated_course(course, 4);
        let engine = StreakEngine::new(
            store.clone(),
            catalog,
            Arc::new(ManualClock::new(at)),
            &EngineConfig::default(),
        )
        .unwrap();
        (
            EngineBackend::new(Arc::new(engine)),
            Fixture {
                store,
                course,
                lessons,
                at,
            },
        )
    }

    #[tokio::test]
    async fn outage_serves_the_last_snapshot_as_stale() {
        let (backend, fx) = backend();
        let client = ProgressClient::new(backend, SqliteProgressCache::in_memory());
        let user = UserId::new();

        client.record_completion(user, fx.course, fx.lessons[0], fx.at).await.unwrap();
        let fresh = client.get_progress(user, Some(fx.course)).await.unwrap();
        assert_eq!(fresh.freshness, Freshness::Fresh);
        assert_eq!(fresh.data.lessons_completed, 1);

        fx.store.set_available(false);
        let stale = client.get_progress(user, Some(fx.course)).await.unwrap();
        assert_eq!(stale.freshness, Freshness::Stale);
        assert!(stale.cached_at.is_some());
        assert_eq!(stale.data, fresh.data);
        assert_eq!(client.connectivity(), ConnectivityState::Offline);

        fx.store.set_available(true);
        let back = client.get_progress(user, Some(fx.course)).await.unwrap();
        assert_eq!(back.freshness, Freshness::Fresh);
        assert_eq!(client.connectivity(), ConnectivityState::Online);
    }

    #[tokio::test]
    async fn outage_without_snapshot_is_an_error() {
        let (backend, fx) = backend();
        let client = ProgressClient::new(backend, InMemoryProgressCache::new());

        fx.store.set_available(false);
        let err = client.get_progress(UserId::new(), None).await.unwrap_err();
        assert!(matches!(err, ClientError::NoSnapshot(_)));
    }

    #[tokio::test]
    async fn snapshots_older_than_max_age_are_not_served() {
        let (backend, fx) = backend();
        let client = ProgressClient::new(backend, InMemoryProgressCache::new()).with_max_age(Duration::hours(1));
        let user = UserId::new();

        let fresh = client.get_progress(user, Some(fx.course)).await.unwrap();
        let mut old = CachedProgress {
            user_id: user,
            course_id: Some(fx.course),
            data: fresh.data,
            cached_at: Utc::now() - Duration::hours(2),
        };
        client.cache().put_snapshot(&old).await.unwrap();

        fx.store.set_available(false);
        assert!(matches!(
            client.get_progress(user, Some(fx.course)).await,
            Err(ClientError::NoSnapshot(_))
        ));

        old.cached_at = Utc::now() - Duration::minutes(10);
        client.cache().put_snapshot(&old).await.unwrap();
        assert_eq!(
            client.get_progress(user, Some(fx.course)).await.unwrap().freshness,
            Freshness::Stale
        );
    }

    #[tokio::test]
    async fn server_snapshot_overwrites_the_cache() {
        let (backend, fx) = backend();
        let client = ProgressClient::new(backend, InMemoryProgressCache::new());
        let user = UserId::new();

        let mut bogus = client.get_progress(user, None).await.unwrap().data;
        bogus.lessons_completed = 99;
        client
            .cache()
            .put_snapshot(&CachedProgress {
                user_id: user,
                course_id: None,
                data: bogus,
                cached_at: Utc::now(),
            })
            .await
            .unwrap();

        let view = client.get_progress(user, None).await.unwrap();
        assert_eq!(view.data.lessons_completed, 0);
        let cached = client.cache().get_snapshot(user, None).await.unwrap().unwrap();
        assert_eq!(cached.data.lessons_completed, 0);
    }

    #[tokio::test]
    async fn deferred_writes_wait_for_an_explicit_resubmit() {
        let (backend, fx) = backend();
        let client = ProgressClient::new(backend, SqliteProgressCache::in_memory());
        let user = UserId::new();

        fx.store.set_available(false);
        let outcome = client.record_completion(user, fx.course, fx.lessons[0], fx.at).await.unwrap();
        assert!(matches!(outcome, WriteOutcome::Deferred(_)));
        client.record_completion(user, fx.course, fx.lessons[1], fx.at).await.unwrap();
        assert_eq!(client.pending_writes(user).await.unwrap().len(), 2);

        // Still down: nothing is lost.
        let summary = client.resubmit_pending(user).await.unwrap();
        assert!(summary.committed.is_empty());
        assert_eq!(summary.remaining, 2);

        fx.store.set_available(true);
        assert!(fx.store.list_lesson_completions(user).unwrap().is_empty());

        let summary = client.resubmit_pending(user).await.unwrap();
        assert_eq!(summary.committed.len(), 2);
        assert_eq!(summary.remaining, 0);
        assert!(client.pending_writes(user).await.unwrap().is_empty());

        let view = client.get_progress(user, Some(fx.course)).await.unwrap();
        assert_eq!(view.data.lessons_completed, 2);
        assert_eq!(view.data.percentage, 50);
    }

    #[tokio::test]
    async fn rejected_writes_are_not_deferred() {
        let (backend, fx) = backend();
        let client = ProgressClient::new(backend, InMemoryProgressCache::new());
        let user = UserId::new();

        let err = client
            .record_completion(user, CourseId::new(), fx.lessons[0], fx.at)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));
        assert!(client.pending_writes(user).await.unwrap().is_empty());
    }
}
