//! Server-of-record boundary.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use learnstreak_core::{CourseId, LessonId, UserId};
use learnstreak_infra::{Catalog, Clock, CompletionOutcome, EngineError, ProgressStore, StreakEngine};
use learnstreak_progress::ProgressData;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrimaryError {
    /// Transient: the cache path takes over.
    #[error("server unavailable: {0}")]
    Unavailable(String),

    /// The server refused the request; caching would not help.
    #[error("rejected by server: {0}")]
    Rejected(String),
}

impl From<EngineError> for PrimaryError {
    fn from(value: EngineError) -> Self {
        if value.is_retryable() {
            PrimaryError::Unavailable(value.to_string())
        } else {
            PrimaryError::Rejected(value.to_string())
        }
    }
}

#[async_trait]
pub trait PrimaryStore: Send + Sync {
    async fn get_progress(&self, user_id: UserId, course_id: Option<CourseId>) -> Result<ProgressData, PrimaryError>;

    async fn record_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        completed_at: DateTime<Utc>,
    ) -> Result<CompletionOutcome, PrimaryError>;
}

#[async_trait]
impl<P> PrimaryStore for Arc<P>
where
    P: PrimaryStore + ?Sized,
{
    async fn get_progress(&self, user_id: UserId, course_id: Option<CourseId>) -> Result<ProgressData, PrimaryError> {
        (**self).get_progress(user_id, course_id).await
    }

    async fn record_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        completed_at: DateTime<Utc>,
    ) -> Result<CompletionOutcome, PrimaryError> {
        (**self).record_completion(user_id, course_id, lesson_id, completed_at).await
    }
}

/// In-process server of record backed by a `StreakEngine`.
pub struct EngineBackend<S, C, K> {
    engine: Arc<StreakEngine<S, C, K>>,
}

impl<S, C, K> EngineBackend<S, C, K> {
    pub fn new(engine: Arc<StreakEngine<S, C, K>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &StreakEngine<S, C, K> {
        &self.engine
    }
}

#[async_trait]
impl<S, C, K> PrimaryStore for EngineBackend<S, C, K>
where
    S: ProgressStore + 'static,
    C: Catalog + 'static,
    K: Clock + 'static,
{
    async fn get_progress(&self, user_id: UserId, course_id: Option<CourseId>) -> Result<ProgressData, PrimaryError> {
        Ok(self.engine.get_progress(user_id, course_id)?)
    }

    async fn record_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        completed_at: DateTime<Utc>,
    ) -> Result<CompletionOutcome, PrimaryError> {
        Ok(self
            .engine
            .record_lesson_completion(user_id, course_id, lesson_id, completed_at)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learnstreak_progress::RecoveryError;

    #[test]
    fn retryable_engine_errors_count_as_outages() {
        assert_eq!(
            PrimaryError::from(EngineError::StoreUnavailable("down".into())),
            PrimaryError::Unavailable("store unavailable: down".into())
        );
        assert!(matches!(
            PrimaryError::from(EngineError::ConcurrencyConflict("stale".into())),
            PrimaryError::Unavailable(_)
        ));
        assert!(matches!(
            PrimaryError::from(EngineError::InvalidInput("nope".into())),
            PrimaryError::Rejected(_)
        ));
        assert!(matches!(
            PrimaryError::from(EngineError::Recovery(RecoveryError::AlreadyUsed)),
            PrimaryError::Rejected(_)
        ));
    }
}
