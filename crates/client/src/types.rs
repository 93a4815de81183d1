//! Shared client types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use learnstreak_core::{CourseId, LessonId, UserId};
use learnstreak_infra::CompletionOutcome;
use learnstreak_progress::ProgressData;

/// Connectivity state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// The server of record answered the last call.
    Online,
    /// The last call failed with an outage.
    Offline,
}

/// Whether a snapshot came straight from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
}

/// Last server snapshot for `(user, course)`; `course_id = None` is the overall view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedProgress {
    pub user_id: UserId,
    pub course_id: Option<CourseId>,
    pub data: ProgressData,
    pub cached_at: DateTime<Utc>,
}

/// Progress as handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressView {
    pub data: ProgressData,
    pub freshness: Freshness,
    /// Set when served from the cache.
    pub cached_at: Option<DateTime<Utc>>,
}

/// A completion the server could not accept yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub id: Uuid,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub lesson_id: LessonId,
    pub completed_at: DateTime<Utc>,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Committed(CompletionOutcome),
    /// Stored locally; resubmit with `ProgressClient::resubmit_pending`.
    Deferred(PendingWrite),
}
