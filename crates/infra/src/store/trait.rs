use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use learnstreak_core::{CourseId, ExpectedVersion, LessonId, UserId};
use learnstreak_progress::{
    Achievement, LessonCompletion, PointsEntry, StreakRecovery, UserStreak, UserStreakBadge,
    WeeklyLessonCompletion,
};

/// Store operation error.
///
/// These are infrastructure failures, as opposed to domain errors (validation,
/// invariants). Only `Unavailable` is expected to clear up on its own.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Optimistic concurrency check failed.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// Any other storage failure (corruption, poisoned lock, ...).
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Per-user progress tables.
///
/// Implementations must:
/// - make every `*_if_absent` method atomic and report whether it inserted
/// - write a reward `PointsEntry` in the same step as the row that earns it
/// - enforce `ExpectedVersion` on streak saves and bump the version by one
pub trait ProgressStore: Send + Sync {
    /// Add `lesson_id` to the `(user, course, week of at)` ledger row, creating it
    /// if needed. Returns the row after the write.
    fn upsert_weekly_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<WeeklyLessonCompletion, StoreError>;

    fn list_weekly_completions(&self, user_id: UserId) -> Result<Vec<WeeklyLessonCompletion>, StoreError>;

    /// Record the first-ever completion of a lesson together with its reward.
    /// Returns `false` (and writes nothing) if the lesson was already completed.
    fn insert_lesson_completion_if_absent(
        &self,
        completion: &LessonCompletion,
        reward: &PointsEntry,
    ) -> Result<bool, StoreError>;

    fn list_lesson_completions(&self, user_id: UserId) -> Result<Vec<LessonCompletion>, StoreError>;

    fn load_streak(&self, user_id: UserId) -> Result<Option<UserStreak>, StoreError>;

    /// Persist `streak`, returning its new version.
    fn save_streak(&self, streak: &UserStreak, expected: ExpectedVersion) -> Result<u64, StoreError>;

    /// Persist a recovered streak and its history row atomically.
    ///
    /// Returns `Ok(None)` without writing anything if a recovery for the same
    /// `(user, break_week)` already exists.
    fn save_streak_with_recovery(
        &self,
        streak: &UserStreak,
        expected: ExpectedVersion,
        record: &StreakRecovery,
    ) -> Result<Option<u64>, StoreError>;

    fn list_recoveries(&self, user_id: UserId) -> Result<Vec<StreakRecovery>, StoreError>;

    fn list_points(&self, user_id: UserId) -> Result<Vec<PointsEntry>, StoreError>;

    /// Insert unless `(user, type, threshold)` already exists; `reward` is appended
    /// only when the achievement is new.
    fn insert_achievement_if_absent(
        &self,
        achievement: &Achievement,
        reward: Option<&PointsEntry>,
    ) -> Result<bool, StoreError>;

    fn list_achievements(&self, user_id: UserId) -> Result<Vec<Achievement>, StoreError>;

    fn insert_badge_if_absent(&self, badge: &UserStreakBadge) -> Result<bool, StoreError>;

    fn list_badges(&self, user_id: UserId) -> Result<Vec<UserStreakBadge>, StoreError>;
}

impl<S> ProgressStore for Arc<S>
where
    S: ProgressStore + ?Sized,
{
    fn upsert_weekly_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<WeeklyLessonCompletion, StoreError> {
        (**self).upsert_weekly_completion(user_id, course_id, lesson_id, at)
    }

    fn list_weekly_completions(&self, user_id: UserId) -> Result<Vec<WeeklyLessonCompletion>, StoreError> {
        (**self).list_weekly_completions(user_id)
    }

    fn insert_lesson_completion_if_absent(
        &self,
        completion: &LessonCompletion,
        reward: &PointsEntry,
    ) -> Result<bool, StoreError> {
        (**self).insert_lesson_completion_if_absent(completion, reward)
    }

    fn list_lesson_completions(&self, user_id: UserId) -> Result<Vec<LessonCompletion>, StoreError> {
        (**self).list_lesson_completions(user_id)
    }

    fn load_streak(&self, user_id: UserId) -> Result<Option<UserStreak>, StoreError> {
        (**self).load_streak(user_id)
    }

    fn save_streak(&self, streak: &UserStreak, expected: ExpectedVersion) -> Result<u64, StoreError> {
        (**self).save_streak(streak, expected)
    }

    fn save_streak_with_recovery(
        &self,
        streak: &UserStreak,
        expected: ExpectedVersion,
        record: &StreakRecovery,
    ) -> Result<Option<u64>, StoreError> {
        (**self).save_streak_with_recovery(streak, expected, record)
    }

    fn list_recoveries(&self, user_id: UserId) -> Result<Vec<StreakRecovery>, StoreError> {
        (**self).list_recoveries(user_id)
    }

    fn list_points(&self, user_id: UserId) -> Result<Vec<PointsEntry>, StoreError> {
        (**self).list_points(user_id)
    }

    fn insert_achievement_if_absent(
        &self,
        achievement: &Achievement,
        reward: Option<&PointsEntry>,
    ) -> Result<bool, StoreError> {
        (**self).insert_achievement_if_absent(achievement, reward)
    }

    fn list_achievements(&self, user_id: UserId) -> Result<Vec<Achievement>, StoreError> {
        (**self).list_achievements(user_id)
    }

    fn insert_badge_if_absent(&self, badge: &UserStreakBadge) -> Result<bool, StoreError> {
        (**self).insert_badge_if_absent(badge)
    }

    fn list_badges(&self, user_id: UserId) -> Result<Vec<UserStreakBadge>, StoreError> {
        (**self).list_badges(user_id)
    }
}
