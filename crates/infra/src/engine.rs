//! Streak engine: the application service composing store, catalog and clock.
//!
//! ```text
//! record_lesson_completion
//!   ↓
//! 1. Validate against the catalog (nothing persisted on failure)
//!   ↓  (per-user lock held from here on)
//! 2. Ledger upsert + first-completion reward
//!   ↓
//! 3. Advance the streak and save it (optimistic version check)
//!   ↓
//! 4. Evaluate milestones (count/streak rules, then points rules)
//!   ↓
//! 5. Publish domain events (best-effort, after commit)
//! ```
//!
//! Every step is idempotent at the ledger level, so a caller that sees
//! `ConcurrencyConflict` or `StoreUnavailable` may retry the whole operation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

use learnstreak_core::{CourseId, DomainError, ExpectedVersion, LessonId, UserId, Versioned};
use learnstreak_events::{EventBus, EventEnvelope};
use learnstreak_progress::{
    Achievement, AchievementType, LessonCompletion, MilestoneProgress, PointsEntry, PointsReason,
    ProgressData, ProgressEvent, RecoveryError, RuleTable, StreakPolicy, StreakRecovery,
    StreakSnapshot, UserStreak, UserStreakBadge, attempt_recovery, completion_percentage,
    total_points,
};

use crate::catalog::Catalog;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, EngineConfig};
use crate::locks::UserLocks;
use crate::store::{ProgressStore, StoreError};

/// Stream name stamped on every published envelope.
pub const PROGRESS_STREAM: &str = "learnstreak.progress";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Unknown course/lesson or an invalid argument; nothing was persisted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Another operation for the same learner won the race; retry the whole call.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    /// The store could not be reached; callers fall back to the client cache.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConcurrencyConflict(_) | EngineError::StoreUnavailable(_))
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
            StoreError::Conflict(msg) => EngineError::ConcurrencyConflict(msg),
            StoreError::Storage(msg) => EngineError::Storage(msg),
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Conflict(msg) => EngineError::ConcurrencyConflict(msg),
            DomainError::Validation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::InvariantViolation(msg) => EngineError::InvalidInput(msg),
        }
    }
}

/// Result of recording a lesson completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    /// Achievements granted by this call only.
    pub new_achievements: Vec<Achievement>,
    pub streak: StreakSnapshot,
}

/// Result of a successful recovery. Refusals surface as [`EngineError::Recovery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub success: bool,
    pub new_streak_value: u32,
    pub record: StreakRecovery,
}

/// Object-safe view of an event bus carrying progress envelopes.
trait ProgressPublisher: Send + Sync {
    fn publish_envelope(&self, envelope: EventEnvelope<ProgressEvent>) -> Result<(), String>;
}

impl<B> ProgressPublisher for B
where
    B: EventBus<EventEnvelope<ProgressEvent>>,
{
    fn publish_envelope(&self, envelope: EventEnvelope<ProgressEvent>) -> Result<(), String> {
        self.publish(envelope).map_err(|err| format!("{err:?}"))
    }
}

pub struct StreakEngine<S, C, K = SystemClock> {
    store: S,
    catalog: C,
    clock: K,
    policy: StreakPolicy,
    rules: RuleTable,
    points_per_lesson: u32,
    locks: UserLocks,
    bus: Option<Arc<dyn ProgressPublisher>>,
}

impl<S, C, K> StreakEngine<S, C, K> {
    pub fn new(store: S, catalog: C, clock: K, config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            catalog,
            clock,
            policy: config.policy()?,
            rules: config.rule_table()?,
            points_per_lesson: config.points_per_lesson,
            locks: UserLocks::new(),
            bus: None,
        })
    }

    /// Publish committed changes on `bus`.
    pub fn with_bus<B>(mut self, bus: B) -> Self
    where
        B: EventBus<EventEnvelope<ProgressEvent>> + 'static,
    {
        self.bus = Some(Arc::new(bus));
        self
    }

    /// Replace the milestone table built from configuration.
    pub fn with_rules(mut self, rules: RuleTable) -> Self {
        self.rules = rules;
        self
    }

    pub fn policy(&self) -> &StreakPolicy {
        &self.policy
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, C, K> StreakEngine<S, C, K>
where
    S: ProgressStore,
    C: Catalog,
    K: Clock,
{
    /// Record that `user_id` completed `lesson_id` at `timestamp`.
    ///
    /// Safe to retry: the ledger, the first-completion reward and every
    /// achievement are written through insert-if-absent.
    #[instrument(
        skip_all,
        fields(user_id = %user_id, course_id = %course_id, lesson_id = %lesson_id)
    )]
    pub fn record_lesson_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        timestamp: DateTime<Utc>,
    ) -> Result<CompletionOutcome, EngineError> {
        if self.catalog.total_lesson_count(course_id).is_none() {
            return Err(EngineError::InvalidInput(format!("unknown course {course_id}")));
        }
        if !self.catalog.lesson_exists(course_id, lesson_id) {
            return Err(EngineError::InvalidInput(format!(
                "lesson {lesson_id} is not part of course {course_id}"
            )));
        }

        let _guard = self.locks.lock(user_id);

        let result = self.record_locked(user_id, course_id, lesson_id, timestamp);
        if let Err(err) = &result {
            log_failure("record_lesson_completion", err);
        }
        result
    }

    fn record_locked(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        timestamp: DateTime<Utc>,
    ) -> Result<CompletionOutcome, EngineError> {
        let row = self
            .store
            .upsert_weekly_completion(user_id, course_id, lesson_id, timestamp)?;

        let completion = LessonCompletion {
            user_id,
            course_id,
            lesson_id,
            completed_at: timestamp,
        };
        let reward = PointsEntry {
            user_id,
            points_earned: self.points_per_lesson,
            reason: PointsReason::LessonCompleted { lesson_id },
            created_at: timestamp,
        };
        let first_completion = self.store.insert_lesson_completion_if_absent(&completion, &reward)?;

        let now = self.clock.now();
        let (before, after) = self.advance_and_save(user_id, now)?;
        let new_achievements = self.evaluate_milestones(&after, now)?;

        tracing::debug!(
            week = %row.week,
            lessons_this_week = after.lessons_completed_this_week(),
            first_completion,
            "lesson recorded"
        );

        let mut events = vec![ProgressEvent::LessonRecorded {
            user_id,
            course_id,
            lesson_id,
            week: row.week,
            first_completion,
            occurred_at: now,
        }];
        events.extend(ProgressEvent::from_transition(&before, &after, &self.policy, now));
        events.extend(new_achievements.iter().map(|a| granted_event(a, now)));
        self.publish(after.version(), events);

        Ok(CompletionOutcome {
            new_achievements,
            streak: StreakSnapshot::of(&after, now, &self.policy),
        })
    }

    /// Progress snapshot for one course, or across every course the learner touched.
    #[instrument(skip_all, fields(user_id = %user_id, course_id = ?course_id))]
    pub fn get_progress(&self, user_id: UserId, course_id: Option<CourseId>) -> Result<ProgressData, EngineError> {
        let _guard = self.locks.lock(user_id);

        let now = self.clock.now();
        let completions = self.store.list_lesson_completions(user_id)?;

        let (lessons_completed, total_lessons) = match course_id {
            Some(course_id) => {
                let total = self
                    .catalog
                    .total_lesson_count(course_id)
                    .ok_or_else(|| EngineError::InvalidInput(format!("unknown course {course_id}")))?;
                let done = completions.iter().filter(|c| c.course_id == course_id).count();
                (count_u32(done), total)
            }
            None => {
                let touched: BTreeSet<CourseId> = completions.iter().map(|c| c.course_id).collect();
                let total = touched
                    .iter()
                    .filter_map(|course| self.catalog.total_lesson_count(*course))
                    .fold(0u32, u32::saturating_add);
                (count_u32(completions.len()), total)
            }
        };

        let streak = self.current_streak(user_id, now)?;
        let points = self.store.list_points(user_id)?;
        let achievements = self.store.list_achievements(user_id)?;

        Ok(ProgressData {
            user_id,
            course_id,
            lessons_completed,
            total_lessons,
            percentage: completion_percentage(lessons_completed, total_lessons),
            streak: StreakSnapshot::of(&streak, now, &self.policy),
            total_points: total_points(&points),
            achievements,
            generated_at: now,
        })
    }

    /// Restore a streak that is at risk or broken, once per break.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub fn attempt_streak_recovery(&self, user_id: UserId) -> Result<RecoveryOutcome, EngineError> {
        let _guard = self.locks.lock(user_id);

        let now = self.clock.now();
        let Some(stored) = self.store.load_streak(user_id)? else {
            return Err(RecoveryError::NoActiveBreak.into());
        };
        let ledger = self.store.list_weekly_completions(user_id)?;
        let advanced = stored.advance(&ledger, now, &self.policy);

        let grant = match attempt_recovery(&advanced, now, &self.policy) {
            Ok(grant) => grant,
            Err(refused) => {
                // Persist any decay observed on the way so the refusal is consistent
                // with what `streak()` reports.
                if advanced != stored {
                    let version = self
                        .store
                        .save_streak(&advanced, stored.expected_version())?;
                    self.publish(
                        version,
                        ProgressEvent::from_transition(&stored, &advanced, &self.policy, now),
                    );
                }
                tracing::info!(reason = %refused, "streak recovery refused");
                return Err(refused.into());
            }
        };

        let Some(version) = self.store.save_streak_with_recovery(
            &grant.streak,
            stored.expected_version(),
            &grant.record,
        )?
        else {
            tracing::info!(break_week = %grant.record.break_week, "recovery already recorded for this break");
            return Err(RecoveryError::AlreadyUsed.into());
        };

        let restored = grant.streak.current_streak();
        tracing::info!(
            break_week = %grant.record.break_week,
            restored_streak = restored,
            "streak recovered"
        );

        let mut events = ProgressEvent::from_transition(&stored, &advanced, &self.policy, now);
        events.push(ProgressEvent::StreakRecovered {
            user_id,
            restored_streak: restored,
            occurred_at: now,
        });
        self.publish(version, events);

        Ok(RecoveryOutcome {
            success: true,
            new_streak_value: restored,
            record: grant.record,
        })
    }

    /// Evaluate decay without a new completion (the weekly tick).
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub fn refresh_streak(&self, user_id: UserId) -> Result<StreakSnapshot, EngineError> {
        let _guard = self.locks.lock(user_id);

        let now = self.clock.now();
        let (before, after) = self.advance_and_save(user_id, now)?;
        self.publish(
            after.version(),
            ProgressEvent::from_transition(&before, &after, &self.policy, now),
        );
        Ok(StreakSnapshot::of(&after, now, &self.policy))
    }

    #[instrument(skip_all, fields(user_id = %user_id, goal = goal))]
    pub fn set_weekly_goal(&self, user_id: UserId, goal: u32) -> Result<StreakSnapshot, EngineError> {
        let _guard = self.locks.lock(user_id);

        let now = self.clock.now();
        let stored = self.store.load_streak(user_id)?;
        let expected = stored
            .as_ref()
            .map_or(ExpectedVersion::Exact(0), Versioned::expected_version);
        let before = stored.unwrap_or_else(|| UserStreak::new(user_id, self.policy.default_weekly_goal, now));

        let mut updated = before.clone();
        updated.set_weekly_goal(goal)?;
        let ledger = self.store.list_weekly_completions(user_id)?;
        let mut after = updated.advance(&ledger, now, &self.policy);
        let version = self.store.save_streak(&after, expected)?;
        after.set_version(version);

        tracing::info!(goal, "weekly goal updated");
        self.publish(
            version,
            ProgressEvent::from_transition(&before, &after, &self.policy, now),
        );
        Ok(StreakSnapshot::of(&after, now, &self.policy))
    }

    /// Streak as it stands now; nothing is persisted.
    pub fn streak(&self, user_id: UserId) -> Result<StreakSnapshot, EngineError> {
        let now = self.clock.now();
        let streak = self.current_streak(user_id, now)?;
        Ok(StreakSnapshot::of(&streak, now, &self.policy))
    }

    pub fn recovery_history(&self, user_id: UserId) -> Result<Vec<StreakRecovery>, EngineError> {
        Ok(self.store.list_recoveries(user_id)?)
    }

    #[cfg(test)]
    pub(crate) fn held_user_locks(&self) -> usize {
        self.locks.tracked()
    }

    pub fn badges(&self, user_id: UserId) -> Result<Vec<UserStreakBadge>, EngineError> {
        Ok(self.store.list_badges(user_id)?)
    }

    pub fn points_history(&self, user_id: UserId) -> Result<Vec<PointsEntry>, EngineError> {
        Ok(self.store.list_points(user_id)?)
    }

    fn current_streak(&self, user_id: UserId, now: DateTime<Utc>) -> Result<UserStreak, EngineError> {
        let stored = self
            .store
            .load_streak(user_id)?
            .unwrap_or_else(|| UserStreak::new(user_id, self.policy.default_weekly_goal, now));
        let ledger = self.store.list_weekly_completions(user_id)?;
        Ok(stored.advance(&ledger, now, &self.policy))
    }

    /// Load (or lazily create), advance and persist the learner's streak.
    /// Returns the state before and after; `after` carries the saved version.
    fn advance_and_save(&self, user_id: UserId, now: DateTime<Utc>) -> Result<(UserStreak, UserStreak), EngineError> {
        let stored = self.store.load_streak(user_id)?;
        let is_new = stored.is_none();
        let before = stored.unwrap_or_else(|| UserStreak::new(user_id, self.policy.default_weekly_goal, now));

        let ledger = self.store.list_weekly_completions(user_id)?;
        let mut after = before.advance(&ledger, now, &self.policy);

        if is_new || after != before {
            let version = self
                .store
                .save_streak(&after, before.expected_version())?;
            after.set_version(version);
            log_transition(&before, &after);
        }

        Ok((before, after))
    }

    fn milestone_progress(&self, streak: &UserStreak) -> Result<MilestoneProgress, EngineError> {
        let user_id = streak.user_id();
        let completions = self.store.list_lesson_completions(user_id)?;

        let mut per_course: BTreeMap<CourseId, u32> = BTreeMap::new();
        for completion in &completions {
            *per_course.entry(completion.course_id).or_default() += 1;
        }
        let courses_completed = per_course
            .iter()
            .filter(|(course, done)| {
                self.catalog
                    .total_lesson_count(**course)
                    .is_some_and(|total| total > 0 && **done >= total)
            })
            .count();

        Ok(MilestoneProgress {
            lessons_completed: completions.len() as u64,
            courses_completed: courses_completed as u64,
            current_streak: u64::from(streak.current_streak()),
            total_points: total_points(&self.store.list_points(user_id)?),
        })
    }

    /// Grant every satisfied milestone not yet held. Count and streak rules run
    /// first; points rules then see the total including their rewards.
    fn evaluate_milestones(&self, streak: &UserStreak, now: DateTime<Utc>) -> Result<Vec<Achievement>, EngineError> {
        let user_id = streak.user_id();
        let mut progress = self.milestone_progress(streak)?;
        let mut granted = Vec::new();

        for rule in self.rules.satisfied(&progress, false) {
            let achievement = Achievement::grant(rule, user_id, now);
            let reward = (rule.points > 0).then(|| PointsEntry {
                user_id,
                points_earned: rule.points,
                reason: PointsReason::Achievement {
                    achievement_type: rule.achievement_type,
                    threshold: rule.threshold,
                },
                created_at: now,
            });
            if !self.store.insert_achievement_if_absent(&achievement, reward.as_ref())? {
                continue;
            }

            if let (AchievementType::StreakLength, Some(level)) = (rule.achievement_type, rule.badge) {
                let badge = UserStreakBadge {
                    user_id,
                    level,
                    earned_at: now,
                };
                if self.store.insert_badge_if_absent(&badge)? {
                    tracing::info!(level = ?level, "streak badge earned");
                }
            }

            tracing::info!(
                achievement_type = rule.achievement_type.as_str(),
                threshold = rule.threshold,
                points = rule.points,
                "achievement granted"
            );
            granted.push(achievement);
        }

        progress.total_points = total_points(&self.store.list_points(user_id)?);
        for rule in self.rules.satisfied(&progress, true) {
            let achievement = Achievement::grant(rule, user_id, now);
            if self.store.insert_achievement_if_absent(&achievement, None)? {
                tracing::info!(
                    achievement_type = rule.achievement_type.as_str(),
                    threshold = rule.threshold,
                    "achievement granted"
                );
                granted.push(achievement);
            }
        }

        Ok(granted)
    }

    fn publish(&self, sequence_number: u64, events: Vec<ProgressEvent>) {
        let Some(bus) = &self.bus else {
            return;
        };
        for event in events {
            let envelope = EventEnvelope::wrap(PROGRESS_STREAM, sequence_number, event);
            if let Err(err) = bus.publish_envelope(envelope) {
                tracing::warn!(error = %err, "failed to publish progress event");
            }
        }
    }
}

fn granted_event(achievement: &Achievement, at: DateTime<Utc>) -> ProgressEvent {
    ProgressEvent::AchievementGranted {
        user_id: achievement.user_id,
        achievement_type: achievement.achievement_type,
        threshold: achievement.threshold,
        title: achievement.title.clone(),
        points: achievement.points,
        badge: achievement.badge,
        occurred_at: at,
    }
}

fn log_transition(before: &UserStreak, after: &UserStreak) {
    if before.state() != after.state() || before.current_streak() != after.current_streak() {
        tracing::info!(
            from = before.state().as_str(),
            to = after.state().as_str(),
            current_streak = after.current_streak(),
            longest_streak = after.longest_streak(),
            "streak updated"
        );
    }
}

fn log_failure(operation: &'static str, err: &EngineError) {
    match err {
        EngineError::StoreUnavailable(_) | EngineError::Storage(_) => {
            tracing::error!(operation, error = %err, "store failure");
        }
        EngineError::ConcurrencyConflict(_) => {
            tracing::warn!(operation, error = %err, "lost a concurrent update");
        }
        EngineError::InvalidInput(_) | EngineError::Recovery(_) => {}
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
