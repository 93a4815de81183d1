//! Domain events describing committed progress changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use learnstreak_core::{CourseId, LessonId, UserId, WeekKey};
use learnstreak_events::Event;

use crate::achievements::{AchievementType, BadgeLevel};
use crate::policy::StreakPolicy;
use crate::streak::{StreakState, UserStreak};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    LessonRecorded {
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        week: WeekKey,
        first_completion: bool,
        occurred_at: DateTime<Utc>,
    },
    StreakAdvanced {
        user_id: UserId,
        current_streak: u32,
        longest_streak: u32,
        occurred_at: DateTime<Utc>,
    },
    StreakAtRisk {
        user_id: UserId,
        current_streak: u32,
        grace_ends: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },
    StreakBroken {
        user_id: UserId,
        streak_lost: u32,
        occurred_at: DateTime<Utc>,
    },
    StreakRecovered {
        user_id: UserId,
        restored_streak: u32,
        occurred_at: DateTime<Utc>,
    },
    AchievementGranted {
        user_id: UserId,
        achievement_type: AchievementType,
        threshold: u64,
        title: String,
        points: u32,
        badge: Option<BadgeLevel>,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for ProgressEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProgressEvent::LessonRecorded { .. } => "lesson.recorded",
            ProgressEvent::StreakAdvanced { .. } => "streak.advanced",
            ProgressEvent::StreakAtRisk { .. } => "streak.at_risk",
            ProgressEvent::StreakBroken { .. } => "streak.broken",
            ProgressEvent::StreakRecovered { .. } => "streak.recovered",
            ProgressEvent::AchievementGranted { .. } => "achievement.granted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProgressEvent::LessonRecorded { occurred_at, .. }
            | ProgressEvent::StreakAdvanced { occurred_at, .. }
            | ProgressEvent::StreakAtRisk { occurred_at, .. }
            | ProgressEvent::StreakBroken { occurred_at, .. }
            | ProgressEvent::StreakRecovered { occurred_at, .. }
            | ProgressEvent::AchievementGranted { occurred_at, .. } => *occurred_at,
        }
    }

    fn user_id(&self) -> UserId {
        match self {
            ProgressEvent::LessonRecorded { user_id, .. }
            | ProgressEvent::StreakAdvanced { user_id, .. }
            | ProgressEvent::StreakAtRisk { user_id, .. }
            | ProgressEvent::StreakBroken { user_id, .. }
            | ProgressEvent::StreakRecovered { user_id, .. }
            | ProgressEvent::AchievementGranted { user_id, .. } => *user_id,
        }
    }
}

impl ProgressEvent {
    /// Events implied by a streak transition from `before` to `after`.
    ///
    /// Recoveries are reported by the recovery path itself, not derived here.
    pub fn from_transition(
        before: &UserStreak,
        after: &UserStreak,
        policy: &StreakPolicy,
        at: DateTime<Utc>,
    ) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        let user_id = after.user_id();

        if after.state() == StreakState::Broken && before.state() != StreakState::Broken {
            events.push(ProgressEvent::StreakBroken {
                user_id,
                streak_lost: after.streak_before_break(),
                occurred_at: at,
            });
        }

        if after.state() == StreakState::AtRisk && before.state() != StreakState::AtRisk {
            if let Some(grace_ends) = after.grace_ends(policy) {
                events.push(ProgressEvent::StreakAtRisk {
                    user_id,
                    current_streak: after.current_streak(),
                    grace_ends,
                    occurred_at: at,
                });
            }
        }

        if after.last_credited_week() != before.last_credited_week()
            && after.current_streak() > 0
            && after.state() == StreakState::Active
        {
            events.push(ProgressEvent::StreakAdvanced {
                user_id,
                current_streak: after.current_streak(),
                longest_streak: after.longest_streak(),
                occurred_at: at,
            });
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::WeeklyLessonCompletion;
    use chrono::{Duration, TimeZone};

    #[test]
    fn crediting_a_week_emits_streak_advanced() {
        let policy = StreakPolicy::default();
        let user = UserId::new();
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let before = UserStreak::new(user, 1, at);
        let ledger = vec![WeeklyLessonCompletion::first(user, CourseId::new(), LessonId::new(), at)];
        let after = before.advance(&ledger, at, &policy);

        let events = ProgressEvent::from_transition(&before, &after, &policy, at);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "streak.advanced");
        assert_eq!(events[0].user_id(), user);
    }

    #[test]
    fn breaking_emits_broken_with_the_lost_value() {
        let policy = StreakPolicy::default();
        let user = UserId::new();
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let ledger = vec![WeeklyLessonCompletion::first(user, CourseId::new(), LessonId::new(), at)];
        let credited = UserStreak::new(user, 1, at).advance(&ledger, at, &policy);
        let later = at + Duration::weeks(5);
        let broken = credited.advance(&ledger, later, &policy);

        let events = ProgressEvent::from_transition(&credited, &broken, &policy, later);
        assert_eq!(
            events,
            vec![ProgressEvent::StreakBroken {
                user_id: user,
                streak_lost: 1,
                occurred_at: later,
            }]
        );
    }
}
