//! Read-facing progress view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use learnstreak_core::{CourseId, UserId, WeekKey};

use crate::achievements::Achievement;
use crate::policy::StreakPolicy;
use crate::streak::{StreakState, UserStreak};

/// Streak fields exposed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSnapshot {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub weekly_goal: u32,
    pub lessons_completed_this_week: u32,
    pub week_start: WeekKey,
    pub last_activity: Option<DateTime<Utc>>,
    pub state: StreakState,
    pub recovery_available: bool,
}

impl StreakSnapshot {
    pub fn of(streak: &UserStreak, now: DateTime<Utc>, policy: &StreakPolicy) -> Self {
        Self {
            current_streak: streak.current_streak(),
            longest_streak: streak.longest_streak(),
            weekly_goal: streak.weekly_goal(),
            lessons_completed_this_week: streak.lessons_completed_this_week(),
            week_start: streak.week_start(),
            last_activity: streak.last_activity(),
            state: streak.state(),
            recovery_available: streak.recovery_available(now, policy),
        }
    }
}

/// Consistent progress snapshot: the only read model the UI and the client cache
/// depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressData {
    pub user_id: UserId,
    pub course_id: Option<CourseId>,
    pub lessons_completed: u32,
    pub total_lessons: u32,
    pub percentage: u8,
    pub streak: StreakSnapshot,
    pub total_points: u64,
    pub achievements: Vec<Achievement>,
    pub generated_at: DateTime<Utc>,
}

/// `round(completed / total * 100)`, clamped to `0..=100`; `0` when `total == 0`.
pub fn completion_percentage(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = u64::from(completed.min(total));
    let total = u64::from(total);
    // Round half up in integer arithmetic.
    let pct = (completed * 200 + total) / (2 * total);
    u8::try_from(pct.min(100)).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_course_is_zero_percent() {
        assert_eq!(completion_percentage(0, 0), 0);
        assert_eq!(completion_percentage(5, 0), 0);
    }

    #[test]
    fn rounds_to_nearest_percent() {
        assert_eq!(completion_percentage(1, 3), 33);
        assert_eq!(completion_percentage(2, 3), 67);
        assert_eq!(completion_percentage(1, 200), 1); // 0.5 rounds up
        assert_eq!(completion_percentage(10, 10), 100);
    }

    #[test]
    fn more_completions_than_lessons_is_capped() {
        assert_eq!(completion_percentage(12, 10), 100);
    }

    proptest! {
        #[test]
        fn percentage_is_bounded(completed in any::<u32>(), total in any::<u32>()) {
            let pct = completion_percentage(completed, total);
            prop_assert!(pct <= 100);
            if total == 0 {
                prop_assert_eq!(pct, 0);
            }
        }
    }
}
