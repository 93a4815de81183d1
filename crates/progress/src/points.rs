//! Points ledger.
//!
//! Total points are always the sum of this append-only ledger; there is no mutable
//! running counter to drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use learnstreak_core::{LessonId, UserId};

use crate::achievements::AchievementType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointsReason {
    /// First-ever completion of a lesson.
    LessonCompleted { lesson_id: LessonId },
    /// Value of a newly granted milestone achievement.
    Achievement {
        achievement_type: AchievementType,
        threshold: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsEntry {
    pub user_id: UserId,
    pub points_earned: u32,
    pub reason: PointsReason,
    pub created_at: DateTime<Utc>,
}

/// Sum of a learner's points ledger.
pub fn total_points<'a>(entries: impl IntoIterator<Item = &'a PointsEntry>) -> u64 {
    entries.into_iter().map(|e| u64::from(e.points_earned)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_the_ledger_sum() {
        let user = UserId::new();
        let now = Utc::now();
        let entries = vec![
            PointsEntry {
                user_id: user,
                points_earned: 10,
                reason: PointsReason::LessonCompleted { lesson_id: LessonId::new() },
                created_at: now,
            },
            PointsEntry {
                user_id: user,
                points_earned: 25,
                reason: PointsReason::Achievement {
                    achievement_type: AchievementType::LessonCount,
                    threshold: 5,
                },
                created_at: now,
            },
        ];
        assert_eq!(total_points(&entries), 35);
        assert_eq!(total_points(&Vec::<PointsEntry>::new()), 0);
    }
}
