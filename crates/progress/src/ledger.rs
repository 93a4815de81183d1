//! Activity ledger rows.
//!
//! The ledger is the single source of truth for every derived count. Rows are
//! created on first qualifying event and never deleted; re-recording an event only
//! moves `last_lesson_at` forward.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use learnstreak_core::{CourseId, LessonId, UserId, WeekKey};

/// Ledger entry: a learner completed at least one lesson of a course in a week.
///
/// Unique per `(user_id, course_id, week)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyLessonCompletion {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub week: WeekKey,
    /// Distinct lessons completed in this course during this week.
    pub lesson_ids: BTreeSet<LessonId>,
    pub first_lesson_at: DateTime<Utc>,
    pub last_lesson_at: DateTime<Utc>,
}

impl WeeklyLessonCompletion {
    /// Row created by the first completion of the week for this course.
    pub fn first(user_id: UserId, course_id: CourseId, lesson_id: LessonId, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            course_id,
            week: WeekKey::containing(at),
            lesson_ids: BTreeSet::from([lesson_id]),
            first_lesson_at: at,
            last_lesson_at: at,
        }
    }

    /// Fold another completion of the same week into this row.
    ///
    /// Returns `true` when the lesson was not yet part of this week's set. A retry
    /// of an already-recorded completion changes nothing but `last_lesson_at`.
    pub fn record(&mut self, lesson_id: LessonId, at: DateTime<Utc>) -> bool {
        if at > self.last_lesson_at {
            self.last_lesson_at = at;
        }
        if at < self.first_lesson_at {
            self.first_lesson_at = at;
        }
        self.lesson_ids.insert(lesson_id)
    }

    pub fn lesson_count(&self) -> u32 {
        u32::try_from(self.lesson_ids.len()).unwrap_or(u32::MAX)
    }
}

/// First-ever completion of a lesson by a learner. Unique per `(user_id, lesson_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonCompletion {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub lesson_id: LessonId,
    pub completed_at: DateTime<Utc>,
}

/// Distinct lessons a learner completed during `week`, across all courses.
pub fn lessons_in_week(ledger: &[WeeklyLessonCompletion], user_id: UserId, week: WeekKey) -> u32 {
    ledger
        .iter()
        .filter(|row| row.user_id == user_id && row.week == week)
        .map(WeeklyLessonCompletion::lesson_count)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn monday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 12, 9, 0, 0).unwrap()
    }

    #[test]
    fn retried_completion_only_advances_last_lesson_at() {
        let user = UserId::new();
        let lesson = LessonId::new();
        let at = monday_morning();
        let mut row = WeeklyLessonCompletion::first(user, CourseId::new(), lesson, at);

        let later = at + Duration::hours(2);
        assert!(!row.record(lesson, later));
        assert_eq!(row.lesson_count(), 1);
        assert_eq!(row.last_lesson_at, later);

        // An older retry never moves the timestamp backwards.
        assert!(!row.record(lesson, at - Duration::hours(1)));
        assert_eq!(row.last_lesson_at, later);
    }

    #[test]
    fn lessons_in_week_sums_across_courses_for_one_user() {
        let user = UserId::new();
        let other = UserId::new();
        let at = monday_morning();

        let mut a = WeeklyLessonCompletion::first(user, CourseId::new(), LessonId::new(), at);
        a.record(LessonId::new(), at);
        let b = WeeklyLessonCompletion::first(user, CourseId::new(), LessonId::new(), at);
        let next_week = WeeklyLessonCompletion::first(user, CourseId::new(), LessonId::new(), at + Duration::weeks(1));
        let someone_else = WeeklyLessonCompletion::first(other, CourseId::new(), LessonId::new(), at);

        let ledger = vec![a, b, next_week, someone_else];
        assert_eq!(lessons_in_week(&ledger, user, WeekKey::containing(at)), 3);
    }
}
