use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use learnstreak_core::{CourseId, ExpectedVersion, LessonId, UserId, Versioned, WeekKey};
use learnstreak_progress::{
    Achievement, LessonCompletion, PointsEntry, StreakRecovery, UserStreak, UserStreakBadge,
    WeeklyLessonCompletion,
};

use super::r#trait::{ProgressStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    weekly: BTreeMap<(UserId, CourseId, WeekKey), WeeklyLessonCompletion>,
    lessons: BTreeMap<(UserId, LessonId), LessonCompletion>,
    streaks: HashMap<UserId, UserStreak>,
    recoveries: HashMap<UserId, Vec<StreakRecovery>>,
    points: HashMap<UserId, Vec<PointsEntry>>,
    achievements: HashMap<UserId, Vec<Achievement>>,
    badges: HashMap<UserId, Vec<UserStreakBadge>>,
}

impl Tables {
    fn stored_version(&self, user_id: UserId) -> u64 {
        self.streaks.get(&user_id).map(|s| s.version()).unwrap_or(0)
    }

    fn put_streak(&mut self, streak: &UserStreak, expected: ExpectedVersion) -> Result<u64, StoreError> {
        let current = self.stored_version(streak.user_id());
        let next = expected
            .next(current)
            .map_err(|err| StoreError::Conflict(err.to_string()))?;
        let mut saved = streak.clone();
        saved.set_version(next);
        self.streaks.insert(saved.user_id(), saved);
        Ok(next)
    }
}

/// In-memory progress store.
///
/// Intended for tests/dev. All tables sit behind one lock, so multi-row writes
/// (a row plus its reward) are atomic. `set_available(false)` simulates an outage.
#[derive(Debug)]
pub struct InMemoryProgressStore {
    tables: RwLock<Tables>,
    available: AtomicBool,
}

impl Default for InMemoryProgressStore {
    fn default() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store is offline".to_string()))
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.ensure_available()?;
        self.tables
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.ensure_available()?;
        self.tables
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }
}

impl ProgressStore for InMemoryProgressStore {
    fn upsert_weekly_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Result<WeeklyLessonCompletion, StoreError> {
        let mut tables = self.write()?;
        let key = (user_id, course_id, WeekKey::containing(at));
        let row = tables
            .weekly
            .entry(key)
            .and_modify(|row| {
                row.record(lesson_id, at);
            })
            .or_insert_with(|| WeeklyLessonCompletion::first(user_id, course_id, lesson_id, at));
        Ok(row.clone())
    }

    fn list_weekly_completions(&self, user_id: UserId) -> Result<Vec<WeeklyLessonCompletion>, StoreError> {
        let tables = self.read()?;
        let mut rows: Vec<_> = tables
            .weekly
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.week, row.first_lesson_at));
        Ok(rows)
    }

    fn insert_lesson_completion_if_absent(
        &self,
        completion: &LessonCompletion,
        reward: &PointsEntry,
    ) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let key = (completion.user_id, completion.lesson_id);
        if tables.lessons.contains_key(&key) {
            return Ok(false);
        }
        tables.lessons.insert(key, completion.clone());
        if reward.points_earned > 0 {
            tables.points.entry(reward.user_id).or_default().push(reward.clone());
        }
        Ok(true)
    }

    fn list_lesson_completions(&self, user_id: UserId) -> Result<Vec<LessonCompletion>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .lessons
            .range((user_id, LessonId::min())..)
            .take_while(|((owner, _), _)| *owner == user_id)
            .map(|(_, completion)| completion.clone())
            .collect())
    }

    fn load_streak(&self, user_id: UserId) -> Result<Option<UserStreak>, StoreError> {
        Ok(self.read()?.streaks.get(&user_id).cloned())
    }

    fn save_streak(&self, streak: &UserStreak, expected: ExpectedVersion) -> Result<u64, StoreError> {
        self.write()?.put_streak(streak, expected)
    }

    fn save_streak_with_recovery(
        &self,
        streak: &UserStreak,
        expected: ExpectedVersion,
        record: &StreakRecovery,
    ) -> Result<Option<u64>, StoreError> {
        let mut tables = self.write()?;
        let exists = tables
            .recoveries
            .get(&record.user_id)
            .is_some_and(|rows| rows.iter().any(|r| r.break_week == record.break_week));
        if exists {
            return Ok(None);
        }
        let version = tables.put_streak(streak, expected)?;
        tables.recoveries.entry(record.user_id).or_default().push(record.clone());
        Ok(Some(version))
    }

    fn list_recoveries(&self, user_id: UserId) -> Result<Vec<StreakRecovery>, StoreError> {
        Ok(self.read()?.recoveries.get(&user_id).cloned().unwrap_or_default())
    }

    fn list_points(&self, user_id: UserId) -> Result<Vec<PointsEntry>, StoreError> {
        Ok(self.read()?.points.get(&user_id).cloned().unwrap_or_default())
    }

    fn insert_achievement_if_absent(
        &self,
        achievement: &Achievement,
        reward: Option<&PointsEntry>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let key = achievement.key();
        let granted = tables.achievements.entry(achievement.user_id).or_default();
        if granted.iter().any(|a| a.key() == key) {
            return Ok(false);
        }
        granted.push(achievement.clone());
        if let Some(reward) = reward.filter(|r| r.points_earned > 0) {
            tables.points.entry(reward.user_id).or_default().push(reward.clone());
        }
        Ok(true)
    }

    fn list_achievements(&self, user_id: UserId) -> Result<Vec<Achievement>, StoreError> {
        Ok(self.read()?.achievements.get(&user_id).cloned().unwrap_or_default())
    }

    fn insert_badge_if_absent(&self, badge: &UserStreakBadge) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let badges = tables.badges.entry(badge.user_id).or_default();
        if badges.iter().any(|b| b.level == badge.level) {
            return Ok(false);
        }
        badges.push(badge.clone());
        Ok(true)
    }

    fn list_badges(&self, user_id: UserId) -> Result<Vec<UserStreakBadge>, StoreError> {
        Ok(self.read()?.badges.get(&user_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use learnstreak_progress::{AchievementType, MilestoneRule, PointsReason};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 6, 12, 0, 0).unwrap()
    }

    fn lesson_reward(user_id: UserId, lesson_id: LessonId) -> PointsEntry {
        PointsEntry {
            user_id,
            points_earned: 10,
            reason: PointsReason::LessonCompleted { lesson_id },
            created_at: at(),
        }
    }

    #[test]
    fn weekly_upsert_collapses_retries() {
        let store = InMemoryProgressStore::new();
        let user = UserId::new();
        let course = CourseId::new();
        let lesson = LessonId::new();

        store.upsert_weekly_completion(user, course, lesson, at()).unwrap();
        let row = store
            .upsert_weekly_completion(user, course, lesson, at() + Duration::hours(1))
            .unwrap();

        assert_eq!(row.lesson_count(), 1);
        assert_eq!(row.last_lesson_at, at() + Duration::hours(1));
        assert_eq!(store.list_weekly_completions(user).unwrap().len(), 1);
    }

    #[test]
    fn first_completion_pays_out_once() {
        let store = InMemoryProgressStore::new();
        let user = UserId::new();
        let lesson = LessonId::new();
        let completion = LessonCompletion {
            user_id: user,
            course_id: CourseId::new(),
            lesson_id: lesson,
            completed_at: at(),
        };

        assert!(store.insert_lesson_completion_if_absent(&completion, &lesson_reward(user, lesson)).unwrap());
        assert!(!store.insert_lesson_completion_if_absent(&completion, &lesson_reward(user, lesson)).unwrap());
        assert_eq!(store.list_points(user).unwrap().len(), 1);
        assert_eq!(store.list_lesson_completions(user).unwrap().len(), 1);
        assert!(store.list_lesson_completions(UserId::new()).unwrap().is_empty());
    }

    #[test]
    fn streak_saves_are_versioned() {
        let store = InMemoryProgressStore::new();
        let user = UserId::new();
        let streak = UserStreak::new(user, 3, at());

        assert_eq!(store.save_streak(&streak, ExpectedVersion::Exact(0)).unwrap(), 1);
        let err = store.save_streak(&streak, ExpectedVersion::Exact(0)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let loaded = store.load_streak(user).unwrap().unwrap();
        assert_eq!(loaded.version(), 1);
        assert_eq!(store.save_streak(&loaded, ExpectedVersion::Exact(1)).unwrap(), 2);
    }

    #[test]
    fn duplicate_achievement_is_silent_and_unpaid() {
        let store = InMemoryProgressStore::new();
        let user = UserId::new();
        let rule = MilestoneRule::new(AchievementType::LessonCount, 1, "First Lesson", 10);
        let reward = PointsEntry {
            user_id: user,
            points_earned: rule.points,
            reason: PointsReason::Achievement {
                achievement_type: rule.achievement_type,
                threshold: rule.threshold,
            },
            created_at: at(),
        };

        let first = Achievement::grant(&rule, user, at());
        let again = Achievement::grant(&rule, user, at() + Duration::minutes(5));
        assert!(store.insert_achievement_if_absent(&first, Some(&reward)).unwrap());
        assert!(!store.insert_achievement_if_absent(&again, Some(&reward)).unwrap());

        assert_eq!(store.list_achievements(user).unwrap(), vec![first]);
        assert_eq!(store.list_points(user).unwrap().len(), 1);
    }

    #[test]
    fn points_arrive_only_with_the_row_that_earns_them() {
        let store = InMemoryProgressStore::new();
        let user = UserId::new();
        let lesson = LessonId::new();
        let unpaid = MilestoneRule::new(AchievementType::PointsTotal, 1000, "1,000 Points", 0);

        assert!(store.insert_achievement_if_absent(&Achievement::grant(&unpaid, user, at()), None).unwrap());
        assert!(store.list_points(user).unwrap().is_empty());

        let completion = LessonCompletion {
            user_id: user,
            course_id: CourseId::new(),
            lesson_id: lesson,
            completed_at: at(),
        };
        store.insert_lesson_completion_if_absent(&completion, &lesson_reward(user, lesson)).unwrap();
        assert_eq!(store.list_points(user).unwrap(), vec![lesson_reward(user, lesson)]);
    }

    #[test]
    fn recovery_row_is_unique_per_break() {
        let store = InMemoryProgressStore::new();
        let user = UserId::new();
        let streak = UserStreak::new(user, 1, at());
        let record = StreakRecovery {
            user_id: user,
            break_week: WeekKey::containing(at()),
            original_streak_lost: 2,
            recovered_at: at(),
        };

        assert_eq!(store.save_streak_with_recovery(&streak, ExpectedVersion::Any, &record).unwrap(), Some(1));
        assert_eq!(store.save_streak_with_recovery(&streak, ExpectedVersion::Any, &record).unwrap(), None);
        assert_eq!(store.list_recoveries(user).unwrap().len(), 1);
        assert_eq!(store.load_streak(user).unwrap().map(|s| s.version()), Some(1));
    }

    #[test]
    fn offline_store_reports_unavailable() {
        let store = InMemoryProgressStore::new();
        store.set_available(false);
        assert!(matches!(store.load_streak(UserId::new()), Err(StoreError::Unavailable(_))));

        store.set_available(true);
        assert_eq!(store.load_streak(UserId::new()), Ok(None));
    }
}
