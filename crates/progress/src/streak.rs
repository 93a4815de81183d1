//! Streak calculator.
//!
//! A streak counts consecutive ISO weeks in which the learner met their weekly
//! lesson goal. `UserStreak` is the only mutable aggregate in the domain; it is
//! evolved exclusively through [`UserStreak::advance`] and the recovery manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use learnstreak_core::{DomainError, DomainResult, UserId, Versioned, WeekKey};

use crate::ledger::{WeeklyLessonCompletion, lessons_in_week};
use crate::policy::StreakPolicy;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreakState {
    /// No complete week has been missed since the last credited week.
    Active,
    /// A week was missed; the grace period is still running.
    AtRisk,
    /// The grace period elapsed; `current_streak` was reset.
    Broken,
}

impl StreakState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreakState::Active => "ACTIVE",
            StreakState::AtRisk => "AT_RISK",
            StreakState::Broken => "BROKEN",
        }
    }
}

/// Aggregate root: one streak record per learner.
///
/// Invariants:
/// - `current_streak <= longest_streak`
/// - `longest_streak` never decreases
/// - `lessons_completed_this_week` is recomputed from the ledger on every advance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStreak {
    pub(crate) user_id: UserId,
    pub(crate) current_streak: u32,
    pub(crate) longest_streak: u32,
    pub(crate) weekly_goal: u32,
    pub(crate) lessons_completed_this_week: u32,
    pub(crate) week_start: WeekKey,
    pub(crate) last_activity: Option<DateTime<Utc>>,
    pub(crate) state: StreakState,
    /// Last week that counted toward the streak (or was credited by a recovery).
    pub(crate) last_credited_week: Option<WeekKey>,
    /// Week identifying the outstanding break: the week after the first missed one.
    pub(crate) current_break: Option<WeekKey>,
    pub(crate) streak_before_break: u32,
    pub(crate) broken_at: Option<DateTime<Utc>>,
    /// Break restored by the last recovery. Cleared once a week is credited from the
    /// ledger, so a recovery is only available again after real progress.
    pub(crate) recovered_break: Option<WeekKey>,
    pub(crate) version: u64,
}

impl UserStreak {
    /// Fresh streak record, created lazily on a learner's first event.
    pub fn new(user_id: UserId, weekly_goal: u32, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            current_streak: 0,
            longest_streak: 0,
            weekly_goal: weekly_goal.max(1),
            lessons_completed_this_week: 0,
            week_start: WeekKey::containing(now),
            last_activity: None,
            state: StreakState::Active,
            last_credited_week: None,
            current_break: None,
            streak_before_break: 0,
            broken_at: None,
            recovered_break: None,
            version: 0,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn current_streak(&self) -> u32 {
        self.current_streak
    }

    pub fn longest_streak(&self) -> u32 {
        self.longest_streak
    }

    pub fn weekly_goal(&self) -> u32 {
        self.weekly_goal
    }

    pub fn lessons_completed_this_week(&self) -> u32 {
        self.lessons_completed_this_week
    }

    pub fn week_start(&self) -> WeekKey {
        self.week_start
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    pub fn state(&self) -> StreakState {
        self.state
    }

    pub fn last_credited_week(&self) -> Option<WeekKey> {
        self.last_credited_week
    }

    pub fn current_break(&self) -> Option<WeekKey> {
        self.current_break
    }

    pub fn streak_before_break(&self) -> u32 {
        self.streak_before_break
    }

    pub fn broken_at(&self) -> Option<DateTime<Utc>> {
        self.broken_at
    }

    pub fn recovered_break(&self) -> Option<WeekKey> {
        self.recovered_break
    }

    /// Set by the store after a successful versioned save.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub fn set_weekly_goal(&mut self, goal: u32) -> DomainResult<()> {
        if goal == 0 {
            return Err(DomainError::validation("weekly goal must be at least 1"));
        }
        self.weekly_goal = goal;
        Ok(())
    }

    /// When the grace period of the outstanding break ends, if there is one.
    pub fn grace_ends(&self, policy: &StreakPolicy) -> Option<DateTime<Utc>> {
        self.current_break.map(|week| week.start() + policy.grace_period)
    }

    /// Last instant a broken streak may still be recovered.
    pub fn recovery_deadline(&self, policy: &StreakPolicy) -> Option<DateTime<Utc>> {
        match self.state {
            StreakState::Broken => self.broken_at.map(|at| at + policy.recovery_window),
            _ => None,
        }
    }

    /// Pure transition: evaluate the streak at `now` against the learner's ledger.
    ///
    /// Deterministic given its inputs, so a failed write can be retried by replaying
    /// the same call. `now` is clamped to the start of the record's current week so
    /// a late event never moves the streak backwards in time.
    pub fn advance(
        &self,
        ledger: &[WeeklyLessonCompletion],
        now: DateTime<Utc>,
        policy: &StreakPolicy,
    ) -> UserStreak {
        let mut next = self.clone();
        let now = now.max(self.week_start.start());
        let week = WeekKey::containing(now);
        next.week_start = week;

        next.apply_decay(week, now, policy);

        next.lessons_completed_this_week = lessons_in_week(ledger, self.user_id, week);

        let latest = ledger
            .iter()
            .filter(|row| row.user_id == self.user_id)
            .map(|row| row.last_lesson_at)
            .max();
        next.last_activity = next.last_activity.max(latest);

        let already_credited = next.last_credited_week.is_some_and(|credited| credited >= week);
        if next.lessons_completed_this_week >= next.weekly_goal && !already_credited {
            next.credit(week);
        }

        next
    }

    fn apply_decay(&mut self, week: WeekKey, now: DateTime<Utc>, policy: &StreakPolicy) {
        let Some(credited) = self.last_credited_week else {
            return;
        };

        let missed_weeks = week.weeks_since(credited) - 1;
        if missed_weeks < 1 {
            self.state = StreakState::Active;
            return;
        }

        // The first missed week ends where the break week begins.
        let break_week = credited.offset(2);
        let grace_ends = break_week.start() + policy.grace_period;

        if now < grace_ends {
            self.state = StreakState::AtRisk;
            self.current_break = Some(break_week);
            return;
        }

        if self.state == StreakState::Broken && self.current_break == Some(break_week) {
            return;
        }

        self.streak_before_break = self.current_streak;
        self.current_streak = 0;
        self.state = StreakState::Broken;
        self.broken_at = Some(grace_ends);
        self.current_break = Some(break_week);
    }

    fn credit(&mut self, week: WeekKey) {
        self.current_streak += 1;
        self.longest_streak = self.longest_streak.max(self.current_streak);
        self.state = StreakState::Active;
        self.last_credited_week = Some(week);
        self.current_break = None;
        self.broken_at = None;
        self.recovered_break = None;
    }
}

impl Versioned for UserStreak {
    fn version(&self) -> u64 {
        self.version
    }
}
