//! Recovery manager.
//!
//! `ACTIVE → AT_RISK → BROKEN`, with a single escape hatch back to `ACTIVE`. A
//! break may be recovered once; the learner has to break a streak again before
//! another recovery becomes available.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use learnstreak_core::{UserId, WeekKey};

use crate::policy::StreakPolicy;
use crate::streak::{StreakState, UserStreak};

/// Append-only history row: one per recovery used. Unique per `(user_id, break_week)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakRecovery {
    pub user_id: UserId,
    pub break_week: WeekKey,
    pub original_streak_lost: u32,
    pub recovered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    #[error("streak is active; there is no break to recover")]
    NoActiveBreak,
    #[error("recovery for this break was already used")]
    AlreadyUsed,
    #[error("recovery window closed at {expired_at}")]
    WindowExpired { expired_at: DateTime<Utc> },
}

/// Outcome of a successful recovery decision: the restored streak plus the
/// history row to append alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryGrant {
    pub streak: UserStreak,
    pub record: StreakRecovery,
}

/// Decide whether `streak` may be recovered at `now`.
///
/// `streak` must already be advanced to `now`. The returned streak credits the week
/// before `now` so the next advance does not immediately re-detect the same break.
pub fn attempt_recovery(
    streak: &UserStreak,
    now: DateTime<Utc>,
    policy: &StreakPolicy,
) -> Result<RecoveryGrant, RecoveryError> {
    let break_week = match streak.state {
        StreakState::Active if streak.recovered_break.is_some() => {
            return Err(RecoveryError::AlreadyUsed);
        }
        StreakState::Active => return Err(RecoveryError::NoActiveBreak),
        StreakState::AtRisk | StreakState::Broken => {
            streak.current_break.ok_or(RecoveryError::NoActiveBreak)?
        }
    };

    // Only a credited week clears the marker; a second break without one stays unrecoverable.
    if streak.recovered_break.is_some() {
        return Err(RecoveryError::AlreadyUsed);
    }

    let restored = match streak.state {
        StreakState::Broken => {
            if let Some(expired_at) = streak.recovery_deadline(policy) {
                if now > expired_at {
                    return Err(RecoveryError::WindowExpired { expired_at });
                }
            }
            streak.streak_before_break
        }
        _ => streak.current_streak,
    };

    let mut next = streak.clone();
    next.current_streak = restored;
    next.longest_streak = next.longest_streak.max(restored);
    next.state = StreakState::Active;
    next.last_credited_week = Some(WeekKey::containing(now).prev());
    next.broken_at = None;
    next.recovered_break = Some(break_week);

    let record = StreakRecovery {
        user_id: streak.user_id,
        break_week,
        original_streak_lost: restored,
        recovered_at: now,
    };

    Ok(RecoveryGrant { streak: next, record })
}

impl UserStreak {
    /// Whether [`attempt_recovery`] would succeed at `now`.
    pub fn recovery_available(&self, now: DateTime<Utc>, policy: &StreakPolicy) -> bool {
        attempt_recovery(self, now, policy).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::WeeklyLessonCompletion;
    use chrono::{Duration, TimeZone};
    use learnstreak_core::{CourseId, LessonId};

    fn week_one() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap()
    }

    /// A two-week streak (goal 1) credited in weeks 1 and 2.
    fn two_week_streak() -> (UserStreak, Vec<WeeklyLessonCompletion>) {
        let policy = StreakPolicy::default();
        let user = UserId::new();
        let course = CourseId::new();
        let mut ledger = Vec::new();
        let mut streak = UserStreak::new(user, 1, week_one());
        for w in 0..2 {
            let at = week_one() + Duration::weeks(w);
            ledger.push(WeeklyLessonCompletion::first(user, course, LessonId::new(), at));
            streak = streak.advance(&ledger, at, &policy);
        }
        assert_eq!(streak.current_streak(), 2);
        (streak, ledger)
    }

    #[test]
    fn active_streak_has_no_break_to_recover() {
        let (streak, _) = two_week_streak();
        let err = attempt_recovery(&streak, week_one() + Duration::weeks(1), &StreakPolicy::default()).unwrap_err();
        assert_eq!(err, RecoveryError::NoActiveBreak);
    }

    #[test]
    fn at_risk_streak_recovers_and_second_attempt_is_rejected() {
        let policy = StreakPolicy::default();
        let (streak, ledger) = two_week_streak();
        let now = week_one() + Duration::weeks(3);
        let at_risk = streak.advance(&ledger, now, &policy);
        assert_eq!(at_risk.state(), StreakState::AtRisk);
        assert!(at_risk.recovery_available(now, &policy));

        let grant = attempt_recovery(&at_risk, now, &policy).unwrap();
        assert_eq!(grant.streak.state(), StreakState::Active);
        assert_eq!(grant.streak.current_streak(), 2);
        assert_eq!(grant.record.original_streak_lost, 2);
        assert_eq!(grant.record.break_week, WeekKey::containing(now));

        // Advancing within the same week keeps the recovered streak alive.
        let later = grant.streak.advance(&ledger, now + Duration::days(2), &policy);
        assert_eq!(later.state(), StreakState::Active);
        assert_eq!(later.current_streak(), 2);

        assert_eq!(attempt_recovery(&later, now + Duration::days(2), &policy).unwrap_err(), RecoveryError::AlreadyUsed);
    }

    #[test]
    fn broken_streak_recovers_within_window() {
        let policy = StreakPolicy::default();
        let (streak, ledger) = two_week_streak();
        let now = week_one() + Duration::weeks(4) + Duration::days(1);
        let broken = streak.advance(&ledger, now, &policy);
        assert_eq!(broken.state(), StreakState::Broken);

        let grant = attempt_recovery(&broken, now, &policy).unwrap();
        assert_eq!(grant.streak.current_streak(), 2);
        assert_eq!(grant.streak.longest_streak(), 2);
        assert_eq!(grant.record.original_streak_lost, 2);
    }

    #[test]
    fn broken_streak_outside_window_is_expired() {
        let policy = StreakPolicy::default();
        let (streak, ledger) = two_week_streak();
        let now = week_one() + Duration::weeks(6);
        let broken = streak.advance(&ledger, now, &policy);
        assert_eq!(broken.state(), StreakState::Broken);

        match attempt_recovery(&broken, now, &policy) {
            Err(RecoveryError::WindowExpired { expired_at }) => {
                assert_eq!(Some(expired_at), broken.recovery_deadline(&policy));
            }
            other => panic!("expected WindowExpired, got {other:?}"),
        }
        assert!(!broken.recovery_available(now, &policy));
    }

    #[test]
    fn second_break_without_a_credited_week_is_not_recoverable() {
        let policy = StreakPolicy::default();
        let (streak, ledger) = two_week_streak();
        let first_break = week_one() + Duration::weeks(3);
        let recovered = attempt_recovery(&streak.advance(&ledger, first_break, &policy), first_break, &policy)
            .unwrap()
            .streak;

        // Nothing completed in the recovery week either: a fresh break follows.
        let second_break = first_break + Duration::weeks(1);
        let at_risk = recovered.advance(&ledger, second_break, &policy);
        assert_eq!(at_risk.state(), StreakState::AtRisk);
        assert_ne!(at_risk.current_break(), recovered.recovered_break());
        assert_eq!(attempt_recovery(&at_risk, second_break, &policy).unwrap_err(), RecoveryError::AlreadyUsed);

        let broken = at_risk.advance(&ledger, second_break + Duration::weeks(1), &policy);
        assert_eq!(broken.state(), StreakState::Broken);
        assert!(!broken.recovery_available(second_break + Duration::weeks(1), &policy));
    }

    #[test]
    fn a_credited_week_after_recovery_rearms_it() {
        let policy = StreakPolicy::default();
        let (streak, mut ledger) = two_week_streak();
        let user = streak.user_id();
        let first_break = week_one() + Duration::weeks(3);
        let recovered = attempt_recovery(&streak.advance(&ledger, first_break, &policy), first_break, &policy)
            .unwrap()
            .streak;

        let study = first_break + Duration::days(1);
        ledger.push(WeeklyLessonCompletion::first(user, CourseId::new(), LessonId::new(), study));
        let credited = recovered.advance(&ledger, study, &policy);
        assert_eq!(credited.current_streak(), 3);
        assert_eq!(credited.recovered_break(), None);

        let second_break = first_break + Duration::weeks(2);
        let at_risk = credited.advance(&ledger, second_break, &policy);
        assert_eq!(at_risk.state(), StreakState::AtRisk);
        assert!(attempt_recovery(&at_risk, second_break, &policy).is_ok());
    }

    #[test]
    fn meeting_the_goal_while_broken_starts_over() {
        let policy = StreakPolicy::default();
        let (streak, mut ledger) = two_week_streak();
        let user = streak.user_id();
        let now = week_one() + Duration::weeks(4) + Duration::days(1);
        let broken = streak.advance(&ledger, now, &policy);
        assert_eq!(broken.state(), StreakState::Broken);
        assert_eq!(
            broken.recovery_deadline(&policy),
            broken.broken_at().map(|at| at + policy.recovery_window)
        );

        ledger.push(WeeklyLessonCompletion::first(user, CourseId::new(), LessonId::new(), now));
        let restarted = broken.advance(&ledger, now, &policy);
        assert_eq!(restarted.state(), StreakState::Active);
        assert_eq!(restarted.current_streak(), 1);
        assert_eq!(restarted.longest_streak(), 2);
        assert_eq!(restarted.recovery_deadline(&policy), None);
        assert_eq!(attempt_recovery(&restarted, now, &policy).unwrap_err(), RecoveryError::NoActiveBreak);
    }
}
