use chrono::Duration;

use learnstreak_core::{DomainError, DomainResult};

/// Tunable streak rules.
///
/// Thresholds and windows are configuration, not law; the infra layer builds this
/// from `EngineConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakPolicy {
    /// Lessons per week assigned to a learner who has not chosen a goal.
    pub default_weekly_goal: u32,
    /// How long a streak stays AT_RISK after the first missed week has ended.
    pub grace_period: Duration,
    /// How long a BROKEN streak may still be recovered.
    pub recovery_window: Duration,
}

impl StreakPolicy {
    pub fn new(
        default_weekly_goal: u32,
        grace_period: Duration,
        recovery_window: Duration,
    ) -> DomainResult<Self> {
        if default_weekly_goal == 0 {
            return Err(DomainError::validation("weekly goal must be at least 1"));
        }
        if grace_period < Duration::zero() || recovery_window < Duration::zero() {
            return Err(DomainError::validation("grace and recovery windows cannot be negative"));
        }
        Ok(Self {
            default_weekly_goal,
            grace_period,
            recovery_window,
        })
    }
}

impl Default for StreakPolicy {
    fn default() -> Self {
        Self {
            default_weekly_goal: 3,
            grace_period: Duration::days(7),
            recovery_window: Duration::days(7),
        }
    }
}
