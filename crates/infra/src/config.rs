//! Engine configuration.
//!
//! Loaded from `LEARNSTREAK_*` environment variables; every field has a default so
//! an empty environment yields a working engine.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use learnstreak_core::DomainError;
use learnstreak_progress::{RuleTable, StreakPolicy};

pub const WEEKLY_GOAL_VAR: &str = "LEARNSTREAK_WEEKLY_GOAL";
pub const GRACE_PERIOD_DAYS_VAR: &str = "LEARNSTREAK_GRACE_PERIOD_DAYS";
pub const RECOVERY_WINDOW_DAYS_VAR: &str = "LEARNSTREAK_RECOVERY_WINDOW_DAYS";
pub const POINTS_PER_LESSON_VAR: &str = "LEARNSTREAK_POINTS_PER_LESSON";
pub const RULE_TABLE_VERSION_VAR: &str = "LEARNSTREAK_RULE_TABLE_VERSION";

/// Upper bound for the grace period and the recovery window.
pub const MAX_WINDOW_DAYS: u32 = 365;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Goal assigned to learners who never set one.
    pub weekly_goal: u32,
    pub grace_period_days: u32,
    pub recovery_window_days: u32,
    /// Awarded on the first-ever completion of each lesson.
    pub points_per_lesson: u32,
    pub rule_table_version: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weekly_goal: 3,
            grace_period_days: 7,
            recovery_window_days: 7,
            points_per_lesson: 10,
            rule_table_version: RuleTable::CURRENT_VERSION,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            weekly_goal: parse_u32(&lookup, WEEKLY_GOAL_VAR, defaults.weekly_goal)?,
            grace_period_days: parse_u32(&lookup, GRACE_PERIOD_DAYS_VAR, defaults.grace_period_days)?,
            recovery_window_days: parse_u32(&lookup, RECOVERY_WINDOW_DAYS_VAR, defaults.recovery_window_days)?,
            points_per_lesson: parse_u32(&lookup, POINTS_PER_LESSON_VAR, defaults.points_per_lesson)?,
            rule_table_version: parse_u32(&lookup, RULE_TABLE_VERSION_VAR, defaults.rule_table_version)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.weekly_goal == 0 {
            return Err(ConfigError::Invalid {
                key: WEEKLY_GOAL_VAR,
                value: self.weekly_goal.to_string(),
                reason: "weekly goal must be at least 1".to_string(),
            });
        }
        for (key, days) in [
            (GRACE_PERIOD_DAYS_VAR, self.grace_period_days),
            (RECOVERY_WINDOW_DAYS_VAR, self.recovery_window_days),
        ] {
            if days > MAX_WINDOW_DAYS {
                return Err(ConfigError::Invalid {
                    key,
                    value: days.to_string(),
                    reason: format!("must be at most {MAX_WINDOW_DAYS} days"),
                });
            }
        }
        self.rule_table()?;
        Ok(())
    }

    pub fn policy(&self) -> Result<StreakPolicy, ConfigError> {
        Ok(StreakPolicy::new(
            self.weekly_goal,
            Duration::days(i64::from(self.grace_period_days)),
            Duration::days(i64::from(self.recovery_window_days)),
        )?)
    }

    pub fn rule_table(&self) -> Result<RuleTable, ConfigError> {
        Ok(RuleTable::for_version(self.rule_table_version)?)
    }
}

fn parse_u32(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u32,
) -> Result<u32, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
