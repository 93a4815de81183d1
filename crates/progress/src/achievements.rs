//! Achievement rule table.
//!
//! Milestones are a fixed, versioned table keyed by `(type, threshold)`. Deciding
//! which rules are satisfied is pure; the uniqueness guarantee that makes granting
//! idempotent lives in the store (`insert-if-absent` on [`AchievementKey`]).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use learnstreak_core::{AchievementId, DomainError, DomainResult, UserId, ValueObject};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementType {
    LessonCount,
    CourseCount,
    StreakLength,
    PointsTotal,
}

impl AchievementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementType::LessonCount => "lesson_count",
            AchievementType::CourseCount => "course_count",
            AchievementType::StreakLength => "streak_length",
            AchievementType::PointsTotal => "points_total",
        }
    }

    /// Key under which the milestone value is stored in `Achievement::metadata`.
    pub fn metadata_key(&self) -> &'static str {
        match self {
            AchievementType::LessonCount => "lessonCount",
            AchievementType::CourseCount => "courseCount",
            AchievementType::StreakLength => "streakWeeks",
            AchievementType::PointsTotal => "pointsTotal",
        }
    }

    pub fn is_points(&self) -> bool {
        matches!(self, AchievementType::PointsTotal)
    }
}

/// How a rule's threshold is compared with the learner's current value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crossing {
    /// Fires when the value equals the threshold (first crossing of a count).
    Exact,
    /// Fires whenever the value is at or above the threshold.
    AtLeast,
}

impl Crossing {
    pub fn is_satisfied(self, value: u64, threshold: u64) -> bool {
        match self {
            Crossing::Exact => value == threshold,
            Crossing::AtLeast => value >= threshold,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeLevel {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneRule {
    pub achievement_type: AchievementType,
    pub threshold: u64,
    pub title: String,
    pub points: u32,
    pub badge: Option<BadgeLevel>,
    pub crossing: Crossing,
}

impl ValueObject for MilestoneRule {}

impl MilestoneRule {
    pub fn new(achievement_type: AchievementType, threshold: u64, title: &str, points: u32) -> Self {
        let crossing = if achievement_type.is_points() {
            Crossing::AtLeast
        } else {
            Crossing::Exact
        };
        Self {
            achievement_type,
            threshold,
            title: title.to_string(),
            points,
            badge: None,
            crossing,
        }
    }

    pub fn with_badge(mut self, badge: BadgeLevel) -> Self {
        self.badge = Some(badge);
        self
    }
}

/// Aggregates the rule table is evaluated against.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct MilestoneProgress {
    pub lessons_completed: u64,
    pub courses_completed: u64,
    pub current_streak: u64,
    pub total_points: u64,
}

impl MilestoneProgress {
    pub fn value_for(&self, achievement_type: AchievementType) -> u64 {
        match achievement_type {
            AchievementType::LessonCount => self.lessons_completed,
            AchievementType::CourseCount => self.courses_completed,
            AchievementType::StreakLength => self.current_streak,
            AchievementType::PointsTotal => self.total_points,
        }
    }
}

/// Versioned milestone table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    version: u32,
    rules: Vec<MilestoneRule>,
}

impl RuleTable {
    pub const CURRENT_VERSION: u32 = 1;

    /// Build a table, rejecting duplicate `(type, threshold)` keys and points
    /// milestones that would award points (which would feed back into themselves).
    pub fn new(version: u32, rules: Vec<MilestoneRule>) -> DomainResult<Self> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert((rule.achievement_type, rule.threshold)) {
                return Err(DomainError::validation(format!(
                    "duplicate milestone {}={}",
                    rule.achievement_type.as_str(),
                    rule.threshold
                )));
            }
            if rule.achievement_type.is_points() && rule.points != 0 {
                return Err(DomainError::invariant(format!(
                    "points milestone {} must not award points",
                    rule.threshold
                )));
            }
            if rule.threshold == 0 {
                return Err(DomainError::validation("milestone threshold must be positive"));
            }
        }
        Ok(Self { version, rules })
    }

    pub fn for_version(version: u32) -> DomainResult<Self> {
        match version {
            1 => Ok(Self::v1()),
            other => Err(DomainError::validation(format!("unknown rule table version {other}"))),
        }
    }

    pub fn v1() -> Self {
        use AchievementType::*;
        let rules = vec![
            MilestoneRule::new(LessonCount, 1, "First Lesson", 10),
            MilestoneRule::new(LessonCount, 5, "Five Lessons", 25),
            MilestoneRule::new(LessonCount, 10, "Ten Lessons", 50),
            MilestoneRule::new(LessonCount, 25, "Quarter Century", 100),
            MilestoneRule::new(LessonCount, 50, "Half Century", 250),
            MilestoneRule::new(LessonCount, 100, "Centurion", 500),
            MilestoneRule::new(CourseCount, 1, "First Course Completed", 100),
            MilestoneRule::new(CourseCount, 3, "Three Courses", 300),
            MilestoneRule::new(CourseCount, 5, "Five Courses", 500),
            MilestoneRule::new(CourseCount, 10, "Ten Courses", 1000),
            MilestoneRule::new(CourseCount, 20, "Twenty Courses", 2000),
            MilestoneRule::new(StreakLength, 3, "Three Week Streak", 50).with_badge(BadgeLevel::Bronze),
            MilestoneRule::new(StreakLength, 7, "Seven Week Streak", 150).with_badge(BadgeLevel::Silver),
            MilestoneRule::new(StreakLength, 14, "Fourteen Week Streak", 300).with_badge(BadgeLevel::Gold),
            MilestoneRule::new(StreakLength, 30, "Thirty Week Streak", 750).with_badge(BadgeLevel::Platinum),
            MilestoneRule::new(StreakLength, 100, "Hundred Week Streak", 2500).with_badge(BadgeLevel::Diamond),
            MilestoneRule::new(PointsTotal, 100, "100 Points", 0),
            MilestoneRule::new(PointsTotal, 500, "500 Points", 0),
            MilestoneRule::new(PointsTotal, 1000, "1,000 Points", 0),
            MilestoneRule::new(PointsTotal, 2500, "2,500 Points", 0),
            MilestoneRule::new(PointsTotal, 5000, "5,000 Points", 0),
        ];
        Self {
            version: Self::CURRENT_VERSION,
            rules,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn rules(&self) -> &[MilestoneRule] {
        &self.rules
    }

    /// Rules satisfied by `progress`, optionally restricted to points rules or to
    /// everything else.
    pub fn satisfied<'a>(
        &'a self,
        progress: &'a MilestoneProgress,
        points_rules: bool,
    ) -> impl Iterator<Item = &'a MilestoneRule> + 'a {
        self.rules.iter().filter(move |rule| {
            rule.achievement_type.is_points() == points_rules
                && rule
                    .crossing
                    .is_satisfied(progress.value_for(rule.achievement_type), rule.threshold)
        })
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::v1()
    }
}

/// Uniqueness boundary for achievements.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AchievementKey {
    pub user_id: UserId,
    pub achievement_type: AchievementType,
    pub threshold: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: AchievementId,
    pub user_id: UserId,
    pub achievement_type: AchievementType,
    pub threshold: u64,
    pub title: String,
    pub points: u32,
    pub badge: Option<BadgeLevel>,
    /// Carries the milestone value, e.g. `{"lessonCount": 25}`.
    pub metadata: JsonValue,
    pub earned_at: DateTime<Utc>,
}

impl Achievement {
    pub fn grant(rule: &MilestoneRule, user_id: UserId, earned_at: DateTime<Utc>) -> Self {
        let mut metadata = serde_json::Map::new();
        metadata.insert(rule.achievement_type.metadata_key().to_string(), json!(rule.threshold));
        Self {
            id: AchievementId::new(),
            user_id,
            achievement_type: rule.achievement_type,
            threshold: rule.threshold,
            title: rule.title.clone(),
            points: rule.points,
            badge: rule.badge,
            metadata: JsonValue::Object(metadata),
            earned_at,
        }
    }

    pub fn key(&self) -> AchievementKey {
        AchievementKey {
            user_id: self.user_id,
            achievement_type: self.achievement_type,
            threshold: self.threshold,
        }
    }
}

/// Streak badge: at most one per `(user_id, level)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStreakBadge {
    pub user_id: UserId,
    pub level: BadgeLevel,
    pub earned_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_table_is_valid() {
        let table = RuleTable::v1();
        let rebuilt = RuleTable::new(table.version(), table.rules().to_vec());
        assert_eq!(rebuilt, Ok(table));
    }

    #[test]
    fn exact_count_rules_fire_only_on_the_crossing() {
        let table = RuleTable::v1();
        let at_three = MilestoneProgress {
            lessons_completed: 3,
            ..Default::default()
        };
        assert_eq!(table.satisfied(&at_three, false).count(), 0);

        let at_five = MilestoneProgress {
            lessons_completed: 5,
            ..Default::default()
        };
        let fired: Vec<_> = table.satisfied(&at_five, false).map(|r| r.threshold).collect();
        assert_eq!(fired, vec![5]);
    }

    #[test]
    fn points_rules_fire_for_every_threshold_reached() {
        let table = RuleTable::v1();
        let progress = MilestoneProgress {
            total_points: 1000,
            ..Default::default()
        };
        let fired: Vec<_> = table.satisfied(&progress, true).map(|r| r.threshold).collect();
        assert_eq!(fired, vec![100, 500, 1000]);
        assert!(table.satisfied(&progress, true).all(|r| r.points == 0));
    }

    #[test]
    fn points_rule_that_awards_points_is_rejected() {
        let mut rules = RuleTable::v1().rules().to_vec();
        rules.push(MilestoneRule::new(AchievementType::PointsTotal, 10_000, "Feedback", 5));
        assert!(matches!(RuleTable::new(2, rules), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn duplicate_milestones_are_rejected() {
        let mut rules = RuleTable::v1().rules().to_vec();
        rules.push(rules[0].clone());
        assert!(matches!(RuleTable::new(2, rules), Err(DomainError::Validation(_))));
    }

    #[test]
    fn unknown_table_version_is_rejected() {
        assert!(RuleTable::for_version(1).is_ok());
        assert!(RuleTable::for_version(7).is_err());
    }

    #[test]
    fn granted_achievement_carries_milestone_metadata() {
        let table = RuleTable::v1();
        let rule = &table.rules()[3];
        let user = UserId::new();
        let achievement = Achievement::grant(rule, user, Utc::now());
        assert_eq!(achievement.metadata, json!({ "lessonCount": 25 }));
        assert_eq!(
            achievement.key(),
            AchievementKey {
                user_id: user,
                achievement_type: AchievementType::LessonCount,
                threshold: 25,
            }
        );
    }
}
