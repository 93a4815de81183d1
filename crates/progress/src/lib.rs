//! Learning progress domain (pure, deterministic).
//!
//! This crate contains the business rules of the streak & achievement engine:
//! the activity ledger rows, the streak calculator, the recovery state machine,
//! the milestone rule table and the read-facing progress view. No IO, no
//! storage, no clocks: every function takes the instant it evaluates at.

pub mod achievements;
pub mod events;
pub mod ledger;
pub mod points;
pub mod policy;
pub mod progress;
pub mod recovery;
pub mod streak;

pub use achievements::{
    Achievement, AchievementKey, AchievementType, BadgeLevel, Crossing, MilestoneProgress,
    MilestoneRule, RuleTable, UserStreakBadge,
};
pub use events::ProgressEvent;
pub use ledger::{LessonCompletion, WeeklyLessonCompletion, lessons_in_week};
pub use points::{PointsEntry, PointsReason, total_points};
pub use policy::StreakPolicy;
pub use progress::{ProgressData, StreakSnapshot, completion_percentage};
pub use recovery::{RecoveryError, RecoveryGrant, StreakRecovery, attempt_recovery};
pub use streak::{StreakState, UserStreak};
