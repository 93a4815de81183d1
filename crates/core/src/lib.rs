//! `learnstreak-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, ISO calendar weeks and optimistic
//! concurrency expectations.

pub mod error;
pub mod id;
pub mod value_object;
pub mod version;
pub mod week;

pub use error::{DomainError, DomainResult};
pub use id::{AchievementId, CourseId, LessonId, UserId};
pub use value_object::ValueObject;
pub use version::{ExpectedVersion, Versioned};
pub use week::WeekKey;
