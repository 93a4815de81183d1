//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. A
/// [`WeekKey`](crate::WeekKey) or a milestone threshold is a value object; a
/// `UserStreak` (identified by its user) is not.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
