use chrono::{DateTime, Utc};

use learnstreak_core::UserId;

/// A fact about one learner's progress, published after it was committed.
///
/// `event_type` names are dotted (`streak.broken`) and stable across releases;
/// a payload change bumps `version` instead of renaming the type.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Business time of the change.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// The learner the event concerns; envelopes are routed by it.
    fn user_id(&self) -> UserId;
}
