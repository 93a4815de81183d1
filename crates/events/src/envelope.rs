use serde::{Deserialize, Serialize};
use uuid::Uuid;

use learnstreak_core::UserId;

use crate::event::Event;

/// Envelope for an event, carrying the learner it concerns plus stream metadata.
///
/// Notes:
/// - Every envelope is scoped to exactly one `user_id`; consumers never see
///   cross-user batches.
/// - `sequence_number` is the user's streak version after the committed operation,
///   so it is monotonically non-decreasing per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    user_id: UserId,
    stream: String,

    /// Position of the committing operation in the user's stream.
    sequence_number: u64,

    payload: E,
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap `payload` under a fresh time-ordered id, addressed to its learner.
    pub fn wrap(stream: impl Into<String>, sequence_number: u64, payload: E) -> Self {
        Self::new(Uuid::now_v7(), payload.user_id(), stream, sequence_number, payload)
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        user_id: UserId,
        stream: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            user_id,
            stream: stream.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
