//! Connectivity tracking.

use chrono::{DateTime, Utc};

pub use crate::types::ConnectivityState;

/// Connectivity as observed from server calls.
#[derive(Debug)]
pub struct OfflineMode {
    state: ConnectivityState,
    changed_at: Option<DateTime<Utc>>,
}

impl Default for OfflineMode {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineMode {
    pub fn new() -> Self {
        Self {
            state: ConnectivityState::Online,
            changed_at: None,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// When the state last flipped.
    pub fn changed_at(&self) -> Option<DateTime<Utc>> {
        self.changed_at
    }

    /// Mark the client as offline. Returns `true` if this is a transition.
    pub fn set_offline(&mut self) -> bool {
        self.transition(ConnectivityState::Offline)
    }

    /// Mark the client as online. Returns `true` if this is a transition.
    pub fn set_online(&mut self) -> bool {
        self.transition(ConnectivityState::Online)
    }

    pub fn is_offline(&self) -> bool {
        self.state == ConnectivityState::Offline
    }

    fn transition(&mut self, to: ConnectivityState) -> bool {
        if self.state == to {
            return false;
        }
        self.state = to;
        self.changed_at = Some(Utc::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_reported_once() {
        let mut mode = OfflineMode::new();
        assert!(!mode.set_online());
        assert!(mode.set_offline());
        assert!(!mode.set_offline());
        assert!(mode.is_offline());
        assert!(mode.changed_at().is_some());
        assert!(mode.set_online());
        assert_eq!(mode.state(), ConnectivityState::Online);
    }
}
