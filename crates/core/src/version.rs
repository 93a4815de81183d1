//! Optimistic concurrency for the per-learner streak row.

use crate::error::{DomainError, DomainResult};

/// State persisted under a version counter. Version `0` means never saved.
pub trait Versioned {
    fn version(&self) -> u64;

    /// Expectation that the stored copy is still the one this value was loaded from.
    fn expected_version(&self) -> ExpectedVersion {
        ExpectedVersion::Exact(self.version())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Overwrite unconditionally (admin repair, seeding).
    Any,
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(expected) => expected == actual,
        }
    }

    /// Version to store on success.
    pub fn next(self, actual: u64) -> DomainResult<u64> {
        if self.matches(actual) {
            Ok(actual + 1)
        } else {
            Err(DomainError::conflict(format!(
                "streak was updated concurrently (expected {self:?}, found version {actual})"
            )))
        }
    }
}
