//! Infrastructure layer: store boundary, catalog, clock, configuration and the
//! `StreakEngine` service that composes them.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod locks;
pub mod store;


pub use catalog::{Catalog, InMemoryCatalog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig};
pub use engine::{CompletionOutcome, EngineError, RecoveryOutcome, StreakEngine};
pub use locks::UserLocks;
pub use store::{InMemoryProgressStore, ProgressStore, StoreError};
