//! Persistence boundary for the progress tables.
//!
//! The store owns the uniqueness guarantees every grant relies on: ledger rows,
//! first completions, achievements, badges and recoveries are all written through
//! insert-if-absent primitives, so retries and concurrent writers never duplicate.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryProgressStore;
pub use r#trait::{ProgressStore, StoreError};
