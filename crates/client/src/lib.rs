//! `learnstreak-client`
//!
//! **Responsibility:** client-side progress access with a local fallback.
//!
//! This crate provides:
//! - Read-through progress snapshots (stale cache served when the server is down)
//! - Write-through lesson completions (deferred as pending writes when it is down)
//! - Server-wins reconciliation on the next successful contact
//!
//! The server stays the authority; the cache never merges or replays on its own.

pub mod cache;
pub mod client;
pub mod config;
pub mod offline;
pub mod primary;
pub mod types;

pub use cache::{FallbackCache, InMemoryProgressCache, SqliteProgressCache};
pub use client::{ClientError, ProgressClient, ResubmitSummary};
pub use config::ClientConfig;
pub use offline::OfflineMode;
pub use primary::{EngineBackend, PrimaryError, PrimaryStore};
pub use types::{CachedProgress, ConnectivityState, Freshness, PendingWrite, ProgressView, WriteOutcome};
