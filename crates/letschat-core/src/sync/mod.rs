//! Connectivity-aware message synchronization.
//!
//! `SyncCacheManager` switches between a live remote subscription and the
//! persisted offline snapshot as connectivity changes, and writes every
//! remote snapshot back to the local cache.

pub mod manager;

pub use manager::{SyncCacheManager, SyncNotice, SyncStatus};
