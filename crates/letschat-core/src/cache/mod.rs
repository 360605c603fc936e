//! Local caching module for offline message access.
//!
//! This module provides the `LocalStore` backends (`FileStore` on disk,
//! `MemoryStore` in process) and the typed `SnapshotCache` that persists the
//! latest known-good message snapshot as JSON together with the time it was
//! cached.

pub mod manager;
pub mod store;

pub use manager::{age_display, CachedData, SnapshotCache, MESSAGES_KEY};
pub use store::{FileStore, LocalStore, MemoryStore};
