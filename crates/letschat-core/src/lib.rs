//! Core library for letschat.
//!
//! Chat models, the connectivity-aware sync cache, local persistence, the
//! Firestore and loopback remote stores, anonymous auth, image upload and
//! the connectivity probe. The terminal UI lives in `letschat-tui`.

pub mod auth;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod media;
pub mod models;
pub mod remote;
pub mod sync;
pub mod utils;

pub use config::{Config, FirebaseSettings};
pub use error::{PersistenceError, SyncError};
pub use sync::{SyncCacheManager, SyncNotice, SyncStatus};
