//! Data models for chat entities.
//!
//! This module contains the data structures shared by the sync cache,
//! the persistence layer and the remote store:
//!
//! - `Message`, `ChatUser`, `GeoPoint`: chat messages and their attachments
//! - `Snapshot`: the full ordered message history at a point in time
//! - `ConnectivityState`, `SyncMode`: what feeds the snapshot
//! - `ChatColor`: start screen background colours

pub mod color;
pub mod connectivity;
pub mod message;
pub mod snapshot;

pub use color::ChatColor;
pub use connectivity::{ConnectivityState, SyncMode};
pub use message::{new_message_id, ChatUser, GeoPoint, Message, MessageContent, MessageError};
pub use snapshot::Snapshot;
