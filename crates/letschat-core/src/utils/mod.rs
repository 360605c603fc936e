//! Utility functions for message formatting.

pub mod format;

pub use format::{format_timestamp, map_url, message_preview, truncate_string};
