use std::fmt;

use serde::{Deserialize, Serialize};

/// Latest known network reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectivityState {
    Connected,
    Disconnected,
    #[default]
    Unknown,
}

impl ConnectivityState {
    /// Map a platform reachability flag where `None` means "not determined yet"
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => ConnectivityState::Connected,
            Some(false) => ConnectivityState::Disconnected,
            None => ConnectivityState::Unknown,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectivityState::Connected)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityState::Connected => write!(f, "Connected"),
            ConnectivityState::Disconnected => write!(f, "Disconnected"),
            ConnectivityState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Which source currently feeds the in-memory snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// No connectivity signal received yet
    #[default]
    Idle,
    /// Subscribed to the remote store
    Live,
    /// Connected, but the subscription failed and awaits the next transition
    Stalled,
    /// Serving the last persisted snapshot
    Offline,
}

impl SyncMode {
    pub fn label(&self) -> &'static str {
        match self {
            SyncMode::Idle => "Starting",
            SyncMode::Live => "Live",
            SyncMode::Stalled => "Sync paused",
            SyncMode::Offline => "Offline",
        }
    }
}
