//! Network reachability probe.
//!
//! There is no portable OS reachability API, so the monitor periodically
//! opens a TCP connection to a well-known host and publishes the result.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info};

use crate::models::ConnectivityState;

/// Default probe target: the Firestore API host
pub const DEFAULT_PROBE_ADDR: &str = "firestore.googleapis.com:443";

pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Attempt one TCP connection to `addr`
pub async fn probe(addr: &str, limit: Duration) -> ConnectivityState {
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => ConnectivityState::Connected,
        Ok(Err(e)) => {
            debug!(addr, error = %e, "Connectivity probe failed");
            ConnectivityState::Disconnected
        }
        Err(_) => {
            debug!(addr, "Connectivity probe timed out");
            ConnectivityState::Disconnected
        }
    }
}

/// Background probe task. Dropping the monitor stops it.
pub struct ConnectivityMonitor {
    rx: watch::Receiver<ConnectivityState>,
    task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    /// Start probing `probe_addr` every `interval`. The first probe runs
    /// immediately; until it completes the state is `Unknown`.
    pub fn spawn(probe_addr: impl Into<String>, interval: Duration) -> Self {
        let addr = probe_addr.into();
        let (tx, rx) = watch::channel(ConnectivityState::Unknown);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let state = probe(&addr, PROBE_TIMEOUT.min(interval)).await;
                let changed = tx.send_if_modified(|current| {
                    if *current == state {
                        false
                    } else {
                        *current = state;
                        true
                    }
                });
                if changed {
                    info!(addr = %addr, %state, "Connectivity changed");
                }
                if tx.is_closed() {
                    break;
                }
            }
        });

        Self { rx, task }
    }

    /// Receiver that wakes on every connectivity change
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.rx.clone()
    }

    pub fn current(&self) -> ConnectivityState {
        *self.rx.borrow()
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
