use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch, Notify};
use tracing::{debug, info, warn};

use crate::cache::{CachedData, LocalStore, SnapshotCache};
use crate::error::SyncError;
use crate::models::{ConnectivityState, Message, Snapshot, SyncMode};
use crate::remote::{
    ApiError, RemoteStore, SnapshotCallback, SortDirection, SubscriptionHandle, ORDER_BY_FIELD,
};

/// Buffer size for the notice broadcast channel.
/// Notices are rare; slow readers only lose the oldest ones.
const NOTICE_CHANNEL_CAPACITY: usize = 32;

/// Non-fatal events worth showing to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
    SubscriptionFailed(String),
    PersistenceFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStatus {
    pub mode: SyncMode,
    pub connectivity: ConnectivityState,
    /// When the snapshot served in offline mode was captured for the cache
    pub cached_at: Option<DateTime<Utc>>,
}

struct SyncState {
    status: SyncStatus,
    subscription: Option<SubscriptionHandle>,
    /// Bumped on every mode change; callbacks and cache loads carry the
    /// generation they started in and are dropped once it moves on.
    generation: u64,
}

/// Sequenced fire-and-forget snapshot writes.
struct Persistence {
    cache: SnapshotCache,
    notices: broadcast::Sender<SyncNotice>,
    requested: AtomicU64,
    /// Newest snapshot handed to a write, with its capture time
    latest: Mutex<Option<CachedData<Arc<Snapshot>>>>,
    written: tokio::sync::Mutex<u64>,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl Persistence {
    fn spawn_write(self: &Arc<Self>, snapshot: Arc<Snapshot>) {
        let cached_at = Utc::now();
        let version = {
            let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
            *latest = Some(CachedData {
                data: Arc::clone(&snapshot),
                cached_at,
            });
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            self.requested.fetch_add(1, Ordering::SeqCst) + 1
        };

        let persistence = Arc::clone(self);
        tokio::spawn(async move {
            persistence.write(version, &snapshot, cached_at).await;
            if persistence.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                persistence.idle.notify_waiters();
            }
        });
    }

    async fn write(&self, version: u64, snapshot: &Snapshot, cached_at: DateTime<Utc>) {
        // One write at a time; anything older than the newest request is stale
        let mut written = self.written.lock().await;
        let latest = self.requested.load(Ordering::SeqCst);
        if version < latest || version <= *written {
            debug!(version, latest, "Skipping superseded snapshot write");
            return;
        }

        match self.cache.save_messages_at(snapshot, cached_at).await {
            Ok(()) => {
                *written = version;
                debug!(version, count = snapshot.len(), "Snapshot persisted");
            }
            Err(e) => {
                warn!(error = %e, version, "Failed to cache messages");
                let _ = self.notices.send(SyncNotice::PersistenceFailed(e.to_string()));
            }
        }
    }

    /// The snapshot that in-flight writes are persisting, if any are pending
    fn pending(&self) -> Option<CachedData<Arc<Snapshot>>> {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        if self.in_flight.load(Ordering::SeqCst) == 0 {
            return None;
        }
        latest.clone()
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct Shared {
    remote: Arc<dyn RemoteStore>,
    state: Mutex<SyncState>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    persistence: Arc<Persistence>,
}

/// Owns the in-memory message snapshot and decides what feeds it: a live
/// remote subscription while connected, the persisted cache otherwise.
///
/// Clones share state. The subscription is cancelled by `shutdown` or when
/// the last clone is dropped.
#[derive(Clone)]
pub struct SyncCacheManager {
    shared: Arc<Shared>,
}

impl SyncCacheManager {
    pub fn new(remote: Arc<dyn RemoteStore>, local: Arc<dyn LocalStore>) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::empty()));
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);

        let persistence = Arc::new(Persistence {
            cache: SnapshotCache::new(local),
            notices,
            requested: AtomicU64::new(0),
            latest: Mutex::new(None),
            written: tokio::sync::Mutex::new(0),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        Self {
            shared: Arc::new(Shared {
                remote,
                state: Mutex::new(SyncState {
                    status: SyncStatus::default(),
                    subscription: None,
                    generation: 0,
                }),
                snapshot_tx,
                persistence,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // Read side
    // =========================================================================

    /// Current snapshot, newest message first
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Receiver that observes every snapshot replacement
    pub fn watch_snapshot(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.lock_state().status
    }

    pub fn notices(&self) -> broadcast::Receiver<SyncNotice> {
        self.shared.persistence.notices.subscribe()
    }

    /// True while a remote subscription is active
    pub fn is_live(&self) -> bool {
        self.lock_state()
            .subscription
            .as_ref()
            .is_some_and(SubscriptionHandle::is_active)
    }

    // =========================================================================
    // Connectivity
    // =========================================================================

    pub async fn set_connectivity(&self, connectivity: ConnectivityState) {
        if connectivity.is_connected() {
            self.go_live();
        } else {
            self.go_offline(connectivity).await;
        }
    }

    fn go_live(&self) {
        let generation = {
            let mut state = self.lock_state();
            state.status.connectivity = ConnectivityState::Connected;
            if state.status.mode == SyncMode::Live {
                return;
            }
            // Leaving offline mode: invalidate pending cache loads
            state.generation += 1;
            state.status.mode = SyncMode::Live;
            state.status.cached_at = None;
            state.generation
        };

        info!(generation, "Starting live message subscription");
        // The remote may call back synchronously, so the state lock is
        // released while subscribing.
        let handle = self.shared.remote.subscribe(
            ORDER_BY_FIELD,
            SortDirection::Descending,
            self.callback_for(generation),
        );

        let mut state = self.lock_state();
        if state.generation == generation && state.status.mode == SyncMode::Live {
            state.subscription = Some(handle);
        } else {
            drop(state);
            debug!(generation, "Subscription superseded while starting, cancelling");
            drop(handle);
        }
    }

    async fn go_offline(&self, connectivity: ConnectivityState) {
        let (generation, subscription) = {
            let mut state = self.lock_state();
            state.status.connectivity = connectivity;
            if state.status.mode == SyncMode::Offline {
                return;
            }
            state.generation += 1;
            state.status.mode = SyncMode::Offline;
            (state.generation, state.subscription.take())
        };

        if let Some(mut handle) = subscription {
            handle.cancel();
            info!(%connectivity, "Live subscription cancelled");
        }

        // Pending writes hold a newer snapshot than the store; serve it
        // directly instead of waiting on them.
        let cached = match self.shared.persistence.pending() {
            Some(pending) => {
                debug!(count = pending.data.len(), "Serving snapshot with writes still pending");
                Some(pending)
            }
            None => self.load_cached().await,
        };

        let mut state = self.lock_state();
        if state.generation != generation {
            debug!(generation, "Discarding cache load from a superseded transition");
            return;
        }
        let (snapshot, cached_at) = match cached {
            Some(cached) => (cached.data, Some(cached.cached_at)),
            None => (Arc::new(Snapshot::empty()), None),
        };
        info!(count = snapshot.len(), "Serving cached messages");
        state.status.cached_at = cached_at;
        self.shared.snapshot_tx.send_replace(snapshot);
    }

    async fn load_cached(&self) -> Option<CachedData<Arc<Snapshot>>> {
        match self.shared.persistence.cache.load_messages().await {
            Ok(cached) => cached.map(|cached| CachedData {
                data: Arc::new(cached.data),
                cached_at: cached.cached_at,
            }),
            Err(e) => {
                warn!(error = %e, "Failed to load cached messages");
                let _ = self
                    .shared
                    .persistence
                    .notices
                    .send(SyncNotice::PersistenceFailed(e.to_string()));
                None
            }
        }
    }

    fn callback_for(&self, generation: u64) -> SnapshotCallback {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        Arc::new(move |result| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let manager = SyncCacheManager { shared };
            match result {
                Ok(snapshot) => manager.apply_subscription_update(generation, snapshot),
                Err(e) => manager.handle_subscription_error(generation, e),
            }
        })
    }

    fn apply_subscription_update(&self, generation: u64, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        {
            let state = self.lock_state();
            if state.generation != generation || state.status.mode != SyncMode::Live {
                debug!(generation, "Ignoring update from cancelled subscription");
                return;
            }
            self.shared.snapshot_tx.send_replace(Arc::clone(&snapshot));
        }
        debug!(count = snapshot.len(), "Snapshot replaced from subscription");
        self.shared.persistence.spawn_write(snapshot);
    }

    fn handle_subscription_error(&self, generation: u64, error: ApiError) {
        let subscription = {
            let mut state = self.lock_state();
            if state.generation != generation || state.status.mode != SyncMode::Live {
                return;
            }
            state.generation += 1;
            state.status.mode = SyncMode::Stalled;
            state.subscription.take()
        };
        if let Some(mut handle) = subscription {
            handle.cancel();
        }

        let error = SyncError::RemoteSubscription(error);
        warn!(error = %error, "Live subscription stopped");
        let _ = self
            .shared
            .persistence
            .notices
            .send(SyncNotice::SubscriptionFailed(error.to_string()));
    }

    // =========================================================================
    // Updates and writes
    // =========================================================================

    /// Replace the in-memory snapshot wholesale and persist it in the
    /// background. Persistence failures never roll back the replacement.
    pub fn on_remote_update(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        self.shared.snapshot_tx.send_replace(Arc::clone(&snapshot));
        debug!(count = snapshot.len(), "Snapshot replaced");
        self.shared.persistence.spawn_write(snapshot);
    }

    /// Forward a new message to the remote store. Fails fast without an
    /// active subscription; offline messages are dropped, not queued.
    pub async fn submit(&self, message: Message) -> Result<(), SyncError> {
        message.validate()?;

        if !self.is_live() {
            warn!(id = %message.id, "Dropping message submitted while offline");
            return Err(SyncError::OfflineSubmit(message.id));
        }

        self.shared
            .remote
            .append(&message)
            .await
            .map_err(SyncError::RemoteWrite)?;
        debug!(id = %message.id, "Message submitted");
        Ok(())
    }

    /// Wait until every scheduled snapshot write has finished
    pub async fn flush_persistence(&self) {
        self.shared.persistence.wait_idle().await;
    }

    /// Cancel the active subscription, if any. Safe to call repeatedly.
    pub fn shutdown(&self) {
        let subscription = {
            let mut state = self.lock_state();
            state.generation += 1;
            if matches!(state.status.mode, SyncMode::Live | SyncMode::Stalled) {
                state.status.mode = SyncMode::Idle;
            }
            state.subscription.take()
        };
        if let Some(mut handle) = subscription {
            handle.cancel();
            info!("Live subscription cancelled on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::error::PersistenceError;
    use crate::models::{ChatUser, GeoPoint};
    use crate::remote::MemoryRemote;
    use async_trait::async_trait;
    use chrono::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(log: &Log, event: impl Into<String>) {
        log.lock().expect("log lock").push(event.into());
    }

    fn events(log: &Log) -> Vec<String> {
        log.lock().expect("log lock").clone()
    }

    /// Remote that records lifecycle events and lets tests push snapshots.
    struct ScriptedRemote {
        log: Log,
        callbacks: Mutex<Vec<SnapshotCallback>>,
        appended: Mutex<Vec<Message>>,
    }

    impl ScriptedRemote {
        fn new(log: Log) -> Self {
            Self {
                log,
                callbacks: Mutex::new(Vec::new()),
                appended: Mutex::new(Vec::new()),
            }
        }

        fn callback(&self, index: usize) -> SnapshotCallback {
            Arc::clone(&self.callbacks.lock().expect("lock")[index])
        }

        fn push_latest(&self, result: Result<Snapshot, ApiError>) {
            let latest = self.callbacks.lock().expect("lock").len() - 1;
            (self.callback(latest))(result);
        }
    }

    #[async_trait]
    impl RemoteStore for ScriptedRemote {
        fn subscribe(
            &self,
            _order_by: &str,
            _direction: SortDirection,
            callback: SnapshotCallback,
        ) -> SubscriptionHandle {
            record(&self.log, "subscribe");
            self.callbacks.lock().expect("lock").push(callback);
            let log = Arc::clone(&self.log);
            SubscriptionHandle::new(move || record(&log, "cancel"))
        }

        async fn append(&self, message: &Message) -> Result<(), ApiError> {
            self.appended.lock().expect("lock").push(message.clone());
            Ok(())
        }
    }

    /// Local store that records calls, can fail saves, and can hold the
    /// first save until released.
    struct ScriptedStore {
        log: Log,
        inner: MemoryStore,
        fail_saves: bool,
        hold_first_save: Option<Arc<Notify>>,
        saves: AtomicUsize,
    }

    impl ScriptedStore {
        fn new(log: Log) -> Self {
            Self {
                log,
                inner: MemoryStore::new(),
                fail_saves: false,
                hold_first_save: None,
                saves: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LocalStore for ScriptedStore {
        async fn save(&self, key: &str, value: String) -> Result<(), PersistenceError> {
            let n = self.saves.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                if let Some(ref gate) = self.hold_first_save {
                    gate.notified().await;
                }
            }
            record(&self.log, "save");
            if self.fail_saves {
                return Err(PersistenceError::Io {
                    key: key.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.inner.save(key, value).await
        }

        async fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
            record(&self.log, "load");
            self.inner.load(key).await
        }
    }

    fn alice() -> ChatUser {
        ChatUser::new("u1", "Alice")
    }

    fn snapshot_of(texts: &[&str]) -> Snapshot {
        let now = Utc::now();
        Snapshot::new(
            texts
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    Message::text(alice(), *text).with_created_at(now - Duration::seconds(i as i64))
                })
                .collect(),
        )
    }

    fn setup() -> (SyncCacheManager, Arc<ScriptedRemote>, Log) {
        let log: Log = Arc::default();
        let remote = Arc::new(ScriptedRemote::new(Arc::clone(&log)));
        let store = Arc::new(ScriptedStore::new(Arc::clone(&log)));
        let manager = SyncCacheManager::new(remote.clone(), store);
        (manager, remote, log)
    }

    #[tokio::test]
    async fn test_live_snapshot_then_offline_without_cache() {
        let log: Log = Arc::default();
        let remote = Arc::new(ScriptedRemote::new(Arc::clone(&log)));
        let store = Arc::new(ScriptedStore {
            fail_saves: true,
            ..ScriptedStore::new(Arc::clone(&log))
        });
        let manager = SyncCacheManager::new(remote.clone(), store);

        manager.set_connectivity(ConnectivityState::Connected).await;
        let now = Utc::now();
        let t1 = Message::text(alice(), "first").with_created_at(now - Duration::seconds(30));
        let t2 = Message::text(alice(), "second").with_created_at(now);
        remote.push_latest(Ok(Snapshot::new(vec![t2.clone(), t1.clone()])));

        assert_eq!(manager.snapshot().messages(), &[t2, t1]);

        // Saves fail, so nothing was ever cached
        manager.flush_persistence().await;
        manager.set_connectivity(ConnectivityState::Disconnected).await;
        assert!(manager.snapshot().is_empty());
        assert_eq!(manager.status().mode, SyncMode::Offline);
        assert_eq!(manager.status().cached_at, None);
    }

    #[tokio::test]
    async fn test_subscription_cancelled_before_cache_load() {
        let (manager, _remote, log) = setup();

        manager.set_connectivity(ConnectivityState::Connected).await;
        manager.set_connectivity(ConnectivityState::Disconnected).await;

        assert_eq!(events(&log), vec!["subscribe", "cancel", "load"]);
        assert!(!manager.is_live());
    }

    #[tokio::test]
    async fn test_unknown_connectivity_is_offline() {
        let (manager, _remote, log) = setup();

        manager.set_connectivity(ConnectivityState::Connected).await;
        manager.set_connectivity(ConnectivityState::Unknown).await;

        assert_eq!(events(&log), vec!["subscribe", "cancel", "load"]);
        assert_eq!(manager.status().connectivity, ConnectivityState::Unknown);
        assert_eq!(manager.status().mode, SyncMode::Offline);
    }

    #[tokio::test]
    async fn test_repeated_disconnect_reads_cache_once() {
        let (manager, _remote, log) = setup();

        manager.set_connectivity(ConnectivityState::Disconnected).await;
        let first_status = manager.status();
        let first_snapshot = manager.snapshot();

        manager.set_connectivity(ConnectivityState::Disconnected).await;

        assert_eq!(events(&log), vec!["load"]);
        assert_eq!(manager.status(), first_status);
        assert_eq!(manager.snapshot(), first_snapshot);
    }

    #[tokio::test]
    async fn test_connected_twice_subscribes_once() {
        let (manager, _remote, log) = setup();

        manager.set_connectivity(ConnectivityState::Connected).await;
        manager.set_connectivity(ConnectivityState::Connected).await;

        assert_eq!(events(&log), vec!["subscribe"]);
        assert!(manager.is_live());
    }

    #[tokio::test]
    async fn test_remote_updates_replace_wholesale() {
        let (manager, _remote, _log) = setup();
        let payloads = [
            snapshot_of(&["a", "b", "c"]),
            snapshot_of(&["d"]),
            snapshot_of(&[]),
            snapshot_of(&["e", "f"]),
        ];

        for (n, payload) in payloads.iter().enumerate() {
            manager.on_remote_update(payload.clone());
            assert_eq!(*manager.snapshot(), payloads[n]);
        }
        manager.flush_persistence().await;
    }

    #[tokio::test]
    async fn test_offline_reload_returns_last_remote_snapshot() {
        let (manager, remote, _log) = setup();
        let point = GeoPoint::new(40.7128, -74.006).expect("valid point");
        let now = Utc::now();
        let mixed = Snapshot::new(vec![
            Message::location(alice(), point).with_created_at(now),
            Message::image(alice(), "https://example.com/a.png")
                .with_created_at(now - Duration::seconds(1)),
            Message::text(alice(), "hi").with_created_at(now - Duration::seconds(2)),
        ]);

        manager.set_connectivity(ConnectivityState::Connected).await;
        remote.push_latest(Ok(mixed.clone()));
        manager.set_connectivity(ConnectivityState::Disconnected).await;

        assert_eq!(*manager.snapshot(), mixed);
        assert!(manager.status().cached_at.is_some());
    }

    #[tokio::test]
    async fn test_submit_while_offline_fails_fast() {
        let (manager, remote, _log) = setup();
        manager.on_remote_update(snapshot_of(&["kept"]));
        manager.set_connectivity(ConnectivityState::Disconnected).await;
        let before = manager.snapshot();

        let result = manager.submit(Message::text(alice(), "lost")).await;

        assert!(matches!(result, Err(SyncError::OfflineSubmit(_))));
        assert!(result.err().is_some_and(|e| e.is_offline()));
        assert_eq!(manager.snapshot(), before);
        assert!(remote.appended.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn test_submit_while_live_appends() {
        let (manager, remote, _log) = setup();
        manager.set_connectivity(ConnectivityState::Connected).await;

        let msg = Message::text(alice(), "hello");
        manager.submit(msg.clone()).await.expect("submit");

        assert_eq!(*remote.appended.lock().expect("lock"), vec![msg]);
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_message() {
        let (manager, _remote, _log) = setup();
        manager.set_connectivity(ConnectivityState::Connected).await;

        let result = manager.submit(Message::text(alice(), "")).await;
        assert!(matches!(result, Err(SyncError::InvalidMessage(_))));
    }

    #[tokio::test]
    async fn test_late_persistence_does_not_overwrite_newer_snapshot() {
        let log: Log = Arc::default();
        let gate = Arc::new(Notify::new());
        let store = Arc::new(ScriptedStore {
            hold_first_save: Some(Arc::clone(&gate)),
            ..ScriptedStore::new(Arc::clone(&log))
        });
        let remote = Arc::new(ScriptedRemote::new(Arc::clone(&log)));
        let manager = SyncCacheManager::new(remote, store.clone());

        let s1 = snapshot_of(&["one"]);
        let s2 = snapshot_of(&["two", "one"]);
        manager.on_remote_update(s1);
        // Let the first write start and block inside the store
        tokio::task::yield_now().await;
        manager.on_remote_update(s2.clone());
        tokio::task::yield_now().await;
        gate.notify_one();

        manager.flush_persistence().await;

        let cache = SnapshotCache::new(store);
        let persisted = cache.load_messages().await.expect("load").expect("present");
        assert_eq!(persisted.data, s2);
    }

    #[tokio::test]
    async fn test_offline_transition_does_not_wait_for_slow_save() {
        let log: Log = Arc::default();
        let gate = Arc::new(Notify::new());
        let store = Arc::new(ScriptedStore {
            hold_first_save: Some(Arc::clone(&gate)),
            ..ScriptedStore::new(Arc::clone(&log))
        });
        let remote = Arc::new(ScriptedRemote::new(Arc::clone(&log)));
        let manager = SyncCacheManager::new(remote.clone(), store.clone());

        manager.set_connectivity(ConnectivityState::Connected).await;
        let live = snapshot_of(&["pending", "older"]);
        remote.push_latest(Ok(live.clone()));
        tokio::task::yield_now().await;

        let transition = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            manager.set_connectivity(ConnectivityState::Disconnected),
        )
        .await;
        assert!(transition.is_ok(), "offline transition blocked on a held save");

        assert_eq!(*manager.snapshot(), live);
        let status = manager.status();
        assert_eq!(status.mode, SyncMode::Offline);
        assert!(status.cached_at.is_some());
        assert!(!events(&log).contains(&"load".to_string()));

        // Once released, the held write lands with the same capture time
        gate.notify_one();
        manager.flush_persistence().await;
        let persisted = SnapshotCache::new(store)
            .load_messages()
            .await
            .expect("load")
            .expect("present");
        assert_eq!(persisted.data, live);
        assert_eq!(Some(persisted.cached_at), status.cached_at);
    }

    #[tokio::test]
    async fn test_offline_after_settled_writes_reads_store() {
        let (manager, remote, log) = setup();

        manager.set_connectivity(ConnectivityState::Connected).await;
        let live = snapshot_of(&["saved"]);
        remote.push_latest(Ok(live.clone()));
        manager.flush_persistence().await;
        manager.set_connectivity(ConnectivityState::Disconnected).await;

        assert_eq!(*manager.snapshot(), live);
        assert_eq!(events(&log), vec!["subscribe", "save", "cancel", "load"]);
    }

    #[tokio::test]
    async fn test_cancelled_subscription_callbacks_are_ignored() {
        let (manager, remote, _log) = setup();

        manager.set_connectivity(ConnectivityState::Connected).await;
        let stale = remote.callback(0);
        manager.set_connectivity(ConnectivityState::Disconnected).await;
        let offline = manager.snapshot();

        stale(Ok(snapshot_of(&["ghost"])));
        assert_eq!(manager.snapshot(), offline);

        // A new subscription ignores the old callback too
        manager.set_connectivity(ConnectivityState::Connected).await;
        stale(Ok(snapshot_of(&["ghost"])));
        assert_eq!(manager.snapshot(), offline);
    }

    #[tokio::test]
    async fn test_subscription_error_stalls_until_next_transition() {
        let (manager, remote, log) = setup();
        let mut notices = manager.notices();

        manager.set_connectivity(ConnectivityState::Connected).await;
        remote.push_latest(Err(ApiError::Unauthorized));

        assert_eq!(manager.status().mode, SyncMode::Stalled);
        assert!(!manager.is_live());
        assert!(matches!(
            notices.try_recv(),
            Ok(SyncNotice::SubscriptionFailed(_))
        ));
        let offline = manager.submit(Message::text(alice(), "x")).await;
        assert!(matches!(offline, Err(SyncError::OfflineSubmit(_))));

        // The next connected transition retries
        manager.set_connectivity(ConnectivityState::Connected).await;
        assert!(manager.is_live());
        assert_eq!(events(&log), vec!["subscribe", "cancel", "subscribe"]);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_memory_and_notifies() {
        let log: Log = Arc::default();
        let store = Arc::new(ScriptedStore {
            fail_saves: true,
            ..ScriptedStore::new(Arc::clone(&log))
        });
        let manager = SyncCacheManager::new(Arc::new(ScriptedRemote::new(Arc::clone(&log))), store);
        let mut notices = manager.notices();

        let payload = snapshot_of(&["a"]);
        manager.on_remote_update(payload.clone());
        manager.flush_persistence().await;

        assert_eq!(*manager.snapshot(), payload);
        assert!(matches!(
            notices.try_recv(),
            Ok(SyncNotice::PersistenceFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_exactly_once() {
        let (manager, _remote, log) = setup();

        // Never started: nothing to cancel
        manager.shutdown();
        assert!(events(&log).is_empty());

        manager.set_connectivity(ConnectivityState::Connected).await;
        manager.shutdown();
        manager.shutdown();

        assert_eq!(events(&log), vec!["subscribe", "cancel"]);
        assert_eq!(manager.status().mode, SyncMode::Idle);
    }

    #[tokio::test]
    async fn test_dropping_manager_cancels_subscription() {
        let (manager, _remote, log) = setup();
        manager.set_connectivity(ConnectivityState::Connected).await;
        drop(manager);
        assert_eq!(events(&log), vec!["subscribe", "cancel"]);
    }

    #[tokio::test]
    async fn test_loopback_roundtrip_through_manager() {
        let remote = Arc::new(MemoryRemote::new());
        let manager = SyncCacheManager::new(remote.clone(), Arc::new(MemoryStore::new()));
        let mut rx = manager.watch_snapshot();

        manager.set_connectivity(ConnectivityState::Connected).await;
        let msg = Message::text(alice(), "loopback");
        manager.submit(msg.clone()).await.expect("submit");

        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(rx.borrow_and_update().messages(), &[msg]);
        assert_eq!(remote.subscriber_count(), 1);

        manager.set_connectivity(ConnectivityState::Disconnected).await;
        assert_eq!(remote.subscriber_count(), 0);
        assert_eq!(manager.snapshot().len(), 1);
    }
}
