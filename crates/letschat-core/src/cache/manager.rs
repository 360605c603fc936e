use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::store::LocalStore;
use crate::error::PersistenceError;
use crate::models::Snapshot;

/// Storage key for the persisted message list
pub const MESSAGES_KEY: &str = "messages_list";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_display(&self) -> String {
        age_display(self.cached_at)
    }
}

/// Render how long ago `at` was, e.g. "5m ago", rounding hours and days.
pub fn age_display(at: DateTime<Utc>) -> String {
    let minutes = (Utc::now() - at).num_minutes();
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

/// Typed snapshot persistence on top of a `LocalStore`.
#[derive(Clone)]
pub struct SnapshotCache {
    store: Arc<dyn LocalStore>,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    pub fn encode(cached: &CachedData<&Snapshot>) -> Result<String, PersistenceError> {
        serde_json::to_string(cached).map_err(|source| {
            PersistenceError::Encode {
                key: MESSAGES_KEY.to_string(),
                source,
            }
        })
    }

    pub fn decode(contents: &str) -> Result<CachedData<Snapshot>, PersistenceError> {
        serde_json::from_str(contents).map_err(|source| PersistenceError::Decode {
            key: MESSAGES_KEY.to_string(),
            source,
        })
    }

    pub async fn save_messages(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        self.save_messages_at(snapshot, Utc::now()).await
    }

    /// Persist `snapshot` stamped with the time it was captured
    pub async fn save_messages_at(
        &self,
        snapshot: &Snapshot,
        cached_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let contents = Self::encode(&CachedData {
            data: snapshot,
            cached_at,
        })?;
        self.store.save(MESSAGES_KEY, contents).await
    }

    pub async fn load_messages(&self) -> Result<Option<CachedData<Snapshot>>, PersistenceError> {
        match self.store.load(MESSAGES_KEY).await? {
            Some(contents) => {
                let cached = Self::decode(&contents)?;
                debug!(count = cached.data.len(), age = %cached.age_display(), "Loaded cached messages");
                Ok(Some(cached))
            }
            None => Ok(None),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FileStore, MemoryStore};
    use crate::models::{ChatUser, GeoPoint, Message};
    use chrono::{Duration, TimeZone};

    fn mixed_snapshot() -> Snapshot {
        let user = ChatUser::new("u1", "Alice");
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid date");
        let point = GeoPoint::new(52.52, 13.405).expect("valid point");
        Snapshot::new(vec![
            Message::location(user.clone(), point).with_created_at(base + Duration::seconds(2)),
            Message::image(user.clone(), "https://example.com/cat.png")
                .with_created_at(base + Duration::milliseconds(1500)),
            Message::text(user, "hello").with_created_at(base),
        ])
    }

    #[test]
    fn test_age_display_just_now() {
        let cached = CachedData::new(vec![1, 2, 3]);
        assert_eq!(cached.age_display(), "just now");
    }

    #[test]
    fn test_age_display_rounding() {
        let now = Utc::now();
        assert_eq!(age_display(now - Duration::minutes(5)), "5m ago");
        assert_eq!(age_display(now - Duration::minutes(90)), "2h ago");
        assert_eq!(age_display(now - Duration::minutes(70)), "1h ago");
        assert_eq!(age_display(now - Duration::hours(36)), "2d ago");
        assert_eq!(age_display(now + Duration::minutes(3)), "just now");
    }

    #[tokio::test]
    async fn test_mixed_snapshot_roundtrip_memory() {
        let cache = SnapshotCache::new(Arc::new(MemoryStore::new()));
        let snapshot = mixed_snapshot();

        cache.save_messages(&snapshot).await.expect("save");
        let loaded = cache.load_messages().await.expect("load").expect("present");
        assert_eq!(loaded.data, snapshot);
    }

    #[tokio::test]
    async fn test_mixed_snapshot_roundtrip_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().to_path_buf()).expect("create store");
        let cache = SnapshotCache::new(Arc::new(store));
        let snapshot = mixed_snapshot();

        cache.save_messages(&snapshot).await.expect("save");
        let loaded = cache.load_messages().await.expect("load").expect("present");
        assert_eq!(loaded.data, snapshot);
        assert_eq!(loaded.data.messages()[1].created_at, snapshot.messages()[1].created_at);
    }

    #[tokio::test]
    async fn test_full_precision_coordinates_roundtrip() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x5eed);
        let user = ChatUser::new("u1", "Alice");
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid date");
        let messages = (0..5000)
            .map(|i| {
                let point = GeoPoint::new(rng.gen_range(-90.0..=90.0), rng.gen_range(-180.0..=180.0))
                    .expect("valid point");
                Message::location(user.clone(), point)
                    .with_created_at(base - Duration::milliseconds(i))
            })
            .collect();
        let snapshot = Snapshot::new(messages);

        let cache = SnapshotCache::new(Arc::new(MemoryStore::new()));
        cache.save_messages(&snapshot).await.expect("save");
        let loaded = cache.load_messages().await.expect("load").expect("present");

        let mismatches = snapshot
            .messages()
            .iter()
            .zip(loaded.data.messages())
            .filter(|(saved, read)| {
                let (a, b) = (saved.location.expect("location"), read.location.expect("location"));
                a.latitude.to_bits() != b.latitude.to_bits()
                    || a.longitude.to_bits() != b.longitude.to_bits()
            })
            .count();
        assert_eq!(mismatches, 0);
        assert_eq!(loaded.data, snapshot);
    }

    #[tokio::test]
    async fn test_save_at_keeps_capture_time() {
        let cache = SnapshotCache::new(Arc::new(MemoryStore::new()));
        let captured = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).single().expect("valid date");

        cache
            .save_messages_at(&mixed_snapshot(), captured)
            .await
            .expect("save");
        let loaded = cache.load_messages().await.expect("load").expect("present");
        assert_eq!(loaded.cached_at, captured);
    }

    #[tokio::test]
    async fn test_load_without_cache_is_none() {
        let cache = SnapshotCache::new(Arc::new(MemoryStore::new()));
        assert!(cache.load_messages().await.expect("load").is_none());
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_decode_error() {
        let store = Arc::new(MemoryStore::new());
        store.save(MESSAGES_KEY, "{not json".to_string()).await.expect("save");
        let cache = SnapshotCache::new(store);
        assert!(matches!(
            cache.load_messages().await,
            Err(PersistenceError::Decode { .. })
        ));
    }
}
