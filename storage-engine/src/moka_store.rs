use async_trait::async_trait;
use bytes::Bytes;
use fragment::{CacheKey, FragmentStore};
use moka::Expiry;
use moka::future::Cache;
use shared::{ExpireTime, Result};
use std::fmt::Debug;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct StoredFragment {
    value: Bytes,
    expire: ExpireTime,
}

/// Expires each entry after the timeout it was written with.
struct FragmentExpiry;

impl Expiry<CacheKey, StoredFragment> for FragmentExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &StoredFragment,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.expire.as_duration()
    }

    // an overwrite restarts the clock with the new entry's timeout
    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &StoredFragment,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.expire.as_duration()
    }
}

/// Moka-based fragment store with per-entry TTL and optional size bound.
pub struct MokaStore {
    cache: Cache<CacheKey, StoredFragment>,
}

impl MokaStore {
    /// Create a Moka store from name and optional capacity
    pub fn new(name: &str, max_entries: Option<u64>) -> Self {
        let mut builder = Cache::builder().name(name).expire_after(FragmentExpiry);

        if let Some(capacity) = max_entries {
            builder = builder.max_capacity(capacity);
        }

        Self {
            cache: builder.build(),
        }
    }

    pub fn new_unbounded() -> Self {
        Self::new("fragments", None)
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Flush Moka's pending maintenance (evictions, expirations).
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl FragmentStore for MokaStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        // None means absent or expired
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &CacheKey, value: Bytes, expire: ExpireTime) -> Result<()> {
        if !expire.is_storable() {
            self.cache.invalidate(key).await;
            return Ok(());
        }

        self.cache
            .insert(key.clone(), StoredFragment { value, expire })
            .await;
        Ok(())
    }
}

impl Debug for MokaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaStore")
            .field("name", &self.cache.name())
            .field("entry_count", &self.cache.entry_count())
            .field("weighted_size", &self.cache.weighted_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragment::make_template_fragment_key;
    use tokio::time::sleep;

    fn key(name: &str) -> CacheKey {
        make_template_fragment_key::<&str>(name, &[])
    }

    #[tokio::test]
    async fn test_moka_store_set_and_get() {
        let store = MokaStore::new_unbounded();

        store
            .set(&key("hello"), Bytes::from_static(b"world"), ExpireTime::Seconds(60))
            .await
            .unwrap();

        let value = store.get(&key("hello")).await.unwrap();
        assert_eq!(value, Some(Bytes::from_static(b"world")));
    }

    #[tokio::test]
    async fn test_moka_store_get_nonexistent() {
        let store = MokaStore::new_unbounded();
        assert_eq!(store.get(&key("nonexistent")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_moka_store_empty_value_is_found() {
        let store = MokaStore::new_unbounded();
        store
            .set(&key("blank"), Bytes::new(), ExpireTime::Never)
            .await
            .unwrap();

        assert_eq!(store.get(&key("blank")).await.unwrap(), Some(Bytes::new()));
    }

    #[tokio::test]
    async fn test_moka_store_overwrite() {
        let store = MokaStore::new_unbounded();

        store
            .set(&key("k"), Bytes::from_static(b"value1"), ExpireTime::Seconds(60))
            .await
            .unwrap();
        store
            .set(&key("k"), Bytes::from_static(b"value2"), ExpireTime::Seconds(60))
            .await
            .unwrap();

        assert_eq!(
            store.get(&key("k")).await.unwrap(),
            Some(Bytes::from_static(b"value2"))
        );
    }

    #[tokio::test]
    async fn test_moka_store_per_entry_ttl() {
        let store = MokaStore::new_unbounded();

        store
            .set(&key("short"), Bytes::from_static(b"a"), ExpireTime::Seconds(1))
            .await
            .unwrap();
        store
            .set(&key("long"), Bytes::from_static(b"b"), ExpireTime::Seconds(60))
            .await
            .unwrap();
        store
            .set(&key("forever"), Bytes::from_static(b"c"), ExpireTime::Never)
            .await
            .unwrap();

        assert!(store.get(&key("short")).await.unwrap().is_some());

        // Wait for expiration
        sleep(Duration::from_millis(1200)).await;

        assert_eq!(store.get(&key("short")).await.unwrap(), None);
        assert!(store.get(&key("long")).await.unwrap().is_some());
        assert!(store.get(&key("forever")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_moka_store_zero_ttl_is_not_stored() {
        let store = MokaStore::new_unbounded();

        store
            .set(&key("zero"), Bytes::from_static(b"a"), ExpireTime::Seconds(0))
            .await
            .unwrap();

        assert_eq!(store.get(&key("zero")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_moka_store_bounded() {
        let store = MokaStore::new("bounded", Some(2)); // Max 2 entries

        for name in ["key1", "key2", "key3"] {
            store
                .set(&key(name), Bytes::from_static(b"v"), ExpireTime::Never)
                .await
                .unwrap();
        }

        store.run_pending_tasks().await;

        assert!(store.entry_count() <= 2, "Store should have at most 2 entries");
    }
}
