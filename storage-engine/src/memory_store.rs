use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use fragment::{CacheKey, FragmentStore};
use shared::{Error, ExpireTime, Result};
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Clone, Debug)]
struct MemoryEntry {
    value: Bytes,
    /// Clock reading at which the entry stops being served.
    expires_at: Option<Duration>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Duration) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// DashMap-backed fragment store with lazy expiry against an injectable clock.
///
/// Expired entries are dropped when read or by `purge_expired`; there is no
/// eviction. `set_unavailable(true)` makes every call fail with
/// `Error::Store`, for exercising store error handling.
pub struct MemoryStore {
    entries: DashMap<CacheKey, MemoryEntry>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!("Purged {} expired fragment(s)", removed);
        }
        removed
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Store("memory store marked unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FragmentStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        self.check_available()?;

        let now = self.clock.now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }

        // the read guard is released above; re-check so a fresh write is kept
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: Bytes, expire: ExpireTime) -> Result<()> {
        self.check_available()?;

        if !expire.is_storable() {
            self.entries.remove(key);
            return Ok(());
        }

        let expires_at = expire
            .as_duration()
            .map(|ttl| self.clock.now().saturating_add(ttl));
        self.entries
            .insert(key.clone(), MemoryEntry { value, expires_at });
        Ok(())
    }
}

impl Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.entries.len())
            .field("unavailable", &self.unavailable.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use fragment::make_template_fragment_key;

    fn key(name: &str) -> CacheKey {
        make_template_fragment_key::<&str>(name, &[])
    }

    fn store_with_clock() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (MemoryStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_memory_store_set_and_get() {
        let store = MemoryStore::new();
        store
            .set(&key("hello"), Bytes::from_static(b"world"), ExpireTime::Seconds(60))
            .await
            .unwrap();

        assert_eq!(
            store.get(&key("hello")).await.unwrap(),
            Some(Bytes::from_static(b"world"))
        );
        assert_eq!(store.get(&key("other")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_expiry_boundary() {
        let (store, clock) = store_with_clock();
        store
            .set(&key("k"), Bytes::from_static(b"v"), ExpireTime::Seconds(60))
            .await
            .unwrap();

        clock.advance(Duration::from_millis(59_999));
        assert!(store.get(&key("k")).await.unwrap().is_some());

        clock.advance(Duration::from_millis(1));
        assert_eq!(store.get(&key("k")).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_never_expires() {
        let (store, clock) = store_with_clock();
        store
            .set(&key("k"), Bytes::from_static(b"v"), ExpireTime::Never)
            .await
            .unwrap();

        clock.advance(Duration::from_secs(365 * 24 * 3600));
        assert!(store.get(&key("k")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_store_zero_ttl_removes() {
        let store = MemoryStore::new();
        store
            .set(&key("k"), Bytes::from_static(b"v"), ExpireTime::Never)
            .await
            .unwrap();
        store
            .set(&key("k"), Bytes::from_static(b"w"), ExpireTime::Seconds(0))
            .await
            .unwrap();

        assert_eq!(store.get(&key("k")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_purge_expired() {
        let (store, clock) = store_with_clock();
        store
            .set(&key("short"), Bytes::new(), ExpireTime::Seconds(1))
            .await
            .unwrap();
        store
            .set(&key("long"), Bytes::new(), ExpireTime::Seconds(10))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(5));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.get(&key("k")).await,
            Err(Error::Store(_))
        ));
        assert!(matches!(
            store.set(&key("k"), Bytes::new(), ExpireTime::Never).await,
            Err(Error::Store(_))
        ));

        store.set_unavailable(false);
        assert_eq!(store.get(&key("k")).await.unwrap(), None);
    }
}
