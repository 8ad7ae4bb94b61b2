use crate::domain::{CacheStatus, FragmentRequest, ResolvedFragment};
use crate::events::{
    now_timestamp, ComputeFailedEvent, FragmentEvent, FragmentHitEvent, FragmentMissEvent,
    FragmentStoredEvent, StoreDegradedEvent, StoreOperation,
};
use crate::planes::data::operation::FragmentCacheOperations;
use crate::ports::FragmentStore;
use crate::stats::{FragmentCacheStats, StatsSnapshot};
use async_trait::async_trait;
use bytes::Bytes;
use shared::config::StoreErrorPolicy;
use shared::{BoxError, Error, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Looks a fragment up in the injected store and computes it on a miss.
///
/// Holds no per-call state; clones share the store, counters and event channel.
/// Concurrent misses on the same key are not deduplicated: each caller
/// computes and writes, and the last write wins. Wrap it in
/// [`SingleFlightFragmentCacheController`](super::single_flight::SingleFlightFragmentCacheController)
/// to compute once per key.
#[derive(Clone)]
pub struct FragmentCacheController {
    store: Arc<dyn FragmentStore>,
    policy: StoreErrorPolicy,
    event_broadcaster: Option<broadcast::Sender<FragmentEvent>>,
    stats: Arc<FragmentCacheStats>,
}

impl FragmentCacheController {
    pub fn new(store: Arc<dyn FragmentStore>) -> Self {
        Self {
            store,
            policy: StoreErrorPolicy::default(),
            event_broadcaster: None,
            stats: Arc::new(FragmentCacheStats::default()),
        }
    }

    pub fn with_policy(mut self, policy: StoreErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_event_broadcaster(mut self, broadcaster: broadcast::Sender<FragmentEvent>) -> Self {
        self.event_broadcaster = Some(broadcaster);
        self
    }

    pub fn policy(&self) -> StoreErrorPolicy {
        self.policy
    }

    pub fn store(&self) -> &Arc<dyn FragmentStore> {
        &self.store
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn counters(&self) -> &FragmentCacheStats {
        &self.stats
    }

    /// Read the store, applying the store error policy. A degraded read is a miss.
    pub(crate) async fn lookup(&self, fragment: &ResolvedFragment) -> Result<Option<Bytes>> {
        match self.store.get(&fragment.cache_key).await {
            Ok(Some(value)) => {
                tracing::debug!(
                    "Fragment '{}' hit under {}",
                    fragment.key.fragment_name(),
                    fragment.cache_key
                );
                self.stats.record_hit();
                self.emit(FragmentEvent::Hit(FragmentHitEvent {
                    fragment_name: fragment.key.fragment_name().to_string(),
                    cache_key: fragment.cache_key.clone(),
                    value_size: value.len(),
                    timestamp: now_timestamp(),
                }));
                Ok(Some(value))
            }
            Ok(None) => {
                tracing::debug!(
                    "Fragment '{}' missed under {}",
                    fragment.key.fragment_name(),
                    fragment.cache_key
                );
                self.record_miss(fragment);
                Ok(None)
            }
            Err(e) => {
                self.store_failed(fragment, StoreOperation::Get, e)?;
                self.record_miss(fragment);
                Ok(None)
            }
        }
    }

    /// Read the store without counting or emitting anything. A failed read is
    /// `None` unless the policy is `Propagate`.
    pub(crate) async fn peek(&self, fragment: &ResolvedFragment) -> Result<Option<Bytes>> {
        match self.store.get(&fragment.cache_key).await {
            Ok(value) => Ok(value),
            Err(e) if self.policy == StoreErrorPolicy::Propagate => Err(e),
            Err(e) => {
                tracing::debug!(
                    "Re-reading fragment '{}' failed, treating as absent: {}",
                    fragment.key.fragment_name(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Run the compute callback and write its value. Nothing is written when
    /// the callback fails.
    pub(crate) async fn compute_and_store<F, Fut, T, E>(
        &self,
        fragment: &ResolvedFragment,
        compute: F,
    ) -> Result<Bytes>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        T: Into<Bytes> + Send,
        E: Into<BoxError> + Send,
    {
        let value = self.run_compute(fragment, compute).await?;

        match self
            .store
            .set(&fragment.cache_key, value.clone(), fragment.expire)
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    "Stored fragment '{}' ({} bytes, expires {}) under {}",
                    fragment.key.fragment_name(),
                    value.len(),
                    fragment.expire,
                    fragment.cache_key
                );
                self.emit(FragmentEvent::Stored(FragmentStoredEvent {
                    fragment_name: fragment.key.fragment_name().to_string(),
                    cache_key: fragment.cache_key.clone(),
                    value_size: value.len(),
                    ttl_secs: fragment.expire.as_duration().map(|d| d.as_secs()),
                    timestamp: now_timestamp(),
                }));
            }
            Err(e) => self.store_failed(fragment, StoreOperation::Set, e)?,
        }

        Ok(value)
    }

    /// Compute without touching the store.
    pub(crate) async fn bypass<F, Fut, T, E>(
        &self,
        fragment: &ResolvedFragment,
        compute: F,
    ) -> Result<(Bytes, CacheStatus)>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        T: Into<Bytes> + Send,
        E: Into<BoxError> + Send,
    {
        self.stats.record_bypass();
        let value = self.run_compute(fragment, compute).await?;
        Ok((value, CacheStatus::Bypass))
    }

    async fn run_compute<F, Fut, T, E>(
        &self,
        fragment: &ResolvedFragment,
        compute: F,
    ) -> Result<Bytes>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        T: Into<Bytes> + Send,
        E: Into<BoxError> + Send,
    {
        self.stats.record_compute();
        match compute().await {
            Ok(value) => Ok(value.into()),
            Err(e) => {
                let err = Error::compute(e);
                tracing::debug!(
                    "Computing fragment '{}' failed: {}",
                    fragment.key.fragment_name(),
                    err
                );
                self.stats.record_compute_failure();
                self.emit(FragmentEvent::ComputeFailed(ComputeFailedEvent {
                    fragment_name: fragment.key.fragment_name().to_string(),
                    cache_key: fragment.cache_key.clone(),
                    error: err.to_string(),
                    timestamp: now_timestamp(),
                }));
                Err(err)
            }
        }
    }

    fn record_miss(&self, fragment: &ResolvedFragment) {
        self.stats.record_miss();
        self.emit(FragmentEvent::Miss(FragmentMissEvent {
            fragment_name: fragment.key.fragment_name().to_string(),
            cache_key: fragment.cache_key.clone(),
            timestamp: now_timestamp(),
        }));
    }

    /// Count and report a store failure; returns it as an error only under
    /// `StoreErrorPolicy::Propagate`.
    fn store_failed(
        &self,
        fragment: &ResolvedFragment,
        operation: StoreOperation,
        err: Error,
    ) -> Result<()> {
        self.stats.record_store_error();

        let err = match err {
            Error::Store(_) => err,
            other => Error::Store(other.to_string()),
        };

        if self.policy == StoreErrorPolicy::Propagate {
            tracing::error!(
                "Store {:?} for fragment '{}' failed: {}",
                operation,
                fragment.key.fragment_name(),
                err
            );
            return Err(err);
        }

        tracing::warn!(
            "Store {:?} for fragment '{}' failed, rendering uncached: {}",
            operation,
            fragment.key.fragment_name(),
            err
        );
        self.emit(FragmentEvent::StoreDegraded(StoreDegradedEvent {
            fragment_name: fragment.key.fragment_name().to_string(),
            cache_key: fragment.cache_key.clone(),
            operation,
            error: err.to_string(),
            timestamp: now_timestamp(),
        }));
        Ok(())
    }

    fn emit(&self, event: FragmentEvent) {
        let Some(ref broadcaster) = self.event_broadcaster else {
            return;
        };

        let kind = event.kind();
        match broadcaster.send(event) {
            Ok(subscriber_count) => {
                tracing::trace!(
                    "Broadcasted {} event to {} subscriber(s)",
                    kind,
                    subscriber_count
                );
            }
            Err(_) => {
                tracing::debug!("No subscribers for {} event", kind);
            }
        }
    }
}

impl std::fmt::Debug for FragmentCacheController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentCacheController")
            .field("store", &"<dyn FragmentStore>")
            .field("policy", &self.policy)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[async_trait]
impl FragmentCacheOperations for FragmentCacheController {
    async fn get_or_compute_with_status<F, Fut, T, E>(
        &self,
        request: &FragmentRequest,
        compute: F,
    ) -> Result<(Bytes, CacheStatus)>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        T: Into<Bytes> + Send,
        E: Into<BoxError> + Send,
    {
        let fragment = request.resolve()?;

        if !fragment.expire.is_storable() {
            return self.bypass(&fragment, compute).await;
        }

        if let Some(value) = self.lookup(&fragment).await? {
            return Ok((value, CacheStatus::Hit));
        }

        let value = self.compute_and_store(&fragment, compute).await?;
        Ok((value, CacheStatus::Miss))
    }
}
