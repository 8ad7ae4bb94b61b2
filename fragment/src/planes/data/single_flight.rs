use crate::domain::{CacheStatus, FragmentRequest};
use crate::key::CacheKey;
use crate::planes::data::controller::FragmentCacheController;
use crate::planes::data::operation::FragmentCacheOperations;
use crate::stats::StatsSnapshot;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::{BoxError, Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

type FlightResult = Result<Bytes>;

struct Flight {
    id: u64,
    sender: broadcast::Sender<FlightResult>,
}

/// Registration of the caller computing a key. Dropping it without
/// `finish` (cancelled leader) removes the in-flight entry, which closes the
/// channel and sends waiters back to the lookup.
struct FlightGuard {
    in_flight: Arc<DashMap<CacheKey, Flight>>,
    key: CacheKey,
    id: u64,
    sender: broadcast::Sender<FlightResult>,
}

impl FlightGuard {
    /// Deregister, then publish. Every waiter subscribed while the entry was
    /// present, so none can miss the message.
    fn finish(self, result: FlightResult) {
        self.release();
        let _ = self.sender.send(result);
    }

    fn release(&self) {
        self.in_flight.remove_if(&self.key, |_, flight| flight.id == self.id);
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.release();
    }
}

enum Role {
    Leader(FlightGuard),
    Follower(broadcast::Receiver<FlightResult>),
}

/// Fragment cache that computes each missing key at most once at a time.
///
/// The first caller to miss a key computes and stores it; callers arriving
/// while that is in progress wait and receive the same result, including the
/// same error if the computation fails. All waiters of a flight are woken by
/// one broadcast, so nobody queues behind later arrivals.
#[derive(Clone)]
pub struct SingleFlightFragmentCacheController {
    inner: FragmentCacheController,
    in_flight: Arc<DashMap<CacheKey, Flight>>,
    next_flight_id: Arc<AtomicU64>,
}

impl SingleFlightFragmentCacheController {
    pub fn new(inner: FragmentCacheController) -> Self {
        Self {
            inner,
            in_flight: Arc::new(DashMap::new()),
            next_flight_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn inner(&self) -> &FragmentCacheController {
        &self.inner
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats()
    }

    /// Number of keys currently being computed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn join(&self, key: &CacheKey) -> Role {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => Role::Follower(entry.get().sender.subscribe()),
            Entry::Vacant(entry) => {
                let id = self.next_flight_id.fetch_add(1, Ordering::Relaxed);
                let (sender, _) = broadcast::channel(1);
                entry.insert(Flight {
                    id,
                    sender: sender.clone(),
                });
                Role::Leader(FlightGuard {
                    in_flight: self.in_flight.clone(),
                    key: key.clone(),
                    id,
                    sender,
                })
            }
        }
    }
}

impl std::fmt::Debug for SingleFlightFragmentCacheController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlightFragmentCacheController")
            .field("inner", &self.inner)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

#[async_trait]
impl FragmentCacheOperations for SingleFlightFragmentCacheController {
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
            return self.inner.bypass(&fragment, compute).await;
        }

        let mut compute = Some(compute);
        loop {
            if let Some(value) = self.inner.lookup(&fragment).await? {
                return Ok((value, CacheStatus::Hit));
            }

            match self.join(&fragment.cache_key) {
                Role::Leader(guard) => {
                    // a previous flight may have stored the value after our lookup
                    if let Some(value) = self.inner.peek(&fragment).await? {
                        guard.finish(Ok(value.clone()));
                        return Ok((value, CacheStatus::Hit));
                    }

                    let Some(compute) = compute.take() else {
                        return Err(Error::Internal(
                            "compute callback consumed before leading a flight".to_string(),
                        ));
                    };

                    let result = self.inner.compute_and_store(&fragment, compute).await;
                    guard.finish(result.clone());
                    return result.map(|value| (value, CacheStatus::Miss));
                }
                Role::Follower(mut receiver) => match receiver.recv().await {
                    Ok(result) => {
                        self.inner.counters().record_shared();
                        return result.map(|value| (value, CacheStatus::Shared));
                    }
                    Err(_) => {
                        tracing::debug!(
                            "Flight for {} was abandoned, retrying",
                            fragment.cache_key
                        );
                    }
                },
            }
        }
    }
}
