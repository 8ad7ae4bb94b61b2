use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::key::CacheKey;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FragmentEvent {
    Hit(FragmentHitEvent),
    Miss(FragmentMissEvent),
    Stored(FragmentStoredEvent),
    ComputeFailed(ComputeFailedEvent),
    StoreDegraded(StoreDegradedEvent),
}

impl FragmentEvent {
    pub fn cache_key(&self) -> &CacheKey {
        match self {
            FragmentEvent::Hit(e) => &e.cache_key,
            FragmentEvent::Miss(e) => &e.cache_key,
            FragmentEvent::Stored(e) => &e.cache_key,
            FragmentEvent::ComputeFailed(e) => &e.cache_key,
            FragmentEvent::StoreDegraded(e) => &e.cache_key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FragmentEvent::Hit(_) => "hit",
            FragmentEvent::Miss(_) => "miss",
            FragmentEvent::Stored(_) => "stored",
            FragmentEvent::ComputeFailed(_) => "compute_failed",
            FragmentEvent::StoreDegraded(_) => "store_degraded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentHitEvent {
    pub fragment_name: String,
    pub cache_key: CacheKey,
    pub value_size: usize,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentMissEvent {
    pub fragment_name: String,
    pub cache_key: CacheKey,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentStoredEvent {
    pub fragment_name: String,
    pub cache_key: CacheKey,
    pub value_size: usize,
    /// `None` when the fragment never expires.
    pub ttl_secs: Option<u64>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeFailedEvent {
    pub fragment_name: String,
    pub cache_key: CacheKey,
    pub error: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreOperation {
    Get,
    Set,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDegradedEvent {
    pub fragment_name: String,
    pub cache_key: CacheKey,
    pub operation: StoreOperation,
    pub error: String,
    pub timestamp: u64,
}

/// Seconds since UNIX epoch, or 0 if the system clock is before it.
pub fn now_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
