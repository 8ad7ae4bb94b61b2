#![deny(clippy::all)]

use crate::key::CacheKey;
use async_trait::async_trait;
use bytes::Bytes;
use shared::{ExpireTime, Result};

// Ports are the pluggable extension points for backing stores

/// Expiring key-value store holding rendered fragments.
///
/// `get` must return `Ok(None)` for a missing or expired key and `Ok(Some(..))`
/// for a stored value, even an empty one. Individual calls must be atomic.
#[async_trait]
pub trait FragmentStore: Send + Sync + 'static {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>>;
    async fn set(&self, key: &CacheKey, value: Bytes, expire: ExpireTime) -> Result<()>;
}
