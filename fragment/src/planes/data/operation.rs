use crate::domain::{CacheStatus, FragmentRequest};
use async_trait::async_trait;
use bytes::Bytes;
use shared::{BoxError, Result};
use std::future::Future;

/// Cache-or-compute for template fragments.
///
/// Implemented by the plain controller and the single-flight controller so a
/// renderer can be written against either.
#[async_trait]
pub trait FragmentCacheOperations: Send + Sync + 'static {
    /// Return the cached value for `request`, computing and storing it on a
    /// miss, together with how it was obtained.
    async fn get_or_compute_with_status<F, Fut, T, E>(
        &self,
        request: &FragmentRequest,
        compute: F,
    ) -> Result<(Bytes, CacheStatus)>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        T: Into<Bytes> + Send,
        E: Into<BoxError> + Send;

    async fn get_or_compute<F, Fut, T, E>(
        &self,
        request: &FragmentRequest,
        compute: F,
    ) -> Result<Bytes>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        T: Into<Bytes> + Send,
        E: Into<BoxError> + Send,
    {
        self.get_or_compute_with_status(request, compute)
            .await
            .map(|(value, _)| value)
    }
}
