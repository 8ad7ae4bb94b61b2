use crate::domain::FragmentRequest;
use crate::planes::data::controller::FragmentCacheController;
use crate::ports::FragmentStore;
use shared::config::StoreErrorPolicy;
use shared::{ConfigurationError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Alias used when nothing more specific is registered.
pub const DEFAULT_ALIAS: &str = "default";
/// Preferred alias for fragment caching when a request names no store.
pub const TEMPLATE_FRAGMENTS_ALIAS: &str = "template_fragments";

/// Named fragment stores.
///
/// A request without `using` goes to `template_fragments` if registered,
/// otherwise to `default`. A request naming an alias must name a registered one.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: Arc<RwLock<HashMap<String, Arc<dyn FragmentStore>>>>,
    policy: StoreErrorPolicy,
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &"<RwLock<HashMap>>")
            .field("policy", &self.policy)
            .finish()
    }
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: StoreErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register a store, replacing any store previously under `alias`.
    /// Returns whether an existing store was replaced.
    pub async fn register(&self, alias: impl Into<String>, store: Arc<dyn FragmentStore>) -> bool {
        let alias = alias.into();
        let mut stores = self.stores.write().await;
        let replaced = stores.insert(alias.clone(), store).is_some();
        if replaced {
            tracing::info!("Replaced fragment store '{}'", alias);
        } else {
            tracing::info!("Registered fragment store '{}'", alias);
        }
        replaced
    }

    pub async fn get(&self, alias: &str) -> Option<Arc<dyn FragmentStore>> {
        let stores = self.stores.read().await;
        stores.get(alias).cloned()
    }

    pub async fn aliases(&self) -> Vec<String> {
        let stores = self.stores.read().await;
        let mut aliases: Vec<String> = stores.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    /// Pick the store for an optional alias.
    pub async fn resolve(&self, using: Option<&str>) -> Result<Arc<dyn FragmentStore>> {
        let stores = self.stores.read().await;

        if let Some(alias) = using {
            return stores
                .get(alias)
                .cloned()
                .ok_or_else(|| ConfigurationError::UnknownCache(alias.to_string()).into());
        }

        stores
            .get(TEMPLATE_FRAGMENTS_ALIAS)
            .or_else(|| stores.get(DEFAULT_ALIAS))
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownCache(DEFAULT_ALIAS.to_string()).into())
    }

    /// Controller over the store picked by `using`.
    pub async fn controller(&self, using: Option<&str>) -> Result<FragmentCacheController> {
        let store = self.resolve(using).await?;
        Ok(FragmentCacheController::new(store).with_policy(self.policy))
    }

    /// Controller over the store a request asks for.
    pub async fn controller_for(
        &self,
        request: &FragmentRequest,
    ) -> Result<FragmentCacheController> {
        self.controller(request.using.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planes::data::operation::FragmentCacheOperations;
    use crate::testing::RecordingStore;
    use shared::{BoxError, Error};

    fn config_err(err: Error) -> ConfigurationError {
        match err {
            Error::Configuration(e) => e,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_registry_has_no_default() {
        let registry = StoreRegistry::new();
        let err = registry.resolve(None).await.err().unwrap();
        assert_eq!(
            config_err(err),
            ConfigurationError::UnknownCache("default".to_string())
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_default() {
        let registry = StoreRegistry::new();
        let default_store = Arc::new(RecordingStore::default());
        registry.register(DEFAULT_ALIAS, default_store.clone()).await;

        let cache = registry.controller(None).await.unwrap();
        cache
            .get_or_compute(&FragmentRequest::new(60, "nav"), || async {
                Ok::<_, BoxError>("nav")
            })
            .await
            .unwrap();

        assert_eq!(default_store.len(), 1);
    }

    #[tokio::test]
    async fn test_prefers_template_fragments_store() {
        let registry = StoreRegistry::new();
        let default_store = Arc::new(RecordingStore::default());
        let fragment_store = Arc::new(RecordingStore::default());
        registry.register(DEFAULT_ALIAS, default_store.clone()).await;
        registry
            .register(TEMPLATE_FRAGMENTS_ALIAS, fragment_store.clone())
            .await;

        let cache = registry.controller(None).await.unwrap();
        cache
            .get_or_compute(&FragmentRequest::new(60, "nav"), || async {
                Ok::<_, BoxError>("nav")
            })
            .await
            .unwrap();

        assert_eq!(fragment_store.len(), 1);
        assert_eq!(default_store.len(), 0);
    }

    #[tokio::test]
    async fn test_explicit_alias() {
        let registry = StoreRegistry::new().with_policy(StoreErrorPolicy::Propagate);
        let local = Arc::new(RecordingStore::default());
        registry.register(DEFAULT_ALIAS, Arc::new(RecordingStore::default())).await;
        registry.register("local", local.clone()).await;

        let request = FragmentRequest::new(60, "nav").using("local");
        let cache = registry.controller_for(&request).await.unwrap();
        assert_eq!(cache.policy(), StoreErrorPolicy::Propagate);

        cache
            .get_or_compute(&request, || async { Ok::<_, BoxError>("nav") })
            .await
            .unwrap();
        assert_eq!(local.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_alias_is_configuration_error() {
        let registry = StoreRegistry::new();
        registry.register(DEFAULT_ALIAS, Arc::new(RecordingStore::default())).await;

        let err = registry
            .controller_for(&FragmentRequest::new(60, "nav").using("redis"))
            .await
            .unwrap_err();
        assert_eq!(
            config_err(err),
            ConfigurationError::UnknownCache("redis".to_string())
        );
    }

    #[tokio::test]
    async fn test_register_reports_replacement() {
        let registry = StoreRegistry::new();
        assert!(!registry.register("a", Arc::new(RecordingStore::default())).await);
        assert!(registry.register("a", Arc::new(RecordingStore::default())).await);
        registry.register("b", Arc::new(RecordingStore::default())).await;

        assert_eq!(registry.aliases().await, ["a", "b"]);
        assert!(registry.get("b").await.is_some());
        assert!(registry.get("c").await.is_none());
    }
}
