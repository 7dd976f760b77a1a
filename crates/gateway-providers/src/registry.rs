//! Adapter construction and the model catalog cache.

use crate::anthropic::AnthropicAdapter;
use crate::azure::AzureOpenAiAdapter;
use crate::google::GeminiAdapter;
use crate::openai::OpenAiCompatibleAdapter;
use dashmap::DashMap;
use gateway_core::{GatewayResult, ModelInfo, ProviderAdapterConfig, ProviderKind};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default catalog entry lifetime
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(600);

/// Build the adapter serving a configuration.
///
/// # Errors
/// Returns a configuration error when the adapter cannot be constructed
/// (missing endpoint, unusable proxy).
pub fn create_adapter(config: ProviderAdapterConfig) -> GatewayResult<Arc<dyn gateway_core::ProviderAdapter>> {
    debug!(provider = %config.provider, model = %config.model, "Creating provider adapter");
    let adapter: Arc<dyn gateway_core::ProviderAdapter> = match config.provider {
        ProviderKind::Anthropic => Arc::new(AnthropicAdapter::new(config)?),
        ProviderKind::Gemini => Arc::new(GeminiAdapter::new(config)?),
        ProviderKind::AzureOpenAi => Arc::new(AzureOpenAiAdapter::new(config)?),
        ProviderKind::OpenAi
        | ProviderKind::DeepSeek
        | ProviderKind::Qwen
        | ProviderKind::OpenRouter
        | ProviderKind::SiliconFlow
        | ProviderKind::Grok
        | ProviderKind::Ollama => Arc::new(OpenAiCompatibleAdapter::new(config)?),
    };
    Ok(adapter)
}

/// Cache key. The API key only contributes a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CatalogKey {
    provider: ProviderKind,
    endpoint: Option<String>,
    key_fingerprint: u64,
}

struct CachedCatalog {
    models: Arc<Vec<ModelInfo>>,
    cached_at: Instant,
}

/// Model catalogs per (provider, endpoint, credential) with a TTL.
pub struct ModelCatalogCache {
    entries: DashMap<CatalogKey, CachedCatalog>,
    ttl: Duration,
}

impl ModelCatalogCache {
    /// Create a cache whose entries live for `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Entry lifetime
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(provider: ProviderKind, endpoint: Option<&str>, api_key: &str) -> CatalogKey {
        let mut hasher = DefaultHasher::new();
        api_key.hash(&mut hasher);
        CatalogKey {
            provider,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            key_fingerprint: hasher.finish(),
        }
    }

    /// Fresh cached catalog, if any
    #[must_use]
    pub fn get(&self, provider: ProviderKind, endpoint: Option<&str>, api_key: &str) -> Option<Arc<Vec<ModelInfo>>> {
        let key = Self::key(provider, endpoint, api_key);
        let entry = self.entries.get(&key)?;
        if entry.cached_at.elapsed() < self.ttl {
            return Some(Arc::clone(&entry.models));
        }
        drop(entry);
        self.entries.remove(&key);
        None
    }

    /// Store a catalog
    pub fn insert(
        &self,
        provider: ProviderKind,
        endpoint: Option<&str>,
        api_key: &str,
        models: Vec<ModelInfo>,
    ) -> Arc<Vec<ModelInfo>> {
        let models = Arc::new(models);
        self.entries.insert(
            Self::key(provider, endpoint, api_key),
            CachedCatalog {
                models: Arc::clone(&models),
                cached_at: Instant::now(),
            },
        );
        models
    }

    /// Drop every catalog of one provider
    pub fn invalidate(&self, provider: ProviderKind) {
        self.entries.retain(|key, _| key.provider != provider);
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached catalogs, stale ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ModelCatalogCache {
    fn default() -> Self {
        Self::new(DEFAULT_CATALOG_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_adapter_for_every_kind() {
        for kind in ProviderKind::ALL {
            let mut config = ProviderAdapterConfig::new(kind, "some-model", "key");
            if kind == ProviderKind::AzureOpenAi {
                config = config.with_endpoint("https://res.openai.azure.com");
            }
            let adapter = create_adapter(config).unwrap();
            assert_eq!(adapter.kind(), kind);
            assert_eq!(adapter.model(), "some-model");
        }
    }

    #[test]
    fn test_azure_without_endpoint_fails() {
        let config = ProviderAdapterConfig::new(ProviderKind::AzureOpenAi, "dep", "key");
        assert!(create_adapter(config).is_err());
    }

    #[test]
    fn test_cache_hit_and_key_isolation() {
        let cache = ModelCatalogCache::default();
        cache.insert(ProviderKind::OpenAi, None, "k1", vec![ModelInfo::new("gpt-4o")]);

        let hit = cache.get(ProviderKind::OpenAi, None, "k1").unwrap();
        assert_eq!(hit[0].id, "gpt-4o");
        assert!(cache.get(ProviderKind::OpenAi, None, "k2").is_none());
        assert!(cache.get(ProviderKind::OpenAi, Some("http://other"), "k1").is_none());
        assert!(cache.get(ProviderKind::DeepSeek, None, "k1").is_none());
    }

    #[test]
    fn test_cache_expiry() {
        let cache = ModelCatalogCache::new(Duration::ZERO);
        cache.insert(ProviderKind::Grok, None, "k", vec![ModelInfo::new("grok-2")]);
        assert!(cache.get(ProviderKind::Grok, None, "k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_provider() {
        let cache = ModelCatalogCache::default();
        cache.insert(ProviderKind::Qwen, None, "k", vec![]);
        cache.insert(ProviderKind::Ollama, None, "k", vec![]);
        cache.invalidate(ProviderKind::Qwen);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(ProviderKind::Ollama, None, "k").is_some());
    }
}
