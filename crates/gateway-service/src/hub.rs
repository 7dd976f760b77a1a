//! Directory of named model gateways.

use crate::gateway::ModelGateway;
use crate::services::GatewayServices;
use dashmap::DashMap;
use gateway_config::GatewayConfig;
use gateway_core::{GatewayError, ProviderAdapterConfig, ProxyConfig};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

struct ProxyState {
    enabled: bool,
    server: Option<ProxyConfig>,
}

impl ProxyState {
    fn active(&self) -> Option<ProxyConfig> {
        if self.enabled {
            self.server.clone()
        } else {
            None
        }
    }
}

/// Named gateways sharing one set of services and one proxy setting
pub struct GatewayHub {
    gateways: DashMap<String, Arc<ModelGateway>>,
    services: Arc<GatewayServices>,
    proxy: RwLock<ProxyState>,
}

impl GatewayHub {
    /// Create an empty hub
    #[must_use]
    pub fn new(services: Arc<GatewayServices>) -> Self {
        Self {
            gateways: DashMap::new(),
            services,
            proxy: RwLock::new(ProxyState {
                enabled: false,
                server: None,
            }),
        }
    }

    /// Build every enabled model of a configuration
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::with_services(config, Arc::new(GatewayServices::from_config(config)))
    }

    /// Build every enabled model of a configuration on the given services
    #[must_use]
    pub fn with_services(config: &GatewayConfig, services: Arc<GatewayServices>) -> Self {
        let hub = Self::new(services);
        {
            let mut proxy = hub.proxy.write();
            proxy.enabled = config.proxy.enabled;
            proxy.server.clone_from(&config.proxy.server);
        }

        let proxy = config.active_proxy();
        for entry in config.enabled_models() {
            hub.insert_gateway(&entry.name, entry.adapter_config(proxy));
        }
        info!(gateways = hub.len(), proxy = proxy.is_some(), "Gateway hub ready");
        hub
    }

    /// Shared services
    #[must_use]
    pub fn services(&self) -> &Arc<GatewayServices> {
        &self.services
    }

    /// Look up a gateway
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ModelGateway>> {
        self.gateways.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up a gateway, failing with a configuration error
    ///
    /// # Errors
    /// Returns a configuration error for unknown names.
    pub fn require(&self, name: &str) -> Result<Arc<ModelGateway>, GatewayError> {
        self.get(name)
            .ok_or_else(|| GatewayError::configuration(format!("no model named '{name}' is configured")))
    }

    /// Gateway names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.gateways.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of gateways
    #[must_use]
    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    /// Whether the hub is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }

    /// Add or replace a gateway. The hub's proxy setting overrides the
    /// configuration's.
    pub fn insert(&self, name: &str, config: ProviderAdapterConfig) -> Arc<ModelGateway> {
        let proxy = self.proxy.read().active();
        self.insert_gateway(name, config.with_proxy(proxy))
    }

    fn insert_gateway(&self, name: &str, config: ProviderAdapterConfig) -> Arc<ModelGateway> {
        let gateway = Arc::new(ModelGateway::new(name, config, Arc::clone(&self.services)));
        if !gateway.is_ready() {
            warn!(gateway = %name, lifecycle = %gateway.lifecycle(), "Gateway registered but not ready");
        }
        if self.gateways.insert(name.to_string(), Arc::clone(&gateway)).is_some() {
            info!(gateway = %name, "Gateway replaced");
        }
        gateway
    }

    /// Remove a gateway. Calls holding it finish normally.
    pub fn remove(&self, name: &str) -> Option<Arc<ModelGateway>> {
        let removed = self.gateways.remove(name).map(|(_, gateway)| gateway);
        if removed.is_some() {
            info!(gateway = %name, "Gateway removed");
        }
        removed
    }

    /// Whether outbound calls go through the proxy
    #[must_use]
    pub fn proxy_enabled(&self) -> bool {
        self.proxy.read().enabled
    }

    /// Set the proxy server. Takes effect on every gateway if the proxy is
    /// enabled.
    ///
    /// Returns the gateways that failed to re-initialize.
    pub fn set_proxy_server(&self, server: Option<ProxyConfig>) -> Vec<(String, GatewayError)> {
        self.proxy.write().server = server;
        self.apply_proxy()
    }

    /// Turn the proxy on or off and re-initialize every gateway.
    ///
    /// Returns the gateways that failed to re-initialize; they stay degraded
    /// until the next successful re-initialization.
    pub fn set_proxy_enabled(&self, enabled: bool) -> Vec<(String, GatewayError)> {
        {
            let mut proxy = self.proxy.write();
            if enabled && proxy.server.is_none() {
                warn!("Proxy enabled without a proxy server, calls stay direct");
            }
            proxy.enabled = enabled;
        }
        self.apply_proxy()
    }

    fn apply_proxy(&self) -> Vec<(String, GatewayError)> {
        let proxy = self.proxy.read().active();
        info!(proxy = proxy.as_ref().map(ProxyConfig::url), "Applying proxy setting");

        let gateways: Vec<(String, Arc<ModelGateway>)> = self
            .gateways
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        gateways
            .into_iter()
            .filter_map(|(name, gateway)| gateway.set_proxy(proxy.clone()).err().map(|e| (name, e)))
            .collect()
    }
}

impl std::fmt::Debug for GatewayHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayHub")
            .field("gateways", &self.names())
            .field("proxy_enabled", &self.proxy_enabled())
            .finish_non_exhaustive()
    }
}
