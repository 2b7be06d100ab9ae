//! SWx proxy context
//!
//! Builds the service stack from configuration: one proxy per configured
//! HSS, a multiplexor when there are several, and the HLR router on top
//! when HLR PLMNs are configured. All proxies share one vector cache.

use std::sync::Arc;

use crate::cache::{VectorCache, DEFAULT_GC_INTERVAL};
use crate::config::{ConfigError, SwxProxyConfig};
use crate::hlr::{HlrRelay, HlrRouter};
use crate::metrics::SwxMetrics;
use crate::proxy::{SwxProxy, SwxProxyOptions, SwxProxyService};
use crate::router::SwxProxyMux;

pub struct SwxProxyContext {
    service: Arc<dyn SwxProxyService>,
    cache: Option<Arc<VectorCache>>,
    metrics: Vec<Arc<SwxMetrics>>,
}

impl SwxProxyContext {
    /// Must run inside a tokio runtime when caching is enabled
    pub fn new(
        config: &SwxProxyConfig,
        enable_cache: bool,
        hlr_relay: Option<Arc<dyn HlrRelay>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let cache = enable_cache.then(|| VectorCache::start(DEFAULT_GC_INTERVAL, config.cache_ttl()));
        let options = SwxProxyOptions::from(config);

        let mut metrics = Vec::with_capacity(config.servers.len());
        let mut proxies: Vec<Arc<dyn SwxProxyService>> = Vec::with_capacity(config.servers.len());
        for entry in &config.servers {
            let server = entry.diameter_server()?;
            log::info!(
                "SWx backend {} -> {} (realm {})",
                proxies.len(),
                server.address,
                server.dest_realm
            );
            let recorder = Arc::new(SwxMetrics::new());
            proxies.push(Arc::new(SwxProxy::new(
                options.clone(),
                entry.diameter_client(),
                server,
                cache.clone(),
                recorder.clone(),
            )));
            metrics.push(recorder);
        }

        let mut service: Arc<dyn SwxProxyService> = if proxies.len() == 1 {
            proxies.remove(0)
        } else {
            Arc::new(SwxProxyMux::new(proxies))
        };

        if !config.hlr_plmn_ids.is_empty() {
            log::info!("HLR PLMNs: {:?}", config.hlr_plmn_ids);
            service = Arc::new(HlrRouter::new(service, config.hlr_plmn_ids.clone(), hlr_relay));
        }

        Ok(Self { service, cache, metrics })
    }

    pub fn service(&self) -> Arc<dyn SwxProxyService> {
        self.service.clone()
    }

    pub fn cache(&self) -> Option<&Arc<VectorCache>> {
        self.cache.as_ref()
    }

    /// Per-backend counters, in configuration order
    pub fn metrics(&self) -> &[Arc<SwxMetrics>] {
        &self.metrics
    }

    pub fn shutdown(&self) {
        if let Some(cache) = &self.cache {
            cache.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerEntry;
    use crate::types::RegistrationRequest;

    #[tokio::test]
    async fn test_single_backend_with_cache() {
        let ctx = SwxProxyContext::new(&SwxProxyConfig::default(), true, None).unwrap();
        assert!(ctx.cache().is_some());
        assert_eq!(ctx.metrics().len(), 1);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn test_two_backends_without_cache() {
        let mut config = SwxProxyConfig::default();
        let mut second = ServerEntry::default();
        second.server.address = "127.0.0.1:3869".into();
        config.servers.push(second);

        let ctx = SwxProxyContext::new(&config, false, None).unwrap();
        assert!(ctx.cache().is_none());
        assert_eq!(ctx.metrics().len(), 2);
    }

    #[tokio::test]
    async fn test_hlr_router_on_top() {
        let config = SwxProxyConfig {
            hlr_plmn_ids: vec!["00102".into()],
            ..Default::default()
        };
        let ctx = SwxProxyContext::new(&config, false, None).unwrap();

        let answer = ctx
            .service()
            .register(RegistrationRequest {
                user_name: "001020000000001".into(),
                session_id: None,
            })
            .await
            .unwrap();
        assert!(answer.session_id.starts_with("hlr;"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SwxProxyConfig {
            servers: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(
            SwxProxyContext::new(&config, false, None),
            Err(ConfigError::Invalid(_))
        ));
    }
}
