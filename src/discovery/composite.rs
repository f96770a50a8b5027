use std::sync::Arc;

use async_trait::async_trait;

use super::DiscoveryStrategy;
use crate::client::ClientCache;
use crate::error::{Error, Result};
use crate::provider::ServerProvider;

/// Concatenates the providers of several strategies in declaration order.
///
/// Providers are not deduplicated: two strategies emitting the same id both
/// appear, and lookups by name resolve to the first.
pub struct CompositeDiscoveryStrategy {
    strategies: Vec<Arc<dyn DiscoveryStrategy>>,
    clients: ClientCache,
}

impl CompositeDiscoveryStrategy {
    pub fn new(strategies: Vec<Arc<dyn DiscoveryStrategy>>) -> Result<Self> {
        if strategies.is_empty() {
            return Err(Error::invalid_argument(
                "strategies",
                "at least one discovery strategy is required",
            ));
        }
        Ok(Self {
            strategies,
            clients: ClientCache::new(),
        })
    }
}

#[async_trait]
impl DiscoveryStrategy for CompositeDiscoveryStrategy {
    async fn discover_servers(&self) -> Result<Vec<Arc<dyn ServerProvider>>> {
        let mut providers = Vec::new();
        for strategy in &self.strategies {
            providers.extend(strategy.discover_servers().await?);
        }
        Ok(providers)
    }

    fn client_cache(&self) -> &ClientCache {
        &self.clients
    }
}
