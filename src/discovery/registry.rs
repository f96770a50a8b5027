use std::sync::Arc;

use async_trait::async_trait;

use super::{namespace_allowed, DiscoveryStrategy};
use crate::client::ClientCache;
use crate::error::Result;
use crate::provider::{RegistryProvider, ServerProvider};
use crate::registry::RegistryRoot;

/// One provider per entry of a registry document.
pub struct RegistryDiscoveryStrategy {
    providers: Vec<Arc<dyn ServerProvider>>,
    clients: ClientCache,
}

impl RegistryDiscoveryStrategy {
    pub fn new(registry: RegistryRoot, namespaces: &[String]) -> Self {
        let providers = registry
            .servers
            .into_iter()
            .filter(|(name, _)| namespace_allowed(namespaces, name))
            .map(|(name, info)| Arc::new(RegistryProvider::new(name, info)) as Arc<dyn ServerProvider>)
            .collect();

        Self {
            providers,
            clients: ClientCache::new(),
        }
    }

    /// Discovery over the registry compiled into the binary.
    pub fn embedded(namespaces: &[String]) -> Result<Self> {
        Ok(Self::new(RegistryRoot::embedded()?, namespaces))
    }
}

#[async_trait]
impl DiscoveryStrategy for RegistryDiscoveryStrategy {
    async fn discover_servers(&self) -> Result<Vec<Arc<dyn ServerProvider>>> {
        tracing::debug!(strategy = "registry", count = self.providers.len(), "discovered servers");
        Ok(self.providers.clone())
    }

    fn client_cache(&self) -> &ClientCache {
        &self.clients
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DOCUMENT: &str = r#"{
        "servers": {
            "documentation": { "description": "Docs", "url": "https://example.com/mcp" },
            "bicep": { "description": "Bicep", "type": "stdio", "command": "bicep-mcp" },
            "fabric": { "description": "Fabric", "type": "stdio", "command": "fabric-mcp" }
        }
    }"#;

    async fn names(namespaces: &[String]) -> Vec<String> {
        let strategy = RegistryDiscoveryStrategy::new(RegistryRoot::parse(DOCUMENT).unwrap(), namespaces);
        strategy
            .discover_servers()
            .await
            .unwrap()
            .iter()
            .map(|p| p.metadata().id)
            .collect()
    }

    #[rstest]
    #[case(vec![], vec!["documentation", "bicep", "fabric"])]
    #[case(vec!["Documentation".to_string()], vec!["documentation"])]
    #[case(vec!["BICEP".to_string(), "storage".to_string()], vec!["bicep"])]
    #[case(vec!["storage".to_string()], vec![])]
    #[case(vec!["fabric".to_string(), "Documentation".to_string()], vec!["documentation", "fabric"])]
    #[tokio::test]
    async fn namespace_filter_selects_entries(
        #[case] namespaces: Vec<String>,
        #[case] expected: Vec<&str>,
    ) {
        assert_eq!(names(&namespaces).await, expected);
    }

    #[tokio::test]
    async fn embedded_registry_is_discoverable() {
        let strategy = RegistryDiscoveryStrategy::embedded(&[]).unwrap();
        let provider = strategy.find_server_provider("DOCUMENTATION").await.unwrap();
        assert_eq!(provider.metadata().name, "documentation");
    }
}
