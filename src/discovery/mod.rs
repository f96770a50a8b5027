//! Strategies that produce the set of servers a proxy can route to.

mod command_group;
mod composite;
mod registry;

pub use command_group::CommandGroupDiscoveryStrategy;
pub use composite::CompositeDiscoveryStrategy;
pub use registry::RegistryDiscoveryStrategy;

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::{ClientCache, ClientOptions, McpClient};
use crate::error::{require_name, Error, Result};
use crate::provider::ServerProvider;

/// Produces server providers and owns the clients created from them.
///
/// `discover_servers` must be repeatable: a stable configuration yields the
/// same providers in the same order on every call.
#[async_trait]
pub trait DiscoveryStrategy: Send + Sync {
    async fn discover_servers(&self) -> Result<Vec<Arc<dyn ServerProvider>>>;

    /// Clients created through this strategy, keyed by server name.
    fn client_cache(&self) -> &ClientCache;

    /// Case-insensitive lookup by server name.
    async fn find_server_provider(&self, name: &str) -> Result<Arc<dyn ServerProvider>> {
        let name = require_name(name, "name")?;
        self.discover_servers()
            .await?
            .into_iter()
            .find(|provider| provider.metadata().name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::NotFound(format!("server '{name}'")))
    }

    /// The cached client for `name`, creating it on first use.
    async fn get_or_create_client(
        &self,
        name: &str,
        options: Option<&ClientOptions>,
    ) -> Result<Arc<dyn McpClient>> {
        let name = require_name(name, "name")?;
        let options = options.cloned().unwrap_or_default();

        self.client_cache()
            .get_or_try_init(name, || async move {
                let provider = self.find_server_provider(name).await?;
                tracing::debug!(server = %name, "creating client");
                provider.create_client(&options).await
            })
            .await
    }
}

/// Case-insensitive allow-list test; an empty list allows everything.
pub(crate) fn namespace_allowed(namespaces: &[String], name: &str) -> bool {
    namespaces.is_empty() || namespaces.iter().any(|n| n.eq_ignore_ascii_case(name))
}
