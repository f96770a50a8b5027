use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::{namespace_allowed, DiscoveryStrategy};
use crate::client::ClientCache;
use crate::commands::CommandFactory;
use crate::config::resolve_entry_point;
use crate::error::{Error, Result};
use crate::provider::{CommandGroupProvider, ServerProvider};

/// Groups that hold extension, server-management and introspection commands
/// rather than a service namespace.
pub const IGNORED_GROUPS: &[&str] = &["extension", "server", "tools"];

/// One provider per top-level command group, each served by a child copy of
/// this executable running in single-namespace mode.
pub struct CommandGroupDiscoveryStrategy {
    factory: Arc<CommandFactory>,
    namespaces: Vec<String>,
    read_only: bool,
    entry_point: PathBuf,
    clients: ClientCache,
}

impl CommandGroupDiscoveryStrategy {
    pub fn new(
        factory: Arc<CommandFactory>,
        namespaces: Vec<String>,
        read_only: bool,
        entry_point: Option<&PathBuf>,
    ) -> Result<Self> {
        let entry_point =
            resolve_entry_point(entry_point).map_err(|e| Error::Configuration(e.to_string()))?;

        Ok(Self {
            factory,
            namespaces,
            read_only,
            entry_point,
            clients: ClientCache::new(),
        })
    }
}

#[async_trait]
impl DiscoveryStrategy for CommandGroupDiscoveryStrategy {
    async fn discover_servers(&self) -> Result<Vec<Arc<dyn ServerProvider>>> {
        let providers: Vec<Arc<dyn ServerProvider>> = self
            .factory
            .root_groups()
            .into_iter()
            .filter(|group| {
                !IGNORED_GROUPS
                    .iter()
                    .any(|ignored| ignored.eq_ignore_ascii_case(&group.name))
            })
            .filter(|group| namespace_allowed(&self.namespaces, &group.name))
            .map(|group| {
                Arc::new(CommandGroupProvider::new(
                    group.name,
                    group.description,
                    self.entry_point.clone(),
                    self.read_only,
                )) as Arc<dyn ServerProvider>
            })
            .collect();

        tracing::debug!(
            strategy = "command-group",
            count = providers.len(),
            "discovered servers"
        );
        Ok(providers)
    }

    fn client_cache(&self) -> &ClientCache {
        &self.clients
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EchoCommand;

    fn factory() -> Arc<CommandFactory> {
        let mut factory = CommandFactory::new();
        for group in ["storage", "tools", "cosmos", "server", "extension", "monitor"] {
            let path = factory.add_group("", group, &format!("{group} commands")).unwrap();
            factory
                .add_command(&path, "list", Arc::new(EchoCommand::read_only("list")))
                .unwrap();
        }
        Arc::new(factory)
    }

    async fn names(strategy: &CommandGroupDiscoveryStrategy) -> Vec<String> {
        strategy
            .discover_servers()
            .await
            .unwrap()
            .iter()
            .map(|p| p.metadata().name)
            .collect()
    }

    #[tokio::test]
    async fn ignored_groups_are_skipped() {
        let strategy = CommandGroupDiscoveryStrategy::new(factory(), vec![], false, None).unwrap();
        assert_eq!(names(&strategy).await, vec!["storage", "cosmos", "monitor"]);
    }

    #[tokio::test]
    async fn discovery_is_repeatable() {
        let strategy = CommandGroupDiscoveryStrategy::new(factory(), vec![], false, None).unwrap();
        assert_eq!(names(&strategy).await, names(&strategy).await);
    }

    #[tokio::test]
    async fn namespace_filter_is_case_insensitive() {
        let strategy = CommandGroupDiscoveryStrategy::new(
            factory(),
            vec!["STORAGE".into(), "Monitor".into(), "tools".into()],
            false,
            None,
        )
        .unwrap();
        assert_eq!(names(&strategy).await, vec!["storage", "monitor"]);
    }

    #[tokio::test]
    async fn providers_share_entry_point() {
        let entry = PathBuf::from("/usr/local/bin/azmcp");
        let strategy =
            CommandGroupDiscoveryStrategy::new(factory(), vec![], true, Some(&entry)).unwrap();
        let provider = strategy.find_server_provider("cosmos").await.unwrap();
        assert_eq!(provider.metadata().description, "cosmos commands");
        assert_eq!(strategy.entry_point, entry);
    }
}
