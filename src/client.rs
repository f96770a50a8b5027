//! Connected child MCP clients and the per-component cache that owns them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rmcp::service::RunningService;
use rmcp::RoleClient;
use tokio::sync::OnceCell;

use crate::error::{Error, Result};
use crate::tool::{ToolCall, ToolDescriptor, ToolOutput};

/// Default budget for spawning or connecting to a child server.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Options applied when a provider creates a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// The two requests the router needs from a child server.
#[async_trait]
pub trait McpClient: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    async fn call_tool(&self, call: ToolCall) -> Result<ToolOutput>;
}

/// An rmcp client session running over stdio or HTTP.
pub struct RmcpClient {
    server: String,
    service: RunningService<RoleClient, ()>,
}

impl RmcpClient {
    pub fn new(server: impl Into<String>, service: RunningService<RoleClient, ()>) -> Self {
        Self {
            server: server.into(),
            service,
        }
    }
}

#[async_trait]
impl McpClient for RmcpClient {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let tools = self
            .service
            .peer()
            .list_all_tools()
            .await
            .map_err(|e| Error::ChildCall {
                target: self.server.clone(),
                message: format!("tools/list failed: {e}"),
            })?;

        tracing::debug!(server = %self.server, count = tools.len(), "listed child tools");
        Ok(tools.iter().map(ToolDescriptor::from).collect())
    }

    async fn call_tool(&self, call: ToolCall) -> Result<ToolOutput> {
        let result = self
            .service
            .peer()
            .call_tool(call.to_wire()?)
            .await
            .map_err(|e| Error::ChildCall {
                target: self.server.clone(),
                message: format!("tools/call '{}' failed: {e}", call.name),
            })?;

        Ok(result.into())
    }
}

/// Connected clients keyed by case-insensitive server name.
///
/// Each key holds a `OnceCell`, so concurrent first requests share one
/// creation and a cancelled or failed creation leaves the key empty.
#[derive(Default)]
pub struct ClientCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<Arc<dyn McpClient>>>>>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_try_init<F, Fut>(&self, name: &str, create: F) -> Result<Arc<dyn McpClient>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn McpClient>>>,
    {
        let cell = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| Error::Invariant("client cache lock poisoned".into()))?;
            entries.entry(name.to_lowercase()).or_default().clone()
        };

        cell.get_or_try_init(create).await.cloned()
    }

    /// Number of fully initialised clients.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|cell| cell.initialized()).count())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
