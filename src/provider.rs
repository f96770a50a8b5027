//! Discoverable child MCP servers.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::transport::{ConfigureCommandExt, StreamableHttpClientTransport, TokioChildProcess};
use rmcp::ServiceExt;

use crate::client::{ClientOptions, McpClient, RmcpClient};
use crate::error::{with_timeout, Error, Result};
use crate::registry::{RegistryServerInfo, RegistryTransport};

/// Identity of a discoverable server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl ServerMetadata {
    /// Metadata whose id and name are both `name`.
    pub fn named(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            description: description.into(),
        }
    }
}

#[async_trait]
pub trait ServerProvider: Send + Sync {
    fn metadata(&self) -> ServerMetadata;

    /// Start or connect to the server. Each call yields a fresh client; caching
    /// is the caller's job.
    async fn create_client(&self, options: &ClientOptions) -> Result<Arc<dyn McpClient>>;
}

/// A top-level command group served by a child copy of this executable.
#[derive(Debug, Clone)]
pub struct CommandGroupProvider {
    group: String,
    description: String,
    entry_point: PathBuf,
    read_only: bool,
}

impl CommandGroupProvider {
    pub fn new(
        group: impl Into<String>,
        description: impl Into<String>,
        entry_point: PathBuf,
        read_only: bool,
    ) -> Self {
        Self {
            group: group.into(),
            description: description.into(),
            entry_point,
            read_only,
        }
    }

    /// Arguments that start the child in single-namespace mode.
    pub fn child_args(&self) -> Vec<String> {
        let mut args = vec![
            "--mode".to_string(),
            "all".to_string(),
            "--namespace".to_string(),
            self.group.clone(),
        ];
        if self.read_only {
            args.push("--read-only".to_string());
        }
        args
    }
}

#[async_trait]
impl ServerProvider for CommandGroupProvider {
    fn metadata(&self) -> ServerMetadata {
        ServerMetadata::named(&self.group, &self.description)
    }

    async fn create_client(&self, options: &ClientOptions) -> Result<Arc<dyn McpClient>> {
        let args = self.child_args();
        tracing::info!(
            server = %self.group,
            entry_point = %self.entry_point.display(),
            ?args,
            "spawning command group server"
        );

        let transport = TokioChildProcess::new(
            tokio::process::Command::new(&self.entry_point).configure(|cmd| {
                cmd.args(&args).stderr(Stdio::inherit());
            }),
        )
        .map_err(|e| Error::Transport {
            server: self.group.clone(),
            message: format!("failed to spawn child process: {e}"),
        })?;

        let service = with_timeout("child server startup", options.connect_timeout, async {
            ().serve(transport).await.map_err(|e| Error::Transport {
                server: self.group.clone(),
                message: format!("MCP initialize failed: {e}"),
            })
        })
        .await?;

        Ok(Arc::new(RmcpClient::new(&self.group, service)))
    }
}

/// An external server described by the registry document.
#[derive(Debug, Clone)]
pub struct RegistryProvider {
    name: String,
    info: RegistryServerInfo,
}

impl RegistryProvider {
    pub fn new(name: impl Into<String>, info: RegistryServerInfo) -> Self {
        Self {
            name: name.into(),
            info,
        }
    }
}

#[async_trait]
impl ServerProvider for RegistryProvider {
    fn metadata(&self) -> ServerMetadata {
        ServerMetadata::named(&self.name, &self.info.description)
    }

    async fn create_client(&self, options: &ClientOptions) -> Result<Arc<dyn McpClient>> {
        let service = match self.info.transport(&self.name)? {
            RegistryTransport::Remote { url } => {
                tracing::info!(server = %self.name, %url, "connecting to remote registry server");
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());
                with_timeout("registry server connect", options.connect_timeout, async {
                    ().serve(transport).await.map_err(|e| Error::Transport {
                        server: self.name.clone(),
                        message: format!("MCP initialize over HTTP failed: {e}"),
                    })
                })
                .await?
            }
            RegistryTransport::Stdio { command, args, env } => {
                tracing::info!(server = %self.name, %command, ?args, "spawning registry server");
                let transport = TokioChildProcess::new(
                    tokio::process::Command::new(&command).configure(|cmd| {
                        cmd.args(&args).envs(&env).stderr(Stdio::inherit());
                    }),
                )
                .map_err(|e| Error::Transport {
                    server: self.name.clone(),
                    message: format!("failed to spawn '{command}': {e}"),
                })?;

                with_timeout("registry server startup", options.connect_timeout, async {
                    ().serve(transport).await.map_err(|e| Error::Transport {
                        server: self.name.clone(),
                        message: format!("MCP initialize over stdio failed: {e}"),
                    })
                })
                .await?
            }
        };

        Ok(Arc::new(RmcpClient::new(&self.name, service)))
    }
}
