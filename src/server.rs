use std::sync::Arc;

use rmcp::{
    ErrorData, RoleServer, ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, Implementation, ListToolsResult,
        PaginatedRequestParams, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
};

use crate::commands::CommandFactory;
use crate::config::{ServerMode, ServerOptions};
use crate::discovery::{
    CommandGroupDiscoveryStrategy, CompositeDiscoveryStrategy, DiscoveryStrategy,
    RegistryDiscoveryStrategy,
};
use crate::error::{Error, Result};
use crate::loader::{
    CommandFactoryToolLoader, CompositeToolLoader, ServerToolLoader, SingleProxyToolLoader,
    ToolLoader,
};
use crate::peer::{CallContext, RmcpPeer};
use crate::proxy::{ProxyToolOperations, RouterSettings};
use crate::tool::ToolCall;

// ---------------------------------------------------------------------------
// Loader assembly
// ---------------------------------------------------------------------------

fn router(options: &ServerOptions, discovery: Arc<dyn DiscoveryStrategy>) -> Arc<ProxyToolOperations> {
    Arc::new(ProxyToolOperations::new(
        discovery,
        RouterSettings {
            read_only: options.read_only,
            call_timeout: options.call_timeout,
            sampling_timeout: options.sampling_timeout,
            ..RouterSettings::default()
        },
    ))
}

/// Build the tool surface for `options.mode`.
///
/// * `single` - one `azure` tool over command groups and registry servers.
/// * `namespace` - one routing tool per command group and registry server.
/// * `all` - every in-process command as a tool, plus one routing tool per
///   registry server. Child processes spawned by the other modes run this way.
pub fn build_loader(options: &ServerOptions, factory: Arc<CommandFactory>) -> Result<Arc<dyn ToolLoader>> {
    let registry: Arc<dyn DiscoveryStrategy> =
        Arc::new(RegistryDiscoveryStrategy::embedded(&options.namespaces)?);

    let loader: Arc<dyn ToolLoader> = match options.mode {
        ServerMode::Single | ServerMode::Namespace => {
            let groups: Arc<dyn DiscoveryStrategy> = Arc::new(CommandGroupDiscoveryStrategy::new(
                factory,
                options.namespaces.clone(),
                options.read_only,
                options.entry_point.as_ref(),
            )?);
            let discovery = Arc::new(CompositeDiscoveryStrategy::new(vec![groups, registry])?);
            let router = router(options, discovery);

            if options.mode == ServerMode::Single {
                Arc::new(SingleProxyToolLoader::new(router))
            } else {
                Arc::new(ServerToolLoader::new(router))
            }
        }
        ServerMode::All => Arc::new(CompositeToolLoader::new(vec![
            Arc::new(ServerToolLoader::new(router(options, registry))),
            Arc::new(CommandFactoryToolLoader::new(
                factory,
                options.namespaces.clone(),
                options.read_only,
            )),
        ])?),
    };

    tracing::info!(
        mode = ?options.mode,
        namespaces = ?options.namespaces,
        read_only = options.read_only,
        "tool loader ready"
    );
    Ok(loader)
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// MCP server that exposes Azure services through the configured tool loader.
#[derive(Clone)]
pub struct AzureMcpServer {
    loader: Arc<dyn ToolLoader>,
}

impl AzureMcpServer {
    pub fn new(loader: Arc<dyn ToolLoader>) -> Self {
        Self { loader }
    }
}

fn call_context(context: &RequestContext<RoleServer>) -> CallContext {
    CallContext::new(Arc::new(RmcpPeer::from_context(context)), context.ct.clone())
}

fn to_error_data(error: Error) -> ErrorData {
    match error {
        Error::Cancelled => ErrorData::internal_error("operation cancelled", None),
        Error::InvalidArgument { .. } => ErrorData::invalid_params(error.to_string(), None),
        other => ErrorData::internal_error(other.to_string(), None),
    }
}

impl ServerHandler for AzureMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: "azure-mcp-server".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "This MCP server routes requests to Azure service tools.  Call a \
                 tool with learn=true to discover its commands, then call it again \
                 with command and parameters.  Describe your goal in intent when \
                 unsure which command fits."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let tools = self
            .loader
            .list_tools(&call_context(&context))
            .await
            .map_err(to_error_data)?;

        Ok(ListToolsResult::with_all_items(
            tools.iter().map(Tool::from).collect(),
        ))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let call = ToolCall::new(request.name.to_string(), request.arguments);
        tracing::debug!(tool = %call.name, "tools/call");

        self.loader
            .call_tool(call, &call_context(&context))
            .await
            .map(CallToolResult::from)
            .map_err(to_error_data)
    }
}
