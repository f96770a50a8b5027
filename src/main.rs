mod client;
mod commands;
mod config;
mod discovery;
mod error;
mod loader;
mod peer;
mod provider;
mod proxy;
mod registry;
mod server;
mod tool;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rmcp::transport::stdio;
use rmcp::ServiceExt;

use commands::CommandFactory;
use config::{Config, ServerMode, ServerOptions};
use server::AzureMcpServer;

/// Azure MCP server: routes agents to Azure service tools.
#[derive(Debug, Parser)]
#[command(name = "azure-mcp-server", version, about)]
struct Args {
    /// How tools are exposed.
    #[arg(long, value_enum, default_value_t = ServerMode::Namespace)]
    mode: ServerMode,

    /// Restrict the server to these namespaces. Repeatable.
    #[arg(long = "namespace")]
    namespaces: Vec<String>,

    /// Only advertise tools that do not modify resources.
    #[arg(long)]
    read_only: bool,

    /// Seconds to wait for a child tool call.
    #[arg(long, default_value_t = 120)]
    call_timeout_secs: u64,

    /// Seconds to wait for a sampling response from the client.
    #[arg(long, default_value_t = 60)]
    sampling_timeout_secs: u64,

    /// Executable started for namespace child servers. Defaults to this binary.
    #[arg(long)]
    entry_point: Option<PathBuf>,
}

impl From<Args> for ServerOptions {
    fn from(args: Args) -> Self {
        Self {
            mode: args.mode,
            namespaces: args.namespaces,
            read_only: args.read_only,
            entry_point: args.entry_point,
            call_timeout: Duration::from_secs(args.call_timeout_secs),
            sampling_timeout: Duration::from_secs(args.sampling_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Write structured logs to stderr so stdout stays clean for MCP JSON-RPC.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_env("RUST_LOG")
                .add_directive("azure_mcp_server=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting azure-mcp-server v{}", env!("CARGO_PKG_VERSION"));

    let options = ServerOptions::from(args);
    let factory = Arc::new(CommandFactory::with_builtin_commands(Arc::new(
        Config::from_env(),
    ))?);
    let loader = server::build_loader(&options, factory)?;
    let server = AzureMcpServer::new(loader);

    let transport = stdio();

    tracing::info!(mode = ?options.mode, "MCP server listening on stdio");

    let running = server.serve(transport).await?;
    running.waiting().await?;

    Ok(())
}
