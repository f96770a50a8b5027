//! Tool loaders: the surface a hosting server exposes as `tools/list` and
//! `tools/call`.

mod command_factory;
mod composite;
mod server;
mod single_proxy;

pub use command_factory::CommandFactoryToolLoader;
pub use composite::CompositeToolLoader;
pub use server::ServerToolLoader;
pub use single_proxy::SingleProxyToolLoader;

use async_trait::async_trait;

use crate::error::Result;
use crate::peer::CallContext;
use crate::tool::{ToolCall, ToolDescriptor, ToolOutput};

/// Produces a tool list and executes calls against it.
///
/// User-facing failures (unknown tool, failed child call) are `is_error`
/// outputs. `Err` is reserved for cancellation and broken collaborators.
#[async_trait]
pub trait ToolLoader: Send + Sync {
    async fn list_tools(&self, context: &CallContext) -> Result<Vec<ToolDescriptor>>;

    async fn call_tool(&self, call: ToolCall, context: &CallContext) -> Result<ToolOutput>;
}
