use std::sync::Arc;

use async_trait::async_trait;

use super::ToolLoader;
use crate::error::Result;
use crate::peer::CallContext;
use crate::proxy::{ProxyToolOperations, RoutingRequest};
use crate::tool::{routing_input_schema, ToolCall, ToolDescriptor, ToolOutput};

pub const SINGLE_PROXY_TOOL: &str = "azure";

const DESCRIPTION: &str = "Run Azure operations through a single entry point. Set \"learn\" \
to true to list the available tools, pick one with \"tool\", then set \"learn\" again to list its \
commands. Run a command by passing \"tool\", \"command\" and \"parameters\". Describe the goal \
in \"intent\" when unsure which tool or command fits.";

/// Exposes every discovered server behind one tool; the `tool` argument
/// selects the server.
pub struct SingleProxyToolLoader {
    router: Arc<ProxyToolOperations>,
}

impl SingleProxyToolLoader {
    pub fn new(router: Arc<ProxyToolOperations>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl ToolLoader for SingleProxyToolLoader {
    async fn list_tools(&self, _context: &CallContext) -> Result<Vec<ToolDescriptor>> {
        Ok(vec![ToolDescriptor::new(
            SINGLE_PROXY_TOOL,
            DESCRIPTION,
            routing_input_schema(true),
        )])
    }

    async fn call_tool(&self, call: ToolCall, context: &CallContext) -> Result<ToolOutput> {
        if !call.name.eq_ignore_ascii_case(SINGLE_PROXY_TOOL) {
            return Ok(ToolOutput::error(format!("The tool '{}' was not found.", call.name)));
        }

        let request = RoutingRequest::from_arguments(call.arguments.as_ref());
        self.router.route(None, request, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ServerProvider;
    use crate::proxy::RouterSettings;
    use crate::test_support::{args, MockProvider, StaticDiscovery};
    use serde_json::json;

    fn loader() -> SingleProxyToolLoader {
        let discovery = StaticDiscovery::new(vec![
            Arc::new(MockProvider::new("storage")) as Arc<dyn ServerProvider>,
            Arc::new(MockProvider::new("cosmos")),
        ]);
        let router = ProxyToolOperations::new(Arc::new(discovery), RouterSettings::default());
        SingleProxyToolLoader::new(Arc::new(router))
    }

    #[tokio::test]
    async fn advertises_exactly_one_tool() {
        let tools = loader().list_tools(&CallContext::detached()).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "azure");
        assert!(tools[0].input_schema["properties"].as_object().unwrap().contains_key("tool"));
    }

    #[tokio::test]
    async fn learn_without_tool_lists_servers() {
        let output = loader()
            .call_tool(
                ToolCall::new("azure", Some(args(json!({ "learn": true })))),
                &CallContext::detached(),
            )
            .await
            .unwrap();
        let text = output.text();
        assert!(text.contains("storage"));
        assert!(text.contains("cosmos"));
    }

    #[tokio::test]
    async fn other_names_are_rejected() {
        let output = loader()
            .call_tool(ToolCall::new("storage", None), &CallContext::detached())
            .await
            .unwrap();
        assert!(output.is_error);
    }
}
