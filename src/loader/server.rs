use std::sync::Arc;

use async_trait::async_trait;

use super::ToolLoader;
use crate::error::Result;
use crate::peer::CallContext;
use crate::proxy::{ProxyToolOperations, RoutingRequest};
use crate::tool::{routing_input_schema, ToolCall, ToolDescriptor, ToolOutput};

/// One proxy tool per discovered server. Calls are routed to the server the
/// tool is named after.
///
/// Serves both registry servers and per-namespace command groups; the
/// discovery strategy behind the router decides which.
pub struct ServerToolLoader {
    router: Arc<ProxyToolOperations>,
}

impl ServerToolLoader {
    pub fn new(router: Arc<ProxyToolOperations>) -> Self {
        Self { router }
    }
}

fn proxy_description(name: &str, description: &str) -> String {
    format!(
        "{description}\n\nThis tool fronts the '{name}' commands. Set \"learn\" to true to list \
         them, then call again with \"command\" and \"parameters\". If you are unsure which \
         command fits, describe the goal in \"intent\"."
    )
}

#[async_trait]
impl ToolLoader for ServerToolLoader {
    async fn list_tools(&self, _context: &CallContext) -> Result<Vec<ToolDescriptor>> {
        let providers = self.router.discovery().discover_servers().await?;
        Ok(providers
            .iter()
            .map(|provider| {
                let metadata = provider.metadata();
                ToolDescriptor::new(
                    &metadata.name,
                    proxy_description(&metadata.name, &metadata.description),
                    routing_input_schema(false),
                )
            })
            .collect())
    }

    async fn call_tool(&self, call: ToolCall, context: &CallContext) -> Result<ToolOutput> {
        if let Err(e) = self.router.discovery().find_server_provider(&call.name).await {
            return Ok(ToolOutput::error(format!("The tool '{}' was not found: {e}", call.name)));
        }

        let request = RoutingRequest::from_arguments(call.arguments.as_ref());
        self.router.route(Some(&call.name), request, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ServerProvider;
    use crate::proxy::RouterSettings;
    use crate::test_support::{args, tool, MockClient, MockProvider, StaticDiscovery};
    use serde_json::json;

    fn loader() -> (ServerToolLoader, Arc<MockProvider>) {
        let storage = Arc::new(MockProvider::new("storage").with_client(
            MockClient::default().with_tools(vec![tool("account_list", "List accounts", true)]),
        ));
        let discovery = StaticDiscovery::new(vec![
            storage.clone() as Arc<dyn ServerProvider>,
            Arc::new(MockProvider::new("documentation")),
        ]);
        let router = ProxyToolOperations::new(Arc::new(discovery), RouterSettings::default());
        (ServerToolLoader::new(Arc::new(router)), storage)
    }

    #[tokio::test]
    async fn lists_one_routing_tool_per_server() {
        let (loader, _) = loader();
        let tools = loader.list_tools(&CallContext::detached()).await.unwrap();

        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["storage", "documentation"]);
        assert!(tools[0].description.starts_with("storage tools"));
        assert!(!tools[0].input_schema["properties"].as_object().unwrap().contains_key("tool"));
    }

    #[tokio::test]
    async fn calls_route_to_the_named_server() {
        let (loader, storage) = loader();
        let output = loader
            .call_tool(
                ToolCall::new("storage", Some(args(json!({ "command": "account_list" })))),
                &CallContext::detached(),
            )
            .await
            .unwrap();

        assert_eq!(output.text(), "called account_list");
        assert_eq!(storage.client().calls().len(), 1);
    }

    #[tokio::test]
    async fn unknown_server_is_an_error_result() {
        let (loader, _) = loader();
        let output = loader
            .call_tool(ToolCall::new("monitor", None), &CallContext::detached())
            .await
            .unwrap();
        assert!(output.is_error);
        assert!(output.text().contains("monitor"));
    }
}
