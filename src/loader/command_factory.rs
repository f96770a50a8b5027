use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::ToolLoader;
use crate::commands::{describe, required_options, Command, CommandFactory};
use crate::error::Result;
use crate::peer::CallContext;
use crate::proxy::MISSING_REQUIRED_OPTIONS;
use crate::tool::{ToolCall, ToolDescriptor, ToolOutput};

/// Exposes in-process commands directly, one tool per command.
pub struct CommandFactoryToolLoader {
    factory: Arc<CommandFactory>,
    namespaces: Vec<String>,
    read_only: bool,
}

impl CommandFactoryToolLoader {
    pub fn new(factory: Arc<CommandFactory>, namespaces: Vec<String>, read_only: bool) -> Self {
        Self {
            factory,
            namespaces,
            read_only,
        }
    }

    fn commands(&self) -> BTreeMap<String, Arc<dyn Command>> {
        self.factory.commands_in(&self.namespaces)
    }
}

fn missing_options(schema: &Map<String, Value>, arguments: &Map<String, Value>) -> Vec<String> {
    required_options(schema)
        .into_iter()
        .filter(|name| arguments.get(name).map_or(true, Value::is_null))
        .collect()
}

#[async_trait]
impl ToolLoader for CommandFactoryToolLoader {
    async fn list_tools(&self, _context: &CallContext) -> Result<Vec<ToolDescriptor>> {
        Ok(self
            .commands()
            .iter()
            .filter(|(_, command)| !command.hidden())
            .filter(|(_, command)| !self.read_only || command.metadata().read_only)
            .map(|(name, command)| describe(name, command.as_ref()))
            .collect())
    }

    async fn call_tool(&self, call: ToolCall, context: &CallContext) -> Result<ToolOutput> {
        let Some(command) = self.commands().remove(&call.name) else {
            tracing::warn!(tool = %call.name, "call to unknown command");
            return Ok(ToolOutput::error(format!(
                "The tool '{}' was not found.",
                call.name
            )));
        };

        let Some(arguments) = call.arguments else {
            return Ok(ToolOutput::error(format!(
                "The tool '{}' was called without parameters. Pass an object, empty if the \
                 command takes no options.",
                call.name
            )));
        };
        let missing = missing_options(&command.input_schema(), &arguments);
        if !missing.is_empty() {
            return Ok(ToolOutput::error(format!(
                "{MISSING_REQUIRED_OPTIONS}: {}",
                missing.join(", ")
            )));
        }

        tracing::info!(tool = %call.name, "executing command");
        let result = context.run(async { Ok(command.execute(arguments).await) }).await?;

        Ok(match result {
            Ok(results) => ToolOutput::success(
                json!({ "status": 200, "message": "Success", "results": results }).to_string(),
            ),
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "command failed");
                ToolOutput::error(json!({ "status": 500, "message": e.to_string() }).to_string())
            }
        })
    }
}
