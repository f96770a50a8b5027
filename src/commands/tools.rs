//! Introspection commands. Their groups are not service namespaces, so
//! discovery skips them.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{options_schema, parse_options, Command, CommandFactory, CommandMetadata};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NoOptions {}

/// Register `tools list` and `server info`. Call after every service group so
/// the tool listing sees them.
pub fn register(factory: &mut CommandFactory) -> crate::error::Result<()> {
    let catalog = factory
        .all_commands()
        .into_iter()
        .filter(|(_, command)| !command.hidden())
        .map(|(name, command)| CatalogEntry {
            name,
            description: command.description().to_string(),
        })
        .collect();

    let tools = factory.add_group("", "tools", "Inspect the tools this server exposes.")?;
    factory.add_command(&tools, "list", Arc::new(ToolsListCommand { catalog }))?;

    let server = factory.add_group("", "server", "Information about this MCP server.")?;
    factory.add_command(&server, "info", Arc::new(ServerInfoCommand))?;
    Ok(())
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    name: String,
    description: String,
}

pub struct ToolsListCommand {
    catalog: Vec<CatalogEntry>,
}

#[async_trait]
impl Command for ToolsListCommand {
    fn description(&self) -> &str {
        "List every Azure command this server can run, with its description."
    }

    fn metadata(&self) -> CommandMetadata {
        CommandMetadata::read_only("List tools")
    }

    fn input_schema(&self) -> Map<String, Value> {
        options_schema::<NoOptions>()
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value> {
        let _options: NoOptions = parse_options(arguments)?;
        Ok(Value::Array(
            self.catalog
                .iter()
                .map(|entry| json!({ "name": entry.name, "description": entry.description }))
                .collect(),
        ))
    }
}

pub struct ServerInfoCommand;

#[async_trait]
impl Command for ServerInfoCommand {
    fn description(&self) -> &str {
        "Show the name and version of this MCP server."
    }

    fn metadata(&self) -> CommandMetadata {
        CommandMetadata::read_only("Server info")
    }

    fn hidden(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Map<String, Value> {
        options_schema::<NoOptions>()
    }

    async fn execute(&self, _arguments: Map<String, Value>) -> Result<Value> {
        Ok(json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EchoCommand;

    #[tokio::test]
    async fn tools_list_reports_registered_commands() {
        let mut factory = CommandFactory::new();
        let storage = factory.add_group("", "storage", "Storage").unwrap();
        factory
            .add_command(&storage, "list", Arc::new(EchoCommand::read_only("list accounts")))
            .unwrap();
        register(&mut factory).unwrap();

        let commands = factory.all_commands();
        let command = &commands["tools_list"];
        let listed = command.execute(Map::new()).await.unwrap();
        assert_eq!(
            listed,
            json!([{ "name": "storage_list", "description": "list accounts" }])
        );
        assert!(commands["server_info"].hidden());
    }
}
