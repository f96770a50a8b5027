//! In-process commands and the group tree they are registered in.
//!
//! Groups live in a flat arena keyed by dotted path (`""` is the root,
//! `cosmos.database` a nested group). A command's tool name is its full path
//! with dots replaced by underscores.

pub mod cosmos;
pub mod sql;
pub mod tools;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::tool::{ToolAnnotations, ToolDescriptor};

/// Declarative behaviour flags attached to a command at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandMetadata {
    pub title: String,
    pub read_only: bool,
    pub destructive: bool,
    pub idempotent: bool,
    pub open_world: bool,
}

impl CommandMetadata {
    /// Metadata for a query that neither mutates nor depends on call order.
    pub fn read_only(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            read_only: true,
            destructive: false,
            idempotent: true,
            open_world: false,
        }
    }
}

impl From<&CommandMetadata> for ToolAnnotations {
    fn from(metadata: &CommandMetadata) -> Self {
        Self {
            title: Some(metadata.title.clone()),
            read_only_hint: Some(metadata.read_only),
            destructive_hint: Some(metadata.destructive),
            idempotent_hint: Some(metadata.idempotent),
            open_world_hint: Some(metadata.open_world),
        }
    }
}

#[async_trait]
pub trait Command: Send + Sync {
    fn description(&self) -> &str;

    fn metadata(&self) -> CommandMetadata;

    /// JSON Schema (`type: object`) of the command's options.
    fn input_schema(&self) -> Map<String, Value>;

    /// Hidden commands are never advertised as tools.
    fn hidden(&self) -> bool {
        false
    }

    async fn execute(&self, arguments: Map<String, Value>) -> anyhow::Result<Value>;
}

/// Derive an option schema from a typed option model.
pub fn options_schema<T: JsonSchema>() -> Map<String, Value> {
    let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
    let mut object = match schema {
        Value::Object(object) => object,
        _ => Map::new(),
    };
    object.remove("$schema");
    object.remove("title");
    object.insert("type".into(), Value::String("object".into()));
    object
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    object
}

/// Names listed under `required` in an option schema.
pub fn required_options(schema: &Map<String, Value>) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse call arguments into a command's typed option model.
pub fn parse_options<T: DeserializeOwned>(arguments: Map<String, Value>) -> anyhow::Result<T> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| anyhow::anyhow!("Invalid options: {e}"))
}

#[derive(Default)]
struct GroupNode {
    name: String,
    description: String,
    children: Vec<String>,
    commands: BTreeMap<String, Arc<dyn Command>>,
}

/// A command group as exposed to discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandGroupInfo {
    pub name: String,
    pub description: String,
}

/// Registry of command groups and their commands.
pub struct CommandFactory {
    groups: HashMap<String, GroupNode>,
}

impl Default for CommandFactory {
    fn default() -> Self {
        let mut groups = HashMap::new();
        groups.insert(
            String::new(),
            GroupNode {
                description: "Azure MCP Server".into(),
                ..Default::default()
            },
        );
        Self { groups }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

impl CommandFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The factory with every built-in group registered.
    pub fn with_builtin_commands(config: Arc<Config>) -> Result<Self> {
        let mut factory = Self::new();
        cosmos::register(&mut factory, &config)?;
        sql::register(&mut factory, &config)?;
        tools::register(&mut factory)?;
        Ok(factory)
    }

    /// Add a group under `parent` (`""` for the root) and return its path.
    pub fn add_group(&mut self, parent: &str, name: &str, description: &str) -> Result<String> {
        let name = crate::error::require_name(name, "name")?;
        if !self.groups.contains_key(parent) {
            return Err(Error::NotFound(format!("command group '{parent}'")));
        }

        let path = join_path(parent, name);
        if !self.groups.contains_key(&path) {
            self.groups.insert(
                path.clone(),
                GroupNode {
                    name: name.to_string(),
                    description: description.to_string(),
                    ..Default::default()
                },
            );
            if let Some(parent_node) = self.groups.get_mut(parent) {
                parent_node.children.push(path.clone());
            }
        }
        Ok(path)
    }

    pub fn add_command(&mut self, group: &str, name: &str, command: Arc<dyn Command>) -> Result<()> {
        let name = crate::error::require_name(name, "name")?;
        let node = self
            .groups
            .get_mut(group)
            .ok_or_else(|| Error::NotFound(format!("command group '{group}'")))?;
        node.commands.insert(name.to_string(), command);
        Ok(())
    }

    /// Immediate children of the root, in registration order.
    pub fn root_groups(&self) -> Vec<CommandGroupInfo> {
        self.groups
            .get("")
            .map(|root| {
                root.children
                    .iter()
                    .filter_map(|path| self.groups.get(path))
                    .map(|node| CommandGroupInfo {
                        name: node.name.clone(),
                        description: node.description.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every command keyed by tool name, hidden ones included.
    pub fn all_commands(&self) -> BTreeMap<String, Arc<dyn Command>> {
        let mut commands = BTreeMap::new();
        for (path, node) in &self.groups {
            for (name, command) in &node.commands {
                let full = join_path(path, name);
                commands.insert(full.replace('.', "_"), command.clone());
            }
        }
        commands
    }

    /// Commands whose top-level group is in `namespaces` (case-insensitive).
    /// An empty list selects every command.
    pub fn commands_in(&self, namespaces: &[String]) -> BTreeMap<String, Arc<dyn Command>> {
        if namespaces.is_empty() {
            return self.all_commands();
        }

        let mut commands = BTreeMap::new();
        for (path, node) in &self.groups {
            let top = path.split('.').next().unwrap_or_default();
            if path.is_empty() || !namespaces.iter().any(|n| n.eq_ignore_ascii_case(top)) {
                continue;
            }
            for (name, command) in &node.commands {
                commands.insert(join_path(path, name).replace('.', "_"), command.clone());
            }
        }
        commands
    }
}

/// Tool descriptor for a registered command.
pub fn describe(tool_name: &str, command: &dyn Command) -> ToolDescriptor {
    ToolDescriptor::new(tool_name, command.description(), command.input_schema())
        .with_annotations(ToolAnnotations::from(&command.metadata()))
}
