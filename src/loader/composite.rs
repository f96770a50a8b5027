use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::ToolLoader;
use crate::error::{Error, Result};
use crate::peer::CallContext;
use crate::tool::{ToolCall, ToolDescriptor, ToolOutput};

/// Concatenates the tool lists of several loaders and forwards each call to
/// the loader that listed the tool.
///
/// Ownership is learned on `list_tools`; calls made before any listing see no
/// tools. When two loaders list the same name the first one keeps it.
pub struct CompositeToolLoader {
    loaders: Vec<Arc<dyn ToolLoader>>,
    owners: RwLock<HashMap<String, usize>>,
}

impl CompositeToolLoader {
    pub fn new(loaders: Vec<Arc<dyn ToolLoader>>) -> Result<Self> {
        if loaders.is_empty() {
            return Err(Error::invalid_argument(
                "tool_loaders",
                "at least one tool loader is required",
            ));
        }
        Ok(Self {
            loaders,
            owners: RwLock::new(HashMap::new()),
        })
    }

    fn owner_of(&self, name: &str) -> Result<Option<Arc<dyn ToolLoader>>> {
        let owners = self
            .owners
            .read()
            .map_err(|_| Error::Invariant("tool owner map lock poisoned".into()))?;
        Ok(owners.get(name).map(|&index| self.loaders[index].clone()))
    }
}

#[async_trait]
impl ToolLoader for CompositeToolLoader {
    async fn list_tools(&self, context: &CallContext) -> Result<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut owners = HashMap::new();

        for (index, loader) in self.loaders.iter().enumerate() {
            for tool in loader.list_tools(context).await? {
                if owners.contains_key(&tool.name) {
                    tracing::warn!(tool = %tool.name, "tool listed by more than one loader");
                    continue;
                }
                owners.insert(tool.name.clone(), index);
                tools.push(tool);
            }
        }

        *self
            .owners
            .write()
            .map_err(|_| Error::Invariant("tool owner map lock poisoned".into()))? = owners;
        Ok(tools)
    }

    async fn call_tool(&self, call: ToolCall, context: &CallContext) -> Result<ToolOutput> {
        if call.arguments.is_none() {
            return Ok(ToolOutput::error(format!(
                "The tool '{}' was called without parameters.",
                call.name
            )));
        }
        if call.name.trim().is_empty() {
            return Ok(ToolOutput::error("A tool name is required."));
        }

        match self.owner_of(&call.name)? {
            Some(loader) => loader.call_tool(call, context).await,
            None => Ok(ToolOutput::error(format!(
                "The tool '{}' was not found. List the tools to see what is available.",
                call.name
            ))),
        }
    }
}
