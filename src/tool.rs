//! Transport-neutral tool model shared by loaders, providers and the router.
//!
//! Everything above the MCP boundary speaks these types; conversion to and from
//! `rmcp::model` happens here and nowhere else.

use std::sync::Arc;

use rmcp::model::{self as wire, CallToolResult, Content};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};

/// Behavioural hints advertised alongside a tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

/// One advertised tool: name, description, JSON-Schema input contract and hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Map<String, Value>,
    #[serde(default)]
    pub annotations: ToolAnnotations,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Map<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            annotations: ToolAnnotations::default(),
        }
    }

    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.annotations.read_only_hint == Some(true)
    }
}

/// A `tools/call` request as seen by loaders.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Option<Map<String, Value>>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Option<Map<String, Value>>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Build an outbound rmcp request parameter value.
    ///
    /// Goes through JSON so the optional protocol fields (`_meta`, task
    /// augmentation) take their defaults.
    pub fn to_wire<T: DeserializeOwned>(&self) -> Result<T> {
        let mut params = json!({ "name": self.name });
        if let Some(arguments) = &self.arguments {
            params["arguments"] = Value::Object(arguments.clone());
        }
        serde_json::from_value(params).map_err(|e| Error::ChildCall {
            target: self.name.clone(),
            message: format!("could not encode call parameters: {e}"),
        })
    }
}

/// Result of a tool invocation: text content blocks plus an error flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: Vec<String>,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            content: vec![text.into()],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![text.into()],
            is_error: true,
        }
    }

    /// All content blocks joined with newlines.
    pub fn text(&self) -> String {
        self.content.join("\n")
    }
}

impl From<&wire::Tool> for ToolDescriptor {
    fn from(tool: &wire::Tool) -> Self {
        let annotations = tool
            .annotations
            .as_ref()
            .map(|a| ToolAnnotations {
                title: a.title.clone(),
                read_only_hint: a.read_only_hint,
                destructive_hint: a.destructive_hint,
                idempotent_hint: a.idempotent_hint,
                open_world_hint: a.open_world_hint,
            })
            .unwrap_or_default();

        Self {
            name: tool.name.to_string(),
            description: tool.description.as_deref().unwrap_or_default().to_string(),
            input_schema: (*tool.input_schema).clone(),
            annotations,
        }
    }
}

impl From<&ToolDescriptor> for wire::Tool {
    fn from(descriptor: &ToolDescriptor) -> Self {
        let mut tool = wire::Tool::new(
            descriptor.name.clone(),
            descriptor.description.clone(),
            Arc::new(descriptor.input_schema.clone()),
        );

        let hints = &descriptor.annotations;
        if *hints != ToolAnnotations::default() {
            let mut annotations = wire::ToolAnnotations::default();
            annotations.title = hints.title.clone();
            annotations.read_only_hint = hints.read_only_hint;
            annotations.destructive_hint = hints.destructive_hint;
            annotations.idempotent_hint = hints.idempotent_hint;
            annotations.open_world_hint = hints.open_world_hint;
            tool.annotations = Some(annotations);
        }
        tool
    }
}

impl From<CallToolResult> for ToolOutput {
    fn from(result: CallToolResult) -> Self {
        let content = result
            .content
            .iter()
            .map(|block| match block.as_text() {
                Some(text) => text.text.clone(),
                None => serde_json::to_string(block).unwrap_or_default(),
            })
            .collect();

        Self {
            content,
            is_error: result.is_error.unwrap_or(false),
        }
    }
}

impl From<ToolOutput> for CallToolResult {
    fn from(output: ToolOutput) -> Self {
        let content = output.content.into_iter().map(Content::text).collect();
        if output.is_error {
            CallToolResult::error(content)
        } else {
            CallToolResult::success(content)
        }
    }
}

/// Input schema shared by every proxy tool.
///
/// `include_tool` adds the `tool` selector used when one proxy fronts every
/// server.
pub fn routing_input_schema(include_tool: bool) -> Map<String, Value> {
    let mut properties = Map::new();
    if include_tool {
        properties.insert(
            "tool".into(),
            json!({
                "type": "string",
                "description": "The server (namespace) to route to. Omit and set learn=true to list servers."
            }),
        );
    }
    properties.insert(
        "intent".into(),
        json!({
            "type": "string",
            "description": "What you are trying to accomplish, in plain language."
        }),
    );
    properties.insert(
        "command".into(),
        json!({
            "type": "string",
            "description": "The exact command to run. Discover commands with learn=true."
        }),
    );
    properties.insert(
        "parameters".into(),
        json!({
            "type": "object",
            "description": "Arguments for the command, keyed by parameter name.",
            "additionalProperties": true
        }),
    );
    properties.insert(
        "learn".into(),
        json!({
            "type": "boolean",
            "description": "Set to true to list the available commands and their parameters.",
            "default": false
        }),
    );

    let mut schema = Map::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), Value::Object(properties));
    schema.insert("additionalProperties".into(), json!(false));
    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_survives_wire_conversion() {
        let descriptor = ToolDescriptor::new(
            "cosmos_database_list",
            "List databases",
            routing_input_schema(false),
        )
        .with_annotations(ToolAnnotations {
            title: Some("List databases".into()),
            read_only_hint: Some(true),
            ..Default::default()
        });

        let tool = wire::Tool::from(&descriptor);
        assert_eq!(ToolDescriptor::from(&tool), descriptor);
    }

    #[test]
    fn output_keeps_error_flag_across_the_boundary() {
        let result = CallToolResult::from(ToolOutput::error("nope"));
        assert_eq!(result.is_error, Some(true));

        let back = ToolOutput::from(result);
        assert!(back.is_error);
        assert_eq!(back.text(), "nope");
    }

    #[test]
    fn routing_schema_forbids_extra_properties() {
        let schema = routing_input_schema(true);
        assert_eq!(schema["additionalProperties"], json!(false));
        let properties = schema["properties"].as_object().unwrap();
        for key in ["tool", "intent", "command", "parameters", "learn"] {
            assert!(properties.contains_key(key), "{key} missing");
        }
        assert!(!routing_input_schema(false)["properties"]
            .as_object()
            .unwrap()
            .contains_key("tool"));
    }
}
