//! Intent routing for proxy tools.
//!
//! A proxy tool call carries `{tool?, intent?, command?, parameters?, learn?}`
//! and resolves to exactly one of four modes, checked in this order:
//!
//! | mode      | entered when                                | result                                   |
//! |-----------|---------------------------------------------|------------------------------------------|
//! | guidance  | no command, no learn, no intent             | static usage text                        |
//! | learn     | `learn=true`, no command                    | command catalog, or inference if possible |
//! | direct    | command names a known child tool            | the child's response                     |
//! | inference | command absent or unknown, intent present   | sampling picks a command, then direct    |
//!
//! A missing `learn` with an intent and no command counts as `learn=true`.
//! Direct calls that fail on the child side fall back to the catalog.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use crate::client::ClientOptions;
use crate::discovery::DiscoveryStrategy;
use crate::error::{with_timeout, Error, Result};
use crate::peer::{CallContext, SamplingRequest};
use crate::tool::{ToolCall, ToolDescriptor, ToolOutput};

/// Substring a child uses to report absent required options.
pub const MISSING_REQUIRED_OPTIONS: &str = "Missing required options";

/// Tool name a sampling response uses when nothing matches.
const UNKNOWN_TOOL: &str = "Unknown";

const SAMPLING_MAX_TOKENS: u32 = 1000;

/// Arguments of a proxy tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingRequest {
    pub tool: Option<String>,
    pub intent: Option<String>,
    pub command: Option<String>,
    pub parameters: Map<String, Value>,
    pub learn: bool,
}

fn non_empty_string(arguments: &Map<String, Value>, key: &str) -> Option<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl RoutingRequest {
    /// Read routing fields from raw call arguments. Only a literal `true`
    /// enables `learn`.
    pub fn from_arguments(arguments: Option<&Map<String, Value>>) -> Self {
        let Some(arguments) = arguments else {
            return Self::default();
        };

        let mut request = Self {
            tool: non_empty_string(arguments, "tool"),
            intent: non_empty_string(arguments, "intent"),
            command: non_empty_string(arguments, "command"),
            parameters: arguments
                .get("parameters")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            learn: arguments.get("learn") == Some(&Value::Bool(true)),
        };

        if !request.learn && request.intent.is_some() && request.command.is_none() {
            request.learn = true;
        }
        request
    }
}

/// Router tuning.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Hide non-read-only child tools from catalogs. Direct calls by name are
    /// still forwarded.
    pub read_only: bool,
    pub call_timeout: Duration,
    pub sampling_timeout: Duration,
    pub client_options: ClientOptions,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            read_only: false,
            call_timeout: Duration::from_secs(120),
            sampling_timeout: Duration::from_secs(60),
            client_options: ClientOptions::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InferredCommand {
    tool: String,
    #[serde(default)]
    parameters: Map<String, Value>,
}

/// JSON shape a sampling response must follow.
fn inference_result_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tool": { "type": "string", "description": "Name of the selected tool, or \"Unknown\"." },
            "parameters": { "type": "object", "description": "Arguments for the selected tool." }
        },
        "required": ["tool", "parameters"],
        "additionalProperties": false
    })
}

/// Intent routing over the servers of one discovery strategy.
///
/// Child tool lists are cached per server name (case-insensitive) for the
/// lifetime of the instance; a restart is needed to see new child commands.
pub struct ProxyToolOperations {
    discovery: Arc<dyn DiscoveryStrategy>,
    settings: RouterSettings,
    tool_cache: RwLock<HashMap<String, Arc<Vec<ToolDescriptor>>>>,
}

impl ProxyToolOperations {
    pub fn new(discovery: Arc<dyn DiscoveryStrategy>, settings: RouterSettings) -> Self {
        Self {
            discovery,
            settings,
            tool_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn discovery(&self) -> &Arc<dyn DiscoveryStrategy> {
        &self.discovery
    }

    /// Route a proxy call. `target` is the server the proxy tool stands for;
    /// when `None`, the request's `tool` field selects it.
    ///
    /// Failures come back as error results; only cancellation is an `Err`.
    pub async fn route(
        &self,
        target: Option<&str>,
        request: RoutingRequest,
        context: &CallContext,
    ) -> Result<ToolOutput> {
        let target = target.map(str::to_string).or_else(|| request.tool.clone());
        let result = match target {
            Some(target) => self.route_to_target(&target, request, context).await,
            None => self.route_without_target(request, context).await,
        };

        match result {
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => Ok(ToolOutput::error(e.to_string())),
            Ok(output) => Ok(output),
        }
    }

    /// The cached tool list of `server`, fetched on first use.
    ///
    /// Concurrent first lookups may each fetch; the results are identical and
    /// the last insert wins.
    pub async fn tools_for(&self, server: &str, context: &CallContext) -> Result<Arc<Vec<ToolDescriptor>>> {
        let key = server.to_lowercase();
        if let Some(tools) = self.tool_cache.read().await.get(&key) {
            return Ok(tools.clone());
        }

        let client = context
            .run(
                self.discovery
                    .get_or_create_client(server, Some(&self.settings.client_options)),
            )
            .await?;
        let tools = context
            .run(with_timeout("tools/list", self.settings.call_timeout, client.list_tools()))
            .await?;

        tracing::info!(server = %server, count = tools.len(), "cached child tool list");
        let tools = Arc::new(tools);
        self.tool_cache.write().await.insert(key, tools.clone());
        Ok(tools)
    }

    fn visible<'a>(&self, tools: &'a [ToolDescriptor]) -> Vec<&'a ToolDescriptor> {
        tools
            .iter()
            .filter(|tool| !self.settings.read_only || tool.is_read_only())
            .collect()
    }

    async fn route_without_target(
        &self,
        request: RoutingRequest,
        context: &CallContext,
    ) -> Result<ToolOutput> {
        if request.command.is_none() && !request.learn && request.intent.is_none() {
            tracing::debug!(mode = "guidance", "routing");
            return Ok(ToolOutput::success(single_proxy_guidance()));
        }

        let providers = self.discovery.discover_servers().await?;
        let servers: Vec<Value> = providers
            .iter()
            .map(|provider| {
                let metadata = provider.metadata();
                json!({ "name": metadata.name, "description": metadata.description })
            })
            .collect();

        if let Some(intent) = request.intent.clone() {
            if context.peer().supports_sampling() {
                let known: Vec<String> = providers.iter().map(|p| p.metadata().name).collect();
                if let Some((server, parameters)) = self
                    .infer(
                        "tools",
                        &servers,
                        &known,
                        &intent,
                        &request.parameters,
                        context,
                    )
                    .await?
                {
                    tracing::info!(server = %server, "intent resolved to server");
                    let mut parameters = parameters;
                    for (key, value) in &request.parameters {
                        parameters.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                    let request = RoutingRequest {
                        tool: Some(server.clone()),
                        parameters,
                        learn: request.learn || request.command.is_none(),
                        ..request
                    };
                    return self.route_to_target(&server, request, context).await;
                }
            }
        }

        tracing::debug!(mode = "learn", "listing servers");
        Ok(ToolOutput::success(format!(
            "Here are the available tools. Run this tool again with \"tool\" set to one of these \
             names and \"learn\" set to true to see its commands.\n\n{}",
            to_pretty_json(&Value::Array(servers))
        )))
    }

    async fn route_to_target(
        &self,
        target: &str,
        request: RoutingRequest,
        context: &CallContext,
    ) -> Result<ToolOutput> {
        let Some(command) = request.command.clone() else {
            if request.learn {
                return self.learn(target, &request, context).await;
            }
            tracing::debug!(server = %target, mode = "guidance", "routing");
            return Ok(ToolOutput::success(namespace_guidance(target)));
        };

        let tools = match self.tools_for(target, context).await {
            Ok(tools) => tools,
            Err(e) if e.is_recoverable() => {
                tracing::warn!(server = %target, error = %e, "could not list child tools");
                return Ok(ToolOutput::error(format!(
                    "Could not reach '{target}' to resolve command '{command}': {e}"
                )));
            }
            Err(e) => return Err(e),
        };

        if let Some(resolved) = find_tool(&tools, &command) {
            let name = resolved.name.clone();
            return self
                .direct_or_learn(target, &name, request.parameters, context)
                .await;
        }

        if request.intent.is_some() {
            tracing::debug!(server = %target, command = %command, mode = "inference", "unknown command");
            return self.learn(target, &request, context).await;
        }

        tracing::debug!(server = %target, command = %command, mode = "learn", "unknown command");
        self.catalog(target, context).await
    }

    /// Learn mode, escalating to inference when the client can sample and an
    /// intent is present.
    async fn learn(
        &self,
        target: &str,
        request: &RoutingRequest,
        context: &CallContext,
    ) -> Result<ToolOutput> {
        let tools = self.tools_for(target, context).await?;

        if let Some(intent) = &request.intent {
            if context.peer().supports_sampling() {
                let visible = self.visible(&tools);
                let catalog: Vec<Value> = visible.iter().map(|tool| catalog_entry(tool)).collect();
                let known: Vec<String> = visible.iter().map(|tool| tool.name.clone()).collect();

                if let Some((command, mut parameters)) = self
                    .infer(target, &catalog, &known, intent, &request.parameters, context)
                    .await?
                {
                    tracing::info!(server = %target, command = %command, "intent resolved to command");
                    for (key, value) in &request.parameters {
                        parameters.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                    return self.direct_or_learn(target, &command, parameters, context).await;
                }
            }
        }

        tracing::debug!(server = %target, mode = "learn", "returning catalog");
        self.catalog(target, context).await
    }

    async fn catalog(&self, target: &str, context: &CallContext) -> Result<ToolOutput> {
        let tools = self.tools_for(target, context).await?;
        let catalog: Vec<Value> = self.visible(&tools).into_iter().map(catalog_entry).collect();

        Ok(ToolOutput::success(format!(
            "Here are the available commands for '{target}' and their parameters. Run this tool \
             again with \"command\" set to one of these names and \"parameters\" matching its \
             input schema.\n\n{}",
            to_pretty_json(&Value::Array(catalog))
        )))
    }

    async fn direct_or_learn(
        &self,
        target: &str,
        command: &str,
        parameters: Map<String, Value>,
        context: &CallContext,
    ) -> Result<ToolOutput> {
        match self.direct(target, command, parameters, context).await {
            Ok(output) => Ok(output),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(
                    server = %target,
                    command = %command,
                    error = %e,
                    "direct call failed, falling back to learn mode"
                );
                self.catalog(target, context).await
            }
            Err(e) => Err(e),
        }
    }

    /// Forward `command` to the child unchanged. Errors are returned, not
    /// converted, so the caller decides whether to downgrade.
    async fn direct(
        &self,
        target: &str,
        command: &str,
        parameters: Map<String, Value>,
        context: &CallContext,
    ) -> Result<ToolOutput> {
        tracing::debug!(server = %target, command = %command, mode = "direct", "routing");
        context
            .report_progress(&format!("Calling {target} {command}..."))
            .await;

        let client = context
            .run(
                self.discovery
                    .get_or_create_client(target, Some(&self.settings.client_options)),
            )
            .await?;
        let output = context
            .run(with_timeout(
                "tools/call",
                self.settings.call_timeout,
                client.call_tool(ToolCall::new(command, Some(parameters))),
            ))
            .await?;

        if output.text().contains(MISSING_REQUIRED_OPTIONS) {
            return Ok(self.with_remediation(target, command, output, context).await);
        }
        Ok(output)
    }

    async fn with_remediation(
        &self,
        target: &str,
        command: &str,
        original: ToolOutput,
        context: &CallContext,
    ) -> ToolOutput {
        let schema = match self.tools_for(target, context).await {
            Ok(tools) => find_tool(&tools, command)
                .map(|tool| to_pretty_json(&Value::Object(tool.input_schema.clone())))
                .unwrap_or_else(|| "{}".to_string()),
            Err(_) => "{}".to_string(),
        };

        let instructions = format!(
            "The '{command}' command on '{target}' is missing required parameters.\n\n\
             1. Compare the parameters you sent with the input schema below.\n\
             2. Ask the user for any required value you cannot work out yourself.\n\
             3. Run this tool again with \"command\" set to \"{command}\" and the completed \
             \"parameters\".\n\n\
             Input schema for '{command}':\n{schema}\n\n\
             Original response:"
        );

        let mut content = Vec::with_capacity(original.content.len() + 1);
        content.push(instructions);
        content.extend(original.content);
        ToolOutput {
            content,
            is_error: original.is_error,
        }
    }

    /// Ask the client's model to pick one of `known` for `intent`.
    ///
    /// `Ok(None)` means no match: the model answered "Unknown", answered with
    /// something unparsable or unknown, or sampling failed.
    async fn infer(
        &self,
        scope: &str,
        catalog: &[Value],
        known: &[String],
        intent: &str,
        parameters: &Map<String, Value>,
        context: &CallContext,
    ) -> Result<Option<(String, Map<String, Value>)>> {
        let message = format!(
            "This is a list of available tools for '{scope}' together with their descriptions \
             and input schemas.\n\
             Identify the single tool that best fulfils the intent below and respond with a JSON \
             object that matches this schema:\n{schema}\n\
             Fill \"parameters\" from the intent and the known parameters. If no tool fits, use \
             \"{UNKNOWN_TOOL}\" as the tool name.\n\
             Respond with JSON only.\n\n\
             Intent: {intent}\n\n\
             Known parameters:\n{known_parameters}\n\n\
             Available tools:\n{tools}",
            schema = to_pretty_json(&inference_result_schema()),
            known_parameters = to_pretty_json(&Value::Object(parameters.clone())),
            tools = to_pretty_json(&Value::Array(catalog.to_vec())),
        );

        let request = SamplingRequest {
            message,
            max_tokens: SAMPLING_MAX_TOKENS,
        };
        let response = context
            .run(with_timeout(
                "sampling",
                self.settings.sampling_timeout,
                context.peer().create_message(request),
            ))
            .await;

        let text = match response {
            Ok(text) => text,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(scope = %scope, error = %e, "sampling failed, treating as no match");
                return Ok(None);
            }
        };

        Ok(parse_inference(&text).and_then(|(tool, parameters)| {
            let resolved = known.iter().find(|name| name.eq_ignore_ascii_case(&tool));
            if resolved.is_none() {
                tracing::debug!(scope = %scope, tool = %tool, "sampling chose an unknown tool");
            }
            resolved.map(|name| (name.clone(), parameters))
        }))
    }
}

/// Parse a sampling response into `(tool, parameters)`. `"Unknown"`, empty
/// and malformed responses are `None`.
fn parse_inference(text: &str) -> Option<(String, Map<String, Value>)> {
    let trimmed = text.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let inferred: InferredCommand = serde_json::from_str(json).ok()?;
    let tool = inferred.tool.trim();
    if tool.is_empty() || tool == UNKNOWN_TOOL {
        return None;
    }
    Some((tool.to_string(), inferred.parameters))
}

fn find_tool<'a>(tools: &'a [ToolDescriptor], name: &str) -> Option<&'a ToolDescriptor> {
    tools.iter().find(|tool| tool.name.eq_ignore_ascii_case(name))
}

fn catalog_entry(tool: &ToolDescriptor) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "inputSchema": tool.input_schema,
    })
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn single_proxy_guidance() -> String {
    "To use this tool, either provide the \"tool\" and \"command\" arguments together with \
     \"parameters\" to run a command directly, or set \"learn\" to true to list the available \
     tools and their commands. You can also describe what you want in \"intent\"."
        .to_string()
}

fn namespace_guidance(target: &str) -> String {
    format!(
        "The '{target}' tool groups several commands. Run this tool again with \"command\" and \
         \"parameters\" to run one directly, or set \"learn\" to true to list the available \
         commands. You can also describe what you want in \"intent\"."
    )
}
