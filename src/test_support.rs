//! In-memory doubles shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::client::{ClientCache, ClientOptions, McpClient};
use crate::commands::{Command, CommandMetadata};
use crate::discovery::DiscoveryStrategy;
use crate::error::{Error, Result};
use crate::loader::ToolLoader;
use crate::peer::CallContext;
use crate::peer::{RequestPeer, SamplingRequest};
use crate::provider::{ServerMetadata, ServerProvider};
use crate::tool::{ToolAnnotations, ToolCall, ToolDescriptor, ToolOutput};

pub fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// A child tool that requires an `account` option.
pub fn tool(name: &str, description: &str, read_only: bool) -> ToolDescriptor {
    ToolDescriptor::new(
        name,
        description,
        args(json!({
            "type": "object",
            "properties": { "account": { "type": "string" } },
            "required": ["account"]
        })),
    )
    .with_annotations(ToolAnnotations {
        read_only_hint: Some(read_only),
        ..Default::default()
    })
}

#[derive(Default)]
pub struct MockClient {
    tools: Vec<ToolDescriptor>,
    responses: HashMap<String, ToolOutput>,
    fail_calls: bool,
    calls: Mutex<Vec<ToolCall>>,
    list_calls: AtomicUsize,
}

impl MockClient {
    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_response(mut self, tool: &str, output: ToolOutput) -> Self {
        self.responses.insert(tool.to_string(), output);
        self
    }

    pub fn failing_calls(mut self) -> Self {
        self.fail_calls = true;
        self
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl McpClient for MockClient {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, call: ToolCall) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(call.clone());
        if self.fail_calls {
            return Err(Error::ChildCall {
                target: call.name,
                message: "child exited".into(),
            });
        }
        Ok(self
            .responses
            .get(&call.name)
            .cloned()
            .unwrap_or_else(|| ToolOutput::success(format!("called {}", call.name))))
    }
}

pub struct MockProvider {
    name: String,
    client: Arc<MockClient>,
    created: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            client: Arc::new(MockClient::default()),
            created: AtomicUsize::new(0),
        }
    }

    pub fn with_client(mut self, client: MockClient) -> Self {
        self.client = Arc::new(client);
        self
    }

    pub fn client(&self) -> Arc<MockClient> {
        self.client.clone()
    }

    pub fn clients_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerProvider for MockProvider {
    fn metadata(&self) -> ServerMetadata {
        ServerMetadata::named(&self.name, format!("{} tools", self.name))
    }

    async fn create_client(&self, _options: &ClientOptions) -> Result<Arc<dyn McpClient>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.client.clone())
    }
}

pub struct StaticDiscovery {
    providers: Vec<Arc<dyn ServerProvider>>,
    clients: ClientCache,
}

impl StaticDiscovery {
    pub fn new(providers: Vec<Arc<dyn ServerProvider>>) -> Self {
        Self {
            providers,
            clients: ClientCache::new(),
        }
    }
}

#[async_trait]
impl DiscoveryStrategy for StaticDiscovery {
    async fn discover_servers(&self) -> Result<Vec<Arc<dyn ServerProvider>>> {
        Ok(self.providers.clone())
    }

    fn client_cache(&self) -> &ClientCache {
        &self.clients
    }
}

pub struct MockPeer {
    sampling: bool,
    fail_sampling: bool,
    progress_token: bool,
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<SamplingRequest>>,
    progress: Mutex<Vec<String>>,
}

impl Default for MockPeer {
    fn default() -> Self {
        Self {
            sampling: true,
            fail_sampling: false,
            progress_token: false,
            responses: Mutex::default(),
            requests: Mutex::default(),
            progress: Mutex::default(),
        }
    }
}

impl MockPeer {
    pub fn with_progress_token(mut self) -> Self {
        self.progress_token = true;
        self
    }

    pub fn without_sampling(mut self) -> Self {
        self.sampling = false;
        self
    }

    pub fn with_failing_sampling(mut self) -> Self {
        self.fail_sampling = true;
        self
    }

    /// Queue a sampling answer; answers are consumed in order.
    pub fn with_sampling_response(self, text: &str) -> Self {
        self.responses.lock().unwrap().push_back(text.to_string());
        self
    }

    pub fn sampling_requests(&self) -> Vec<SamplingRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn progress_messages(&self) -> Vec<String> {
        self.progress.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestPeer for MockPeer {
    fn supports_sampling(&self) -> bool {
        self.sampling
    }

    fn has_progress_token(&self) -> bool {
        self.progress_token
    }

    async fn create_message(&self, request: SamplingRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request);
        if self.fail_sampling {
            return Err(Error::Sampling("client refused".into()));
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Sampling("no canned response".into()))
    }

    async fn notify_progress(&self, message: &str) -> Result<()> {
        self.progress.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// A command that returns its arguments.
pub struct EchoCommand {
    description: String,
    read_only: bool,
    hidden: bool,
    required: Vec<String>,
}

impl EchoCommand {
    pub fn read_only(description: &str) -> Self {
        Self {
            description: description.to_string(),
            read_only: true,
            hidden: false,
            required: Vec::new(),
        }
    }

    pub fn mutating(description: &str) -> Self {
        Self {
            read_only: false,
            ..Self::read_only(description)
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn requiring(mut self, options: &[&str]) -> Self {
        self.required = options.iter().map(|o| o.to_string()).collect();
        self
    }
}

#[async_trait]
impl Command for EchoCommand {
    fn description(&self) -> &str {
        &self.description
    }

    fn metadata(&self) -> CommandMetadata {
        if self.read_only {
            CommandMetadata::read_only(&self.description)
        } else {
            CommandMetadata {
                title: self.description.clone(),
                destructive: true,
                ..Default::default()
            }
        }
    }

    fn input_schema(&self) -> Map<String, Value> {
        let properties: Map<String, Value> = self
            .required
            .iter()
            .map(|name| (name.clone(), json!({ "type": "string" })))
            .collect();
        args(json!({
            "type": "object",
            "properties": properties,
            "required": self.required
        }))
    }

    fn hidden(&self) -> bool {
        self.hidden
    }

    async fn execute(&self, arguments: Map<String, Value>) -> anyhow::Result<Value> {
        Ok(Value::Object(arguments))
    }
}

/// A loader with a fixed tool list whose listing can be made to fail.
pub struct ScriptedLoader {
    tools: Vec<ToolDescriptor>,
    failing: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedLoader {
    pub fn new(names: &[&str]) -> Self {
        Self {
            tools: names
                .iter()
                .map(|name| ToolDescriptor::new(*name, format!("{name} tools"), Map::new()))
                .collect(),
            failing: AtomicBool::new(false),
            calls: Mutex::default(),
        }
    }

    pub fn fail_listing(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolLoader for ScriptedLoader {
    async fn list_tools(&self, _context: &CallContext) -> Result<Vec<ToolDescriptor>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Invariant("tool listing failed".into()));
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, call: ToolCall, _context: &CallContext) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(call.name.clone());
        Ok(ToolOutput::success(format!("called {}", call.name)))
    }
}
