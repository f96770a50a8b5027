//! The client that issued the current request, seen from the router.
//!
//! The router needs two things from it: LLM sampling (for intent inference)
//! and progress notifications. [`RmcpPeer`] provides both over an rmcp
//! server-side peer.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::service::{Peer, RequestContext};
use rmcp::RoleServer;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// A sampling prompt sent to the requesting client's model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingRequest {
    pub message: String,
    pub max_tokens: u32,
}

#[async_trait]
pub trait RequestPeer: Send + Sync {
    fn supports_sampling(&self) -> bool;

    /// Whether the request carried a progress token.
    fn has_progress_token(&self) -> bool;

    /// Ask the client's model for a completion and return its trimmed text.
    async fn create_message(&self, request: SamplingRequest) -> Result<String>;

    async fn notify_progress(&self, message: &str) -> Result<()>;
}

/// Per-request context handed to tool loaders.
#[derive(Clone)]
pub struct CallContext {
    peer: Arc<dyn RequestPeer>,
    cancellation: CancellationToken,
}

impl CallContext {
    pub fn new(peer: Arc<dyn RequestPeer>, cancellation: CancellationToken) -> Self {
        Self { peer, cancellation }
    }

    /// A context with no sampling, no progress token and no cancellation.
    #[cfg(test)]
    pub fn detached() -> Self {
        Self::new(Arc::new(DetachedPeer), CancellationToken::new())
    }

    pub fn peer(&self) -> &dyn RequestPeer {
        self.peer.as_ref()
    }

    /// Run `future` unless the request is cancelled first.
    pub async fn run<T>(&self, future: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(Error::Cancelled),
            result = future => result,
        }
    }

    /// Send a progress notification when the request asked for them.
    pub async fn report_progress(&self, message: &str) {
        if !self.peer.has_progress_token() {
            return;
        }
        if let Err(e) = self.peer.notify_progress(message).await {
            tracing::debug!(error = %e, "progress notification dropped");
        }
    }
}

#[cfg(test)]
struct DetachedPeer;

#[cfg(test)]
#[async_trait]
impl RequestPeer for DetachedPeer {
    fn supports_sampling(&self) -> bool {
        false
    }

    fn has_progress_token(&self) -> bool {
        false
    }

    async fn create_message(&self, _request: SamplingRequest) -> Result<String> {
        Err(Error::Sampling("no client is attached to this request".into()))
    }

    async fn notify_progress(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}

/// [`RequestPeer`] over the rmcp peer of an incoming request.
pub struct RmcpPeer {
    peer: Peer<RoleServer>,
    progress_token: Option<Value>,
}

impl RmcpPeer {
    pub fn from_context(context: &RequestContext<RoleServer>) -> Self {
        let progress_token = context
            .meta
            .get_progress_token()
            .and_then(|token| serde_json::to_value(token).ok());

        Self {
            peer: context.peer.clone(),
            progress_token,
        }
    }
}

/// Pull the text out of a `sampling/createMessage` result, whether the message
/// content is a single block or a list of blocks.
pub fn sampling_text(result: &Value) -> Option<String> {
    let content = result.pointer("/message/content")?;
    let text = match content {
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        block => block.get("text").and_then(Value::as_str)?.to_string(),
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[async_trait]
impl RequestPeer for RmcpPeer {
    fn supports_sampling(&self) -> bool {
        self.peer
            .peer_info()
            .and_then(|info| serde_json::to_value(info).ok())
            .and_then(|info| info.pointer("/capabilities/sampling").cloned())
            .is_some_and(|sampling| !sampling.is_null())
    }

    fn has_progress_token(&self) -> bool {
        self.progress_token.is_some()
    }

    async fn create_message(&self, request: SamplingRequest) -> Result<String> {
        let params = serde_json::from_value(json!({
            "messages": [{
                "role": "assistant",
                "content": { "type": "text", "text": request.message }
            }],
            "maxTokens": request.max_tokens,
            "includeContext": "none"
        }))
        .map_err(|e| Error::Sampling(format!("could not encode request: {e}")))?;

        let result = self
            .peer
            .create_message(params)
            .await
            .map_err(|e| Error::Sampling(e.to_string()))?;

        let result = serde_json::to_value(&result)
            .map_err(|e| Error::Sampling(format!("could not decode response: {e}")))?;
        sampling_text(&result).ok_or_else(|| Error::Sampling("empty sampling response".into()))
    }

    async fn notify_progress(&self, message: &str) -> Result<()> {
        let Some(token) = &self.progress_token else {
            return Ok(());
        };
        let params = serde_json::from_value(json!({
            "progressToken": token,
            "progress": 0,
            "message": message
        }))
        .map_err(|e| Error::Invariant(format!("progress notification: {e}")))?;

        self.peer
            .notify_progress(params)
            .await
            .map_err(|e| Error::ChildCall {
                target: "client".into(),
                message: format!("progress notification failed: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockPeer;

    #[test]
    fn sampling_text_accepts_single_and_list_content() {
        let single = json!({ "message": { "role": "assistant", "content": { "type": "text", "text": "  {\"tool\":\"x\"} " } } });
        assert_eq!(sampling_text(&single).as_deref(), Some("{\"tool\":\"x\"}"));

        let list = json!({ "message": { "content": [{ "type": "text", "text": "a" }, { "type": "image" }] } });
        assert_eq!(sampling_text(&list).as_deref(), Some("a"));

        let blank = json!({ "message": { "content": { "type": "text", "text": "   " } } });
        assert_eq!(sampling_text(&blank), None);
    }

    #[tokio::test]
    async fn progress_is_skipped_without_token() {
        let peer = Arc::new(MockPeer::default());
        let context = CallContext::new(peer.clone(), CancellationToken::new());
        context.report_progress("working").await;
        assert!(peer.progress_messages().is_empty());

        let peer = Arc::new(MockPeer::default().with_progress_token());
        let context = CallContext::new(peer.clone(), CancellationToken::new());
        context.report_progress("working").await;
        assert_eq!(peer.progress_messages(), vec!["working".to_string()]);
    }

    #[tokio::test]
    async fn cancelled_requests_stop_running_work() {
        let token = CancellationToken::new();
        let context = CallContext::new(Arc::new(MockPeer::default()), token.clone());
        token.cancel();

        let result = context
            .run(async {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
