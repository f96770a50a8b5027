use std::time::Duration;

/// Errors raised by discovery, client management and routing.
///
/// User-facing failures never cross the MCP boundary as this type: loaders turn
/// them into `is_error` tool results. Only construction-time configuration
/// problems are expected to abort the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A caller supplied an unusable argument (empty name, empty collection).
    #[error("invalid argument `{name}`: {message}")]
    InvalidArgument { name: &'static str, message: String },

    /// Static configuration is incomplete or contradictory.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No server provider, tool or command with the requested name exists.
    #[error("'{0}' was not found")]
    NotFound(String),

    /// Failed to start or connect to a child MCP server.
    #[error("transport error for '{server}': {message}")]
    Transport { server: String, message: String },

    /// A child server rejected or failed a request.
    #[error("call to '{target}' failed: {message}")]
    ChildCall { target: String, message: String },

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("request was cancelled")]
    Cancelled,

    /// The requesting client could not complete a sampling round-trip.
    #[error("sampling failed: {0}")]
    Sampling(String),

    /// A collaborator broke a contract it guarantees.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    pub fn invalid_argument(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            message: message.into(),
        }
    }

    /// Whether the router may recover from this error by falling back to a
    /// catalog listing instead of surfacing it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::Transport { .. }
                | Self::ChildCall { .. }
                | Self::Timeout { .. }
                | Self::Sampling(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reject empty and whitespace-only names, returning the trimmed name.
pub fn require_name<'a>(name: &'a str, argument: &'static str) -> Result<&'a str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_argument(argument, "must not be empty"));
    }
    Ok(trimmed)
}

/// Run `future` under `after`, mapping expiry to [`Error::Timeout`].
pub async fn with_timeout<T>(
    operation: &'static str,
    after: Duration,
    future: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(after, future)
        .await
        .map_err(|_| Error::Timeout { operation, after })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_name_rejects_blank_input() {
        let err = require_name("  ", "name").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { name: "name", .. }));
        assert_eq!(require_name(" storage ", "name").unwrap(), "storage");
    }

    #[test]
    fn configuration_errors_are_not_recoverable() {
        assert!(!Error::Configuration("x".into()).is_recoverable());
        assert!(!Error::Cancelled.is_recoverable());
        assert!(Error::ChildCall {
            target: "storage".into(),
            message: "boom".into()
        }
        .is_recoverable());
    }

    #[tokio::test]
    async fn with_timeout_reports_operation() {
        let err = with_timeout("tool call", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "tool call timed out after 0s");
    }
}
