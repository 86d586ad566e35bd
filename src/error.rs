//! Error types returned across the crate's public surface.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RlmError>;

/// Stable, user-visible error classification for the engine.
#[derive(Debug, Error)]
pub enum RlmError {
    /// Attempted to invoke an engine whose `depth >= max_depth`.
    #[error("max recursion depth ({0}) reached")]
    MaxDepth(u32),

    /// The completion loop exhausted its iteration budget without a terminal answer.
    #[error("exhausted max iterations ({0}) without a terminal answer")]
    MaxIterations(u32),

    /// Script evaluation raised inside the REPL. Callers of the completion loop never
    /// see this variant directly — it is caught at the loop boundary and turned into
    /// an observation message instead.
    #[error("REPL error: {0}")]
    Repl(String),

    /// Non-2xx response, an embedded `error.message`, or any other transport failure.
    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    /// Structured output failed schema validation after exhausting retries.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unrecognized or missing required configuration at entry.
    #[error("config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for RlmError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            RlmError::Api {
                message: err.to_string(),
                status: Some(status.as_u16()),
                body: None,
            }
        } else {
            RlmError::Api {
                message: err.to_string(),
                status: None,
                body: None,
            }
        }
    }
}

impl From<serde_json::Error> for RlmError {
    fn from(err: serde_json::Error) -> Self {
        RlmError::Api {
            message: format!("JSON decode failure: {err}"),
            status: None,
            body: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_depth_display() {
        let err = RlmError::MaxDepth(5);
        assert_eq!(err.to_string(), "max recursion depth (5) reached");
    }

    #[test]
    fn api_error_from_serde() {
        let raw = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: RlmError = raw.into();
        assert!(matches!(err, RlmError::Api { .. }));
    }
}
