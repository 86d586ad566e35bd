//! Chat transport (component A): one request/response against an
//! OpenAI-compatible chat-completions endpoint.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{Result, RlmError};
use crate::types::Message;

/// Performs chat-completion requests against an OpenAI-compatible endpoint.
///
/// Holds one process-wide pooled client for connection reuse; a per-request
/// client is only built when a call overrides the default timeout.
#[derive(Debug, Clone)]
pub struct ChatTransport {
    client: reqwest::Client,
    default_timeout: Option<Duration>,
}

impl ChatTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .pool_idle_timeout(Duration::from_secs(90))
                .pool_max_idle_per_host(32)
                .build()
                .expect("default reqwest client configuration is valid"),
            default_timeout: None,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Issues one chat-completion call and returns the first choice's message
    /// content.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        api_base: &str,
        api_key: &str,
        timeout: Option<Duration>,
        extra_params: &Map<String, Value>,
    ) -> Result<String> {
        let url = completions_url(api_base);
        let payload = build_payload(model, messages, extra_params);

        let mut request = match timeout.filter(|t| Some(*t) != self.default_timeout) {
            Some(t) => reqwest::Client::builder()
                .timeout(t)
                .build()
                .map_err(RlmError::from)?
                .post(&url),
            None => self.client.post(&url),
        };

        request = request.header("Content-Type", "application/json");
        if !api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        tracing::debug!(url = %url, model = %model, "dispatching chat completion request");

        let response = request.json(&payload).send().await.map_err(|e| {
            tracing::warn!(error = %e, "chat transport request failed");
            RlmError::from(e)
        })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| RlmError::Api {
                message: format!("JSON decode failure: {e}"),
                status: Some(status.as_u16()),
                body: None,
            })?;

        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string());
            return Err(RlmError::Api {
                message,
                status: Some(status.as_u16()),
                body: Some(body.to_string()),
            });
        }

        if let Some(message) = body.get("error").and_then(|e| e.get("message")).and_then(Value::as_str) {
            return Err(RlmError::Api {
                message: message.to_string(),
                status: Some(status.as_u16()),
                body: Some(body.to_string()),
            });
        }

        let content = body
            .get("choices")
            .and_then(Value::as_array)
            .filter(|choices| !choices.is_empty())
            .and_then(|choices| choices[0].get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| RlmError::Api {
                message: "no choices returned".to_string(),
                status: Some(status.as_u16()),
                body: Some(body.to_string()),
            })?;

        Ok(content.to_string())
    }
}

impl Default for ChatTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn completions_url(api_base: &str) -> String {
    let trimmed = api_base.trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/chat/completions")
    }
}

fn build_payload(model: &str, messages: &[Message], extra_params: &Map<String, Value>) -> Value {
    let mut map = Map::new();
    for (key, value) in extra_params {
        map.insert(key.clone(), value.clone());
    }
    // extra_params is merged first so model/messages always win, per the
    // "cannot override model or messages" transport contract.
    map.insert("model".to_string(), Value::String(model.to_string()));
    map.insert(
        "messages".to_string(),
        serde_json::to_value(messages).expect("Message serializes"),
    );
    Value::Object(map)
}
