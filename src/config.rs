//! Fully-resolved configuration consumed by the engine. Parsing configuration
//! out of environment variables or files is a host concern; this crate only
//! accepts an already-resolved struct.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Schema;

fn default_max_depth() -> u32 {
    5
}

fn default_max_iterations() -> u32 {
    30
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Configuration for a single engine invocation. Builder methods follow the
/// `with_*` naming used throughout this crate's ambient stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub model: String,
    #[serde(default)]
    pub recursive_model: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub use_metacognitive: bool,
    #[serde(default)]
    pub extra_params: Map<String, Value>,
    #[serde(default)]
    pub structured: Option<StructuredConfig>,
}

impl EngineConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            recursive_model: None,
            api_base: default_api_base(),
            api_key: String::new(),
            max_depth: default_max_depth(),
            max_iterations: default_max_iterations(),
            timeout_seconds: None,
            use_metacognitive: false,
            extra_params: Map::new(),
            structured: None,
        }
    }

    /// The model used for a call at the given recursion depth: `model` at
    /// depth 0, `recursive_model` (or `model`, if unset) otherwise.
    pub fn model_for_depth(&self, depth: u32) -> &str {
        if depth == 0 {
            &self.model
        } else {
            self.recursive_model.as_deref().unwrap_or(&self.model)
        }
    }

    pub fn with_recursive_model(mut self, model: impl Into<String>) -> Self {
        self.recursive_model = Some(model.into());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_metacognitive(mut self, use_metacognitive: bool) -> Self {
        self.use_metacognitive = use_metacognitive;
        self
    }

    pub fn with_structured(mut self, structured: StructuredConfig) -> Self {
        self.structured = Some(structured);
        self
    }

    /// Sets an extra forwarded param, coercing string-encoded decimal digits
    /// to a JSON number the way the rest of the configuration surface does.
    pub fn with_extra_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_params.insert(key.into(), coerce_numeric(value));
        self
    }
}

/// Accepts a string containing only decimal digits (optionally with a single
/// leading `-` or `.`) and coerces it to a JSON number; any other value
/// passes through unchanged.
pub fn coerce_numeric(value: Value) -> Value {
    match &value {
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Value::from(i);
            }
            if let Ok(f) = trimmed.parse::<f64>() {
                if !trimmed.is_empty()
                    && trimmed
                        .chars()
                        .all(|c| c.is_ascii_digit() || c == '-' || c == '.')
                {
                    return Value::from(f);
                }
            }
            value
        }
        _ => value,
    }
}

/// Nested descriptor for structured-completion calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredConfig {
    pub schema: Schema,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_parallel() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

impl StructuredConfig {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            parallel: default_parallel(),
            max_retries: default_max_retries(),
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}
