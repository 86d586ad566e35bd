//! Core data model: messages, stats, and the schema variant used by the
//! structured-completion planner.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single turn in the message list exchanged with the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Counters accumulated over a single engine invocation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    pub llm_calls: u32,
    pub iterations: u32,
    pub depth: u32,
    pub parsing_retries: u32,
}

impl Stats {
    pub fn new(depth: u32) -> Self {
        Self {
            depth,
            ..Default::default()
        }
    }

    /// Additive merge used by the parallel structured path: counters sum, `depth`
    /// takes the maximum of the two.
    pub fn merge(&mut self, other: &Stats) {
        self.llm_calls += other.llm_calls;
        self.iterations += other.iterations;
        self.parsing_retries += other.parsing_retries;
        self.depth = self.depth.max(other.depth);
    }
}

/// A tagged variant describing an expected value, mirroring the set of tags a
/// JSON-Schema-shaped descriptor carries. Tagged variant over a class hierarchy,
/// per the design notes: the validator is a single function dispatching on tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schema {
    Object {
        #[serde(default)]
        properties: HashMap<String, Schema>,
        #[serde(default)]
        required: HashSet<String>,
        #[serde(default)]
        nullable: bool,
        #[serde(default)]
        any_of: Vec<Schema>,
        #[serde(default)]
        all_of: Vec<Schema>,
    },
    Array {
        #[serde(default)]
        items: Option<Box<Schema>>,
        #[serde(default)]
        min_items: Option<usize>,
        #[serde(default)]
        max_items: Option<usize>,
        #[serde(default)]
        unique_items: bool,
        #[serde(default)]
        nullable: bool,
    },
    String {
        #[serde(default, rename = "enum")]
        enum_values: Vec<String>,
        #[serde(default)]
        min_length: Option<usize>,
        #[serde(default)]
        max_length: Option<usize>,
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default)]
        format: Option<String>,
        #[serde(default)]
        nullable: bool,
    },
    Number {
        #[serde(default)]
        minimum: Option<f64>,
        #[serde(default)]
        maximum: Option<f64>,
        #[serde(default)]
        multiple_of: Option<f64>,
        #[serde(default)]
        nullable: bool,
    },
    Integer {
        #[serde(default)]
        minimum: Option<f64>,
        #[serde(default)]
        maximum: Option<f64>,
        #[serde(default)]
        nullable: bool,
    },
    Boolean {
        #[serde(default)]
        nullable: bool,
    },
    Null,
}

impl Schema {
    pub fn is_nullable(&self) -> bool {
        match self {
            Schema::Object { nullable, .. }
            | Schema::Array { nullable, .. }
            | Schema::String { nullable, .. }
            | Schema::Number { nullable, .. }
            | Schema::Integer { nullable, .. }
            | Schema::Boolean { nullable, .. } => *nullable,
            Schema::Null => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Schema::Object { .. } => "object",
            Schema::Array { .. } => "array",
            Schema::String { .. } => "string",
            Schema::Number { .. } => "number",
            Schema::Integer { .. } => "integer",
            Schema::Boolean { .. } => "boolean",
            Schema::Null => "null",
        }
    }

    pub fn properties(&self) -> Option<&HashMap<String, Schema>> {
        match self {
            Schema::Object { properties, .. } => Some(properties),
            _ => None,
        }
    }

    pub fn required(&self) -> Option<&HashSet<String>> {
        match self {
            Schema::Object { required, .. } => Some(required),
            _ => None,
        }
    }
}

/// One field-level unit of work created by the planner during decomposition.
#[derive(Debug, Clone)]
pub struct SubTask {
    pub id: String,
    pub query: String,
    pub schema: Schema,
    pub path: Vec<String>,
}

/// The set of names bound inside a single REPL evaluation. Values the script can
/// read directly (as opposed to callables registered natively on the interpreter).
pub type ReplEnv = HashMap<String, Value>;
