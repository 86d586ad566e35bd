//! Core of a recursive language model (RLM) engine: a runtime that lets an
//! LLM answer a query over an arbitrarily large context by writing small
//! scripts executed in a sandboxed interpreter, whose observations feed back
//! into the model, and which may invoke the engine recursively on
//! sub-contexts. Also supports structured extraction: given a schema, the
//! engine decomposes it into field-level sub-tasks, runs them in parallel,
//! validates the merged result, and performs corrective retries.
//!
//! This crate is a library consumed by a host that resolves configuration
//! (API credentials, model selection) and hands the engine a
//! `(model, query, context)` triple. CLI argument parsing, environment/config
//! loading, context builders, caching and observability pipelines, and
//! retry/fallback policy around the engine are the host's concern, not
//! this crate's.

pub mod config;
pub mod engine;
pub mod error;
pub mod parser;
pub mod prompts;
pub mod repl;
pub mod structured;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{EngineConfig, StructuredConfig};
pub use engine::Engine;
pub use error::{Result, RlmError};
pub use transport::ChatTransport;
pub use types::{Message, ReplEnv, Role, Schema, Stats, SubTask};
