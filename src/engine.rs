//! Completion loop (component D): interleaves LLM calls, REPL execution, and
//! recursive sub-completions while enforcing depth and iteration budgets.

use std::time::Duration;

use rhai::Engine as RhaiEngine;
use serde_json::json;

use crate::config::{EngineConfig, StructuredConfig};
use crate::error::{Result, RlmError};
use crate::parser;
use crate::prompts;
use crate::repl::Repl;
use crate::transport::ChatTransport;
use crate::types::{Message, ReplEnv, Stats};

/// Drives a single recursive-completion invocation at a fixed recursion
/// depth. Cheap to clone: the transport is pool-backed and the config is
/// plain data, which is exactly what the recursive-call handle needs to
/// construct an isolated child at `depth + 1`.
#[derive(Clone)]
pub struct Engine {
    transport: ChatTransport,
    config: EngineConfig,
    repl: Repl,
    depth: u32,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            transport: ChatTransport::new(),
            config,
            repl: Repl::new(),
            depth: 0,
        }
    }

    pub fn with_transport(mut self, transport: ChatTransport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport(&self) -> &ChatTransport {
        &self.transport
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// `Completion(query, context) -> (result, stats)`.
    pub async fn complete(&self, query: &str, context: &str) -> Result<(String, Stats)> {
        // Legacy positional behavior: if only `query` was supplied, the
        // whole context was passed in that slot. Preserved, not "fixed" —
        // see the design notes.
        let (query, context) = if !query.is_empty() && context.is_empty() {
            (context, query)
        } else {
            (query, context)
        };

        if self.depth >= self.config.max_depth {
            tracing::warn!(depth = self.depth, max_depth = self.config.max_depth, "max recursion depth reached");
            return Err(RlmError::MaxDepth(self.config.max_depth));
        }

        tracing::debug!(depth = self.depth, "engine: starting completion");

        let mut stats = Stats::new(self.depth);

        let mut env = ReplEnv::new();
        env.insert("context".to_string(), json!(context));
        env.insert("query".to_string(), json!(query));

        let system = prompts::system_prompt(
            context.chars().count(),
            self.depth,
            query,
            self.config.use_metacognitive,
        );
        let mut messages = vec![Message::system(system), Message::user(query.to_string())];

        let timeout = self.config.timeout_seconds.map(Duration::from_secs);

        for _ in 0..self.config.max_iterations {
            stats.iterations += 1;
            stats.llm_calls += 1;

            let model = self.config.model_for_depth(self.depth);
            let reply = self
                .transport
                .chat(
                    model,
                    &messages,
                    &self.config.api_base,
                    &self.config.api_key,
                    timeout,
                    &self.config.extra_params,
                )
                .await?;

            if parser::is_final(&reply) {
                if let Some(answer) = parser::parse(&reply, &env) {
                    tracing::debug!(depth = self.depth, iterations = stats.iterations, "engine: reached final answer");
                    return Ok((answer, stats));
                }
                // Parse failed despite a sentinel-like opening: fall through
                // and treat the reply as ordinary REPL code.
            }

            let child_depth = self.depth + 1;
            let transport = self.transport.clone();
            let config = self.config.clone();
            let observation = match self.repl.execute(&reply, &env, move |engine| {
                register_recursive_handle(engine, transport, config, child_depth);
            }) {
                Ok(output) => output,
                Err(e) => format!("Error: {e}"),
            };

            messages.push(Message::assistant(reply));
            messages.push(Message::user(observation));
        }

        tracing::warn!(
            depth = self.depth,
            max_iterations = self.config.max_iterations,
            "max iterations reached without a final answer"
        );
        Err(RlmError::MaxIterations(self.config.max_iterations))
    }

    /// `StructuredCompletion(query, context, structured_config) -> (object, stats)`.
    pub async fn structured(
        &self,
        query: &str,
        context: &str,
        structured_config: &StructuredConfig,
    ) -> Result<(serde_json::Value, Stats)> {
        crate::structured::structured(self, query, context, structured_config).await
    }
}

/// Binds `recursive_llm(sub_query, sub_context)` on the script's interpreter.
/// Never lets an error propagate into the script: failures degrade to a
/// string the LLM can read and recover from.
fn register_recursive_handle(
    rhai_engine: &mut RhaiEngine,
    transport: ChatTransport,
    config: EngineConfig,
    child_depth: u32,
) {
    rhai_engine.register_fn(
        "recursive_llm",
        move |sub_query: &str, sub_context: &str| -> String {
            if child_depth >= config.max_depth {
                tracing::warn!(child_depth, max_depth = config.max_depth, "recursive_llm: max depth reached");
                return format!("Max recursion depth ({}) reached", config.max_depth);
            }

            tracing::debug!(child_depth, "recursive_llm: dispatching child completion");

            let child = Engine::new(config.clone())
                .with_transport(transport.clone())
                .with_depth(child_depth);
            let sub_query = sub_query.to_string();
            let sub_context = sub_context.to_string();

            let result = tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current()
                    .block_on(async move { child.complete(&sub_query, &sub_context).await })
            });

            match result {
                Ok((answer, _child_stats)) => answer,
                Err(e) => {
                    tracing::warn!(child_depth, error = %e, "recursive_llm: child completion failed");
                    format!("Error: {e}")
                }
            }
        },
    );
}
