//! Structured planner (component E): schema decomposition, direct/parallel
//! dispatch, merging, and validation-feedback retry.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::StructuredConfig;
use crate::engine::Engine;
use crate::error::{Result, RlmError};
use crate::types::{Message, Stats, SubTask};

use super::extract::extract_and_validate;
use super::feedback::validation_feedback;
use super::prompt::build_direct_prompt;

/// `StructuredCompletion(query, context, structured_config) -> (object, stats)`.
pub async fn structured(
    engine: &Engine,
    query: &str,
    context: &str,
    cfg: &StructuredConfig,
) -> Result<(Value, Stats)> {
    let subtasks = decompose(&cfg.schema, query);

    let use_parallel = cfg.parallel && subtasks.len() > 2;
    if !use_parallel {
        return direct_path(engine, context, query, &cfg.schema, cfg.max_retries).await;
    }

    parallel_path(engine, context, query, subtasks, &cfg.schema, cfg.max_retries).await
}

/// One `SubTask` per top-level property; the original query is folded into
/// each task's focused prompt at dispatch time, not at decomposition time.
fn decompose(schema: &crate::types::Schema, _query: &str) -> Vec<SubTask> {
    let properties = match schema.properties() {
        Some(props) if !props.is_empty() => props,
        _ => return Vec::new(),
    };

    properties
        .iter()
        .map(|(name, field_schema)| SubTask {
            id: format!("field_{name}"),
            query: super::prompt::field_query(name, field_schema),
            schema: field_schema.clone(),
            path: vec![name.clone()],
        })
        .collect()
}

/// One LLM call per whole object, with validation-feedback retry. §4.5.2.
pub async fn direct_path(
    engine: &Engine,
    context: &str,
    query: &str,
    schema: &crate::types::Schema,
    max_retries: u32,
) -> Result<(Value, Stats)> {
    let mut stats = Stats::new(engine.depth());
    let prompt = build_direct_prompt(context, query, schema);
    let mut messages = vec![
        Message::system("You are a data extraction assistant. Respond with JSON only."),
        Message::user(prompt),
    ];

    let mut last_error = String::new();

    for attempt in 0..max_retries {
        stats.llm_calls += 1;
        stats.iterations += 1;

        let model = engine.config().model_for_depth(engine.depth());
        let reply = engine
            .transport()
            .chat(
                model,
                &messages,
                &engine.config().api_base,
                &engine.config().api_key,
                engine.config().timeout_seconds.map(std::time::Duration::from_secs),
                &engine.config().extra_params,
            )
            .await?;

        match extract_and_validate(&reply, schema) {
            Ok(value) => {
                stats.parsing_retries = attempt;
                return Ok((value, stats));
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "structured planner: validation failed, retrying");
                let feedback = validation_feedback(&err, schema, &reply);
                messages.push(Message::assistant(reply));
                messages.push(Message::user(feedback));
                last_error = err;
            }
        }
    }

    tracing::warn!(max_retries, error = %last_error, "structured planner: retries exhausted");
    Err(RlmError::Validation(format!(
        "failed to get valid structured output after {max_retries} attempts: {last_error}"
    )))
}

/// One worker per top-level property, run concurrently and merged. §4.5.3.
async fn parallel_path(
    engine: &Engine,
    context: &str,
    query: &str,
    subtasks: Vec<SubTask>,
    original_schema: &crate::types::Schema,
    max_retries: u32,
) -> Result<(Value, Stats)> {
    let context = context.to_string();
    let query = query.to_string();

    let results: Arc<AsyncMutex<HashMap<String, Value>>> = Arc::new(AsyncMutex::new(HashMap::new()));
    let aggregated: Arc<AsyncMutex<Stats>> = Arc::new(AsyncMutex::new(Stats::new(engine.depth())));
    let first_error: Arc<AsyncMutex<Option<RlmError>>> = Arc::new(AsyncMutex::new(None));

    let mut handles = Vec::new();
    for task in subtasks {
        let engine = engine.clone();
        let context = context.clone();
        let query = query.clone();
        let results = results.clone();
        let aggregated = aggregated.clone();
        let first_error = first_error.clone();

        handles.push(tokio::spawn(async move {
            let wrapped = wrap_schema(&task.path[0], &task.schema);
            let focused_query = format!("{query}\n\nSpecific focus: {}", task.query);

            tracing::debug!(field = %task.path[0], "structured planner: dispatching parallel worker");

            match direct_path(&engine, &context, &focused_query, &wrapped, max_retries).await {
                Ok((value, worker_stats)) => {
                    let field_name = &task.path[0];
                    let mut field_value = value
                        .as_object()
                        .and_then(|m| m.get(field_name))
                        .cloned()
                        .unwrap_or(Value::Null);
                    if let Some(obj) = field_value.as_object() {
                        if let Some(unwrapped) = obj.get("__value__") {
                            field_value = unwrapped.clone();
                        }
                    }
                    results.lock().await.insert(field_name.clone(), field_value);
                    aggregated.lock().await.merge(&worker_stats);
                }
                Err(e) => {
                    tracing::warn!(field = %task.path[0], error = %e, "structured planner: worker failed");
                    let mut slot = first_error.lock().await;
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                }
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    let error_slot = Arc::try_unwrap(first_error)
        .unwrap_or_else(|_| panic!("all spawned workers have completed; no Arc clones should remain"))
        .into_inner();
    if let Some(err) = error_slot {
        return Err(err);
    }

    let merged_map = Arc::try_unwrap(results)
        .map(|m| m.into_inner())
        .unwrap_or_default();
    let merged = Value::Object(merged_map.into_iter().collect());

    super::schema::validate(&merged, original_schema).map_err(RlmError::Validation)?;

    let stats = Arc::try_unwrap(aggregated)
        .map(|m| m.into_inner())
        .unwrap_or_default();

    Ok((merged, stats))
}

fn wrap_schema(property: &str, field_schema: &crate::types::Schema) -> crate::types::Schema {
    use std::collections::{HashMap as Map, HashSet};
    crate::types::Schema::Object {
        properties: Map::from([(property.to_string(), field_schema.clone())]),
        required: HashSet::from([property.to_string()]),
        nullable: false,
        any_of: vec![],
        all_of: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::testing::MockBackend;
    use crate::types::Schema;
    use std::collections::{HashMap, HashSet};

    fn person_schema() -> Schema {
        Schema::Object {
            properties: HashMap::from([
                (
                    "name".to_string(),
                    Schema::String {
                        enum_values: vec![],
                        min_length: None,
                        max_length: None,
                        pattern: None,
                        format: None,
                        nullable: false,
                    },
                ),
                (
                    "age".to_string(),
                    Schema::Integer { minimum: Some(0.0), maximum: None, nullable: false },
                ),
            ]),
            required: HashSet::from(["name".to_string(), "age".to_string()]),
            nullable: false,
            any_of: vec![],
            all_of: vec![],
        }
    }

    #[tokio::test]
    async fn direct_path_retries_after_validation_feedback() {
        let backend = MockBackend::new(&[r#"{"name":"Alice"}"#, r#"{"name":"Alice","age":30}"#]);
        let config = EngineConfig::new("gpt-test").with_api_base(backend.api_base());
        let engine = Engine::new(config).with_transport(backend.transport());

        let (value, stats) =
            direct_path(&engine, "context", "extract the person", &person_schema(), 3)
                .await
                .unwrap();

        assert_eq!(value["name"], "Alice");
        assert_eq!(value["age"], 30);
        assert_eq!(stats.parsing_retries, 1);
        assert_eq!(stats.llm_calls, 2);
    }

    #[tokio::test]
    async fn direct_path_fails_after_exhausting_retries() {
        let backend = MockBackend::new(&[r#"{"name":"Alice"}"#, r#"{"name":"Alice"}"#]);
        let config = EngineConfig::new("gpt-test").with_api_base(backend.api_base());
        let engine = Engine::new(config).with_transport(backend.transport());

        let err = direct_path(&engine, "context", "extract", &person_schema(), 2).await;
        assert!(matches!(err, Err(RlmError::Validation(_))));
    }

    #[test]
    fn decompose_skips_non_object_schema() {
        let schema = Schema::String {
            enum_values: vec![],
            min_length: None,
            max_length: None,
            pattern: None,
            format: None,
            nullable: false,
        };
        assert!(decompose(&schema, "q").is_empty());
    }

    #[test]
    fn decompose_creates_one_subtask_per_property() {
        let tasks = decompose(&person_schema(), "q");
        assert_eq!(tasks.len(), 2);
    }
}
