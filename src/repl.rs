//! Sandboxed REPL runtime (component B): evaluates a code block in a fresh
//! interpreter populated with a fixed environment, capturing output with
//! truncation.
//!
//! The interpreter is `rhai`, an embeddable scripting engine. `rhai` is
//! itself expression-oriented: the value of the last statement in a script
//! is the script's return value, and an assignment statement evaluates to
//! `()`. That native behaviour is used directly to implement the "fallback
//! expression evaluation" rule below rather than re-parsing the source.

use std::cmp::Ordering;
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;
use rhai::{Dynamic, Engine, FnPtr, NativeCallContext, Scope};

use crate::error::{Result, RlmError};
use crate::types::ReplEnv;

const DEFAULT_MAX_OUTPUT_CHARS: usize = 2_000;
const MAX_EXPR_DEPTH: usize = 64;
const MAX_OPERATIONS: u64 = 500_000;
const MAX_STRING_SIZE: usize = 10_000_000;

/// Marker types used to give the bootstrapped prelude dotted-namespace call
/// syntax (`json.loads(...)`, `math.sqrt(...)`, ...) via `rhai`'s ordinary
/// method-call dispatch on a registered type.
#[derive(Debug, Clone)]
struct JsonNs;
#[derive(Debug, Clone)]
struct MathNs;
#[derive(Debug, Clone)]
struct DateTimeNs;
#[derive(Debug, Clone)]
struct ReNs;

#[derive(Clone)]
pub struct Repl {
    max_output_chars: usize,
}

impl Repl {
    pub fn new() -> Self {
        Self {
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }

    pub fn with_max_output_chars(mut self, max_output_chars: usize) -> Self {
        self.max_output_chars = max_output_chars;
        self
    }

    /// Evaluates `code_text` against `env`. `register_extra` lets the caller
    /// (the completion loop) bind additional native functions — namely the
    /// recursive-call handle, which needs engine state this module has no
    /// business holding — on top of the fixed prelude, before evaluation.
    pub fn execute<F>(&self, code_text: &str, env: &ReplEnv, register_extra: F) -> Result<String>
    where
        F: FnOnce(&mut Engine),
    {
        let code = extract_code(code_text);
        if code.trim().is_empty() {
            tracing::debug!("repl execute: no code extracted from reply");
            return Ok("No code to execute".to_string());
        }

        tracing::debug!(chars = code.len(), "repl execute: running script");

        let output = Arc::new(Mutex::new(String::new()));
        let mut engine = Engine::new();
        engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH);
        engine.set_max_operations(MAX_OPERATIONS);
        engine.set_max_string_size(MAX_STRING_SIZE);
        register_prelude(&mut engine, output.clone());
        register_extra(&mut engine);

        let mut scope = Scope::new();
        for (key, value) in env {
            scope.push_dynamic(
                key.clone(),
                rhai::serde::to_dynamic(value).unwrap_or(Dynamic::UNIT),
            );
        }

        let eval_result = engine.eval_with_scope::<Dynamic>(&mut scope, &code);

        let mut buffer = output.lock().expect("output mutex poisoned").clone();

        match eval_result {
            Ok(value) => {
                // Fallback expression evaluation: a bare trailing expression
                // produces a non-unit value; an assignment produces `()`.
                if buffer.is_empty() && !value.is_unit() {
                    buffer.push_str(&dynamic_to_display(&value));
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "repl execute: script failed");
                return Err(RlmError::Repl(err.to_string()));
            }
        }

        if buffer.len() > self.max_output_chars {
            let prefix: String = buffer.chars().take(self.max_output_chars).collect();
            let prefix = prefix.trim_end().to_string();
            return Ok(format!(
                "{prefix}\n[Output truncated: {} chars total, showing first {}]",
                buffer.chars().count(),
                prefix.chars().count()
            ));
        }

        if buffer.is_empty() {
            return Ok("Code executed successfully (no output)".to_string());
        }

        Ok(buffer)
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts the first fenced code block's body (language hint `python`,
/// `javascript`, `js`, or none); otherwise returns the whole input.
fn extract_code(input: &str) -> String {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let re = FENCE.get_or_init(|| {
        Regex::new(r"```(?:python|javascript|js)?\s*\n?([\s\S]*?)```").unwrap()
    });
    match re.captures(input) {
        Some(captures) => captures[1].to_string(),
        None => input.to_string(),
    }
}

fn dynamic_to_display(value: &Dynamic) -> String {
    if let Some(s) = value.clone().try_cast::<String>() {
        return s;
    }
    if let Ok(json) = rhai::serde::from_dynamic::<serde_json::Value>(value) {
        return match &json {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    }
    value.to_string()
}

fn register_prelude(engine: &mut Engine, output: Arc<Mutex<String>>) {
    // print / console.log sink, and `len`.
    let sink = output.clone();
    engine.register_fn("print", move |value: Dynamic| {
        append_to_sink(&sink, &[value]);
    });
    let sink = output.clone();
    engine.register_fn("print", move |a: Dynamic, b: Dynamic| {
        append_to_sink(&sink, &[a, b]);
    });
    let sink = output.clone();
    engine.register_fn("print", move |a: Dynamic, b: Dynamic, c: Dynamic| {
        append_to_sink(&sink, &[a, b, c]);
    });

    engine.register_type_with_name::<ConsoleNs>("Console");
    let sink = output.clone();
    engine.register_fn("log", move |_ns: &mut ConsoleNs, value: Dynamic| {
        append_to_sink(&sink, &[value]);
    });
    let sink = output.clone();
    engine.register_fn("log", move |_ns: &mut ConsoleNs, a: Dynamic, b: Dynamic| {
        append_to_sink(&sink, &[a, b]);
    });

    engine.register_fn("len", |s: &str| -> i64 { s.chars().count() as i64 });
    engine.register_fn("len", |a: rhai::Array| -> i64 { a.len() as i64 });
    engine.register_fn("len", |m: rhai::Map| -> i64 { m.len() as i64 });

    register_json(engine);
    register_math(engine);
    register_datetime(engine);
    register_regex(engine);
    register_collections(engine);

    let mut namespaces = rhai::Module::new();
    namespaces.set_var("json", JsonNs);
    namespaces.set_var("math", MathNs);
    namespaces.set_var("datetime", DateTimeNs);
    namespaces.set_var("re", ReNs);
    namespaces.set_var("console", ConsoleNs);
    engine.register_global_module(namespaces.into());
}

fn append_to_sink(sink: &Arc<Mutex<String>>, values: &[Dynamic]) {
    let rendered = values
        .iter()
        .map(dynamic_to_display)
        .collect::<Vec<_>>()
        .join(" ");
    let mut buf = sink.lock().expect("output mutex poisoned");
    buf.push_str(&rendered);
    buf.push('\n');
}

#[derive(Debug, Clone)]
struct ConsoleNs;

fn register_json(engine: &mut Engine) {
    engine.register_type_with_name::<JsonNs>("Json");
    engine.register_fn("loads", |_ns: &mut JsonNs, text: &str| -> Dynamic {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => rhai::serde::to_dynamic(&value).unwrap_or(Dynamic::UNIT),
            Err(_) => Dynamic::UNIT,
        }
    });
    engine.register_fn("dumps", |_ns: &mut JsonNs, value: Dynamic| -> String {
        match rhai::serde::from_dynamic::<serde_json::Value>(&value) {
            Ok(json) => json.to_string(),
            Err(_) => "null".to_string(),
        }
    });
}

fn register_math(engine: &mut Engine) {
    engine.register_type_with_name::<MathNs>("Math");
    engine.register_fn("sqrt", |_ns: &mut MathNs, x: f64| x.sqrt());
    engine.register_fn("floor", |_ns: &mut MathNs, x: f64| x.floor());
    engine.register_fn("ceil", |_ns: &mut MathNs, x: f64| x.ceil());
    engine.register_fn("pow", |_ns: &mut MathNs, x: f64, y: f64| x.powf(y));
    engine.register_fn("abs", |_ns: &mut MathNs, x: f64| x.abs());
    engine.register_fn("log", |_ns: &mut MathNs, x: f64| x.ln());
    engine.register_get("pi", |_ns: &mut MathNs| std::f64::consts::PI);
    engine.register_get("e", |_ns: &mut MathNs| std::f64::consts::E);
}

fn register_datetime(engine: &mut Engine) {
    engine.register_type_with_name::<DateTimeNs>("DateTime");
    engine.register_fn("now", |_ns: &mut DateTimeNs| -> String {
        chrono::Utc::now().to_rfc3339()
    });
}

fn register_regex(engine: &mut Engine) {
    engine.register_type_with_name::<ReNs>("Re");
    engine.register_fn("findall", |_ns: &mut ReNs, pattern: &str, text: &str| -> rhai::Array {
        match Regex::new(pattern) {
            Ok(re) => re
                .find_iter(text)
                .map(|m| Dynamic::from(m.as_str().to_string()))
                .collect(),
            Err(_) => rhai::Array::new(),
        }
    });
    engine.register_fn("search", |_ns: &mut ReNs, pattern: &str, text: &str| -> String {
        match Regex::new(pattern) {
            Ok(re) => re
                .find(text)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            Err(_) => String::new(),
        }
    });
}

fn register_collections(engine: &mut Engine) {
    engine.register_fn("Counter", |value: Dynamic| -> rhai::Map {
        let mut counts: rhai::Map = rhai::Map::new();
        let items: Vec<String> = if let Some(s) = value.clone().try_cast::<String>() {
            s.chars().map(|c| c.to_string()).collect()
        } else if let Some(arr) = value.clone().try_cast::<rhai::Array>() {
            arr.into_iter().map(|v| dynamic_to_display(&v)).collect()
        } else {
            vec![]
        };
        for item in items {
            let entry = counts.entry(item.into()).or_insert(Dynamic::from(0_i64));
            let next = entry.as_int().unwrap_or(0) + 1;
            *entry = Dynamic::from(next);
        }
        counts
    });

    engine.register_fn("range", |stop: i64| -> rhai::Array {
        (0..stop).map(Dynamic::from).collect()
    });
    engine.register_fn("range", |start: i64, stop: i64| -> rhai::Array {
        (start..stop).map(Dynamic::from).collect()
    });
    engine.register_fn("range", |start: i64, stop: i64, step: i64| -> rhai::Array {
        if step == 0 {
            return rhai::Array::new();
        }
        let mut values = Vec::new();
        let mut i = start;
        if step > 0 {
            while i < stop {
                values.push(Dynamic::from(i));
                i += step;
            }
        } else {
            while i > stop {
                values.push(Dynamic::from(i));
                i += step;
            }
        }
        values
    });

    engine.register_fn("sum", |arr: rhai::Array| -> f64 {
        arr.iter().filter_map(|v| v.as_float().ok().or_else(|| v.as_int().ok().map(|i| i as f64))).sum()
    });
    engine.register_fn("any", |arr: rhai::Array| -> bool {
        arr.iter().any(|v| v.as_bool().unwrap_or(!v.is_unit()))
    });
    engine.register_fn("all", |arr: rhai::Array| -> bool {
        arr.iter().all(|v| v.as_bool().unwrap_or(!v.is_unit()))
    });
    engine.register_fn("enumerate", |arr: rhai::Array| -> rhai::Array {
        arr.into_iter()
            .enumerate()
            .map(|(i, v)| {
                let pair: rhai::Array = vec![Dynamic::from(i as i64), v];
                Dynamic::from(pair)
            })
            .collect()
    });
    engine.register_fn("zip", |a: rhai::Array, b: rhai::Array| -> rhai::Array {
        a.into_iter()
            .zip(b)
            .map(|(x, y)| Dynamic::from(vec![x, y] as rhai::Array))
            .collect()
    });

    engine.register_fn("sorted", |arr: rhai::Array| -> rhai::Array {
        let mut items = arr;
        items.sort_by(compare_dynamic);
        items
    });
    engine.register_fn("min", |arr: rhai::Array| -> Dynamic {
        arr.into_iter().min_by(compare_dynamic).unwrap_or(Dynamic::UNIT)
    });
    engine.register_fn("max", |arr: rhai::Array| -> Dynamic {
        arr.into_iter().max_by(compare_dynamic).unwrap_or(Dynamic::UNIT)
    });

    register_defaultdict(engine);
}

/// Orders numerically when both sides are numbers, falling back to display
/// order otherwise — the same loose coercion `sum` already uses.
fn compare_dynamic(a: &Dynamic, b: &Dynamic) -> Ordering {
    let as_f64 = |v: &Dynamic| v.as_float().ok().or_else(|| v.as_int().ok().map(|i| i as f64));
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    dynamic_to_display(a).cmp(&dynamic_to_display(b))
}

/// A map whose missing-key reads materialize and store `factory()`, mirroring
/// Python's `collections.defaultdict`.
#[derive(Debug, Clone)]
struct DefaultDict {
    map: rhai::Map,
    factory: FnPtr,
}

fn register_defaultdict(engine: &mut Engine) {
    engine.register_type_with_name::<DefaultDict>("DefaultDict");
    engine.register_fn("defaultdict", |factory: FnPtr| -> DefaultDict {
        DefaultDict { map: rhai::Map::new(), factory }
    });
    engine.register_indexer_get(
        |context: NativeCallContext, dd: &mut DefaultDict, key: &str| -> Dynamic {
            if let Some(value) = dd.map.get(key) {
                return value.clone();
            }
            let value = dd.factory.call_within_context(&context, ()).unwrap_or(Dynamic::UNIT);
            dd.map.insert(key.into(), value.clone());
            value
        },
    );
    engine.register_indexer_set(|dd: &mut DefaultDict, key: &str, value: Dynamic| {
        dd.map.insert(key.into(), value);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> ReplEnv {
        ReplEnv::new()
    }

    #[test]
    fn empty_input_yields_no_code_message() {
        let repl = Repl::new();
        let result = repl.execute("   ", &env(), |_| {}).unwrap();
        assert_eq!(result, "No code to execute");
    }

    #[test]
    fn extracts_fenced_python_block() {
        assert_eq!(extract_code("```python\nprint(1)\n```"), "print(1)\n");
    }

    #[test]
    fn uses_whole_input_when_unfenced() {
        assert_eq!(extract_code("let x = 1;"), "let x = 1;");
    }

    #[test]
    fn print_writes_to_observation_buffer() {
        let repl = Repl::new();
        let result = repl.execute(r#"print("hello")"#, &env(), |_| {}).unwrap();
        assert_eq!(result, "hello\n");
    }

    #[test]
    fn bare_trailing_expression_is_fallback_evaluated() {
        let repl = Repl::new();
        let result = repl.execute("1 + 2", &env(), |_| {}).unwrap();
        assert_eq!(result, "3");
    }

    #[test]
    fn empty_buffer_after_assignment_reports_no_output() {
        let repl = Repl::new();
        let result = repl.execute("let x = 1;", &env(), |_| {}).unwrap();
        assert_eq!(result, "Code executed successfully (no output)");
    }

    #[test]
    fn output_is_truncated_past_the_configured_limit() {
        let repl = Repl::new().with_max_output_chars(10);
        let result = repl
            .execute(r#"print("0123456789abcdef")"#, &env(), |_| {})
            .unwrap();
        assert!(result.contains("[Output truncated: "));
    }

    #[test]
    fn execution_error_is_wrapped_as_repl_error() {
        let repl = Repl::new();
        let err = repl.execute("this is not valid syntax !!!", &env(), |_| {});
        assert!(matches!(err, Err(RlmError::Repl(_))));
    }

    #[test]
    fn env_bindings_are_visible_to_the_script() {
        use serde_json::json;
        let mut e = env();
        e.insert("query".to_string(), json!("hello"));
        let repl = Repl::new();
        let result = repl.execute("query", &e, |_| {}).unwrap();
        assert_eq!(result, "hello");
    }

    #[test]
    fn regex_helper_finds_all_matches() {
        let repl = Repl::new();
        let result = repl
            .execute(r#"re.findall("\\d+", "a1 b22 c333")"#, &env(), |_| {})
            .unwrap();
        assert!(result.contains('1') && result.contains("22") && result.contains("333"));
    }

    #[test]
    fn invalid_regex_yields_empty_result_not_error() {
        let repl = Repl::new();
        let result = repl.execute(r#"re.findall("(", "text")"#, &env(), |_| {});
        assert!(result.is_ok());
    }

    #[test]
    fn two_sequential_calls_with_same_args_are_deterministic() {
        let repl = Repl::new();
        let code = "1 + 1";
        let a = repl.execute(code, &env(), |_| {}).unwrap();
        let b = repl.execute(code, &env(), |_| {}).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sorted_min_max_operate_on_arrays() {
        let repl = Repl::new();
        assert_eq!(repl.execute("sorted([3, 1, 2])", &env(), |_| {}).unwrap(), "[1,2,3]");
        assert_eq!(repl.execute("min([3, 1, 2])", &env(), |_| {}).unwrap(), "1");
        assert_eq!(repl.execute("max([3, 1, 2])", &env(), |_| {}).unwrap(), "3");
    }

    #[test]
    fn defaultdict_materializes_missing_keys_via_factory() {
        let repl = Repl::new();
        let result = repl
            .execute(
                r#"
                let d = defaultdict(|| 0);
                d["a"] += 1;
                d["a"] += 1;
                print(d["a"])
                "#,
                &env(),
                |_| {},
            )
            .unwrap();
        assert_eq!(result, "2\n");
    }
}
