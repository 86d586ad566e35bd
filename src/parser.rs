//! Sentinel parser (component C): detects and extracts a terminal answer
//! from free-form LLM text.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::ReplEnv;

fn triple_double() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"FINAL\(\s*"""([\s\S]*?)"""\s*\)"#).unwrap())
}

fn triple_single() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"FINAL\(\s*'''([\s\S]*?)'''\s*\)").unwrap())
}

fn double_quoted() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"FINAL\(\s*"([^"]*)"\s*\)"#).unwrap())
}

fn single_quoted() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"FINAL\(\s*'([^']*)'\s*\)").unwrap())
}

fn final_var() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"FINAL_VAR\(\s*(\w+)\s*\)").unwrap())
}

/// Precondition check, not a validator: true if either opening form appears
/// anywhere in `text`.
pub fn is_final(text: &str) -> bool {
    text.contains("FINAL(") || text.contains("FINAL_VAR(")
}

/// Extracts the terminal answer from `text`, if any. Earlier grammar rules
/// beat later ones when more than one would match the same text.
///
/// `FINAL_VAR(name)` resolves `name` against `env`; the stringified value is
/// the answer. A reference to a name absent from `env` is a parse failure,
/// not a fallback to a later rule.
pub fn parse(text: &str, env: &ReplEnv) -> Option<String> {
    if let Some(captures) = triple_double().captures(text) {
        return Some(captures[1].trim().to_string());
    }
    if let Some(captures) = triple_single().captures(text) {
        return Some(captures[1].trim().to_string());
    }
    if let Some(captures) = double_quoted().captures(text) {
        return Some(captures[1].to_string());
    }
    if let Some(captures) = single_quoted().captures(text) {
        return Some(captures[1].to_string());
    }
    if let Some(captures) = final_var().captures(text) {
        let name = &captures[1];
        return env.get(name).map(stringify_value);
    }
    None
}

fn stringify_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
