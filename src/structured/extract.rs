//! `extract_and_validate` (§4.5.4): pulls a schema-valid JSON value out of
//! free-form LLM text.

use serde_json::{Map, Value};

use crate::types::Schema;

use super::schema::validate;

/// Strips a leading/trailing fenced-code block, if present.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.trim_start_matches(|c: char| c.is_alphabetic());
        let rest = rest.trim_start_matches('\n');
        if let Some(body) = rest.strip_suffix("```") {
            return body.trim();
        }
    }
    trimmed
}

/// Scans `text` for balanced `{...}` substrings, correctly tracking string
/// literals and escape sequences. A naive `\{[^{}]*\}`-style regex fails on
/// nesting and on braces embedded in string literals; this does not.
pub fn find_balanced_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut results = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }
        let start = i;
        let mut depth = 0i32;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;
        let mut j = i;
        while j < bytes.len() {
            let c = bytes[j];
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == b'\\' {
                    escaped = true;
                } else if c == b'"' {
                    in_string = false;
                }
            } else {
                match c {
                    b'"' => in_string = true,
                    b'{' => depth += 1,
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(j);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            j += 1;
        }
        match end {
            Some(end) => {
                results.push(&text[start..=end]);
                i = end + 1;
            }
            None => break,
        }
    }

    results
}

fn native_type_matches(value: &Value, type_name: &str) -> bool {
    match type_name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "number" => value.is_number(),
        "integer" => value.as_f64().is_some_and(|n| n.fract() == 0.0),
        "null" => value.is_null(),
        _ => false,
    }
}

/// Implements §4.5.4 exactly: object schemas parse-then-scan; non-object
/// schemas unwrap a primitive/array the LLM wrapped in an object, returning
/// it under the `__value__` sentinel key.
pub fn extract_and_validate(text: &str, schema: &Schema) -> Result<Value, String> {
    let trimmed = strip_fence(text);

    if !matches!(schema, Schema::Object { .. }) {
        let parsed: Value = serde_json::from_str(trimmed)
            .map_err(|e| format!("JSON parse failure: {e}"))?;
        let candidate = match &parsed {
            Value::Object(map) => map
                .values()
                .find(|v| native_type_matches(v, schema.type_name()))
                .cloned()
                .ok_or_else(|| {
                    format!(
                        "no field in the response matched expected type {}",
                        schema.type_name()
                    )
                })?,
            other => other.clone(),
        };
        validate(&candidate, schema)?;
        let mut wrapper = Map::new();
        wrapper.insert("__value__".to_string(), candidate);
        return Ok(Value::Object(wrapper));
    }

    if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
        if parsed.is_object() {
            validate(&parsed, schema)?;
            return Ok(parsed);
        }
    }

    let mut last_error = "no JSON object found in response".to_string();
    for candidate in find_balanced_objects(trimmed) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(parsed) if parsed.is_object() => match validate(&parsed, schema) {
                Ok(()) => return Ok(parsed),
                Err(e) => last_error = e,
            },
            Ok(_) => continue,
            Err(e) => last_error = format!("JSON parse failure: {e}"),
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn recovers_nested_objects_with_string_literal_braces() {
        let text = r#"Sure, here you go: {"a": {"b": "contains a } brace"}, "c": 1} and some trailing prose"#;
        let objects = find_balanced_objects(text);
        assert_eq!(objects.len(), 1);
        let parsed: Value = serde_json::from_str(objects[0]).unwrap();
        assert_eq!(parsed["c"], 1);
        assert_eq!(parsed["a"]["b"], "contains a } brace");
    }

    #[test]
    fn recovers_multiple_top_level_objects() {
        let text = r#"{"x": 1} then later {"y": 2}"#;
        let objects = find_balanced_objects(text);
        assert_eq!(objects, vec![r#"{"x": 1}"#, r#"{"y": 2}"#]);
    }

    #[test]
    fn object_schema_scans_fenced_text_for_first_valid_candidate() {
        let schema = Schema::Object {
            properties: HashMap::from([(
                "name".to_string(),
                Schema::String {
                    enum_values: vec![],
                    min_length: None,
                    max_length: None,
                    pattern: None,
                    format: None,
                    nullable: false,
                },
            )]),
            required: HashSet::from(["name".to_string()]),
            nullable: false,
            any_of: vec![],
            all_of: vec![],
        };
        let text = "```json\n{\"name\": \"Alice\"}\n```";
        let value = extract_and_validate(text, &schema).unwrap();
        assert_eq!(value["name"], "Alice");
    }

    #[test]
    fn non_object_schema_unwraps_from_a_wrapping_map() {
        let schema = Schema::Array {
            items: None,
            min_items: None,
            max_items: None,
            unique_items: false,
            nullable: false,
        };
        let text = r#"{"result": [1, 2, 3]}"#;
        let value = extract_and_validate(text, &schema).unwrap();
        assert_eq!(value["__value__"], serde_json::json!([1, 2, 3]));
    }
}
