//! The floor validator (§4.5.6): recursive, tag-driven schema validation.
//! Enum/bounds/pattern/length checks are enforced here directly; an embedded
//! Draft-2020-12 validator may additionally be consulted, but this function
//! is always run and is always authoritative.

use serde_json::Value;

use crate::types::Schema;

/// Validates `value` against `schema`, returning a human-readable error on
/// the first mismatch found.
pub fn validate(value: &Value, schema: &Schema) -> Result<(), String> {
    if matches!(value, Value::Null) {
        if schema.is_nullable() || matches!(schema, Schema::Null) {
            return Ok(());
        }
        return Err(format!("type mismatch: expected {}, got null", schema.type_name()));
    }

    match schema {
        Schema::Object { properties, required, .. } => {
            let map = value
                .as_object()
                .ok_or_else(|| format!("type mismatch: expected object, got {}", kind_name(value)))?;
            for name in required {
                if !map.contains_key(name) {
                    return Err(format!("missing required field: {name}"));
                }
            }
            for (name, sub_schema) in properties {
                if let Some(sub_value) = map.get(name) {
                    validate(sub_value, sub_schema)
                        .map_err(|e| format!("field '{name}': {e}"))?;
                }
            }
            Ok(())
        }
        Schema::Array { items, min_items, max_items, unique_items, .. } => {
            let arr = value
                .as_array()
                .ok_or_else(|| format!("type mismatch: expected array, got {}", kind_name(value)))?;
            if let Some(min) = min_items {
                if arr.len() < *min {
                    return Err(format!("array too short: expected at least {min} items"));
                }
            }
            if let Some(max) = max_items {
                if arr.len() > *max {
                    return Err(format!("array too long: expected at most {max} items"));
                }
            }
            if *unique_items {
                let mut seen = Vec::new();
                for item in arr {
                    if seen.contains(item) {
                        return Err("array items must be unique".to_string());
                    }
                    seen.push(item.clone());
                }
            }
            if let Some(item_schema) = items {
                for item in arr {
                    validate(item, item_schema)?;
                }
            }
            Ok(())
        }
        Schema::String { enum_values, min_length, max_length, pattern, .. } => {
            let s = value
                .as_str()
                .ok_or_else(|| format!("type mismatch: expected string, got {}", kind_name(value)))?;
            if !enum_values.is_empty() && !enum_values.iter().any(|v| v == s) {
                return Err(format!("must be EXACTLY one of: {}", enum_values.join(", ")));
            }
            if let Some(min) = min_length {
                if s.chars().count() < *min {
                    return Err(format!("string too short: expected at least {min} characters"));
                }
            }
            if let Some(max) = max_length {
                if s.chars().count() > *max {
                    return Err(format!("string too long: expected at most {max} characters"));
                }
            }
            if let Some(pattern) = pattern {
                if let Ok(re) = regex::Regex::new(pattern) {
                    if !re.is_match(s) {
                        return Err(format!("string does not match pattern: {pattern}"));
                    }
                }
            }
            Ok(())
        }
        Schema::Boolean { .. } => {
            if value.is_boolean() {
                Ok(())
            } else {
                Err(format!("type mismatch: expected boolean, got {}", kind_name(value)))
            }
        }
        Schema::Number { minimum, maximum, multiple_of, .. } => {
            let n = value
                .as_f64()
                .ok_or_else(|| format!("type mismatch: expected number, got {}", kind_name(value)))?;
            check_numeric_bounds(n, *minimum, *maximum, *multiple_of)
        }
        Schema::Integer { minimum, maximum, .. } => {
            let n = value
                .as_f64()
                .ok_or_else(|| format!("type mismatch: expected integer, got {}", kind_name(value)))?;
            if n.fract() != 0.0 {
                return Err("type mismatch: expected a whole number".to_string());
            }
            check_numeric_bounds(n, *minimum, *maximum, None)
        }
        Schema::Null => {
            if value.is_null() {
                Ok(())
            } else {
                Err(format!("type mismatch: expected null, got {}", kind_name(value)))
            }
        }
    }
}

fn check_numeric_bounds(
    n: f64,
    minimum: Option<f64>,
    maximum: Option<f64>,
    multiple_of: Option<f64>,
) -> Result<(), String> {
    if let Some(min) = minimum {
        if n < min {
            return Err(format!("value {n} below minimum {min}"));
        }
    }
    if let Some(max) = maximum {
        if n > max {
            return Err(format!("value {n} above maximum {max}"));
        }
    }
    if let Some(step) = multiple_of {
        if step != 0.0 && (n / step).fract().abs() > 1e-9 {
            return Err(format!("value {n} is not a multiple of {step}"));
        }
    }
    Ok(())
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
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
                    Schema::Integer {
                        minimum: Some(0.0),
                        maximum: None,
                        nullable: false,
                    },
                ),
            ]),
            required: HashSet::from(["name".to_string(), "age".to_string()]),
            nullable: false,
            any_of: vec![],
            all_of: vec![],
        }
    }

    #[test]
    fn missing_required_field_fails() {
        let err = validate(&json!({"name": "Alice"}), &person_schema()).unwrap_err();
        assert!(err.contains("missing required field: age"));
    }

    #[test]
    fn complete_object_passes() {
        assert!(validate(&json!({"name": "Alice", "age": 30}), &person_schema()).is_ok());
    }

    #[test]
    fn integer_schema_accepts_whole_valued_floats() {
        let schema = Schema::Integer { minimum: None, maximum: None, nullable: false };
        assert!(validate(&json!(30.0), &schema).is_ok());
        assert!(validate(&json!(30.5), &schema).is_err());
    }

    #[test]
    fn enum_mismatch_is_reported() {
        let schema = Schema::String {
            enum_values: vec!["positive".to_string(), "negative".to_string()],
            min_length: None,
            max_length: None,
            pattern: None,
            format: None,
            nullable: false,
        };
        assert!(validate(&json!("neutral"), &schema).is_err());
        assert!(validate(&json!("positive"), &schema).is_ok());
    }

    #[test]
    fn nullable_accepts_null() {
        let schema = Schema::String {
            enum_values: vec![],
            min_length: None,
            max_length: None,
            pattern: None,
            format: None,
            nullable: true,
        };
        assert!(validate(&Value::Null, &schema).is_ok());
    }

    #[test]
    fn schema_valid_example_round_trips() {
        let value = json!({"name": "Alice", "age": 30});
        let text = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert!(validate(&back, &person_schema()).is_ok());
    }
}
