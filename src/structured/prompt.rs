//! Prompt synthesis for the structured planner (§4.5.1): renders English
//! descriptions of a schema for field-level sub-tasks and the whole-object
//! direct prompt.

use serde_json::{json, Value};

use crate::types::Schema;

/// A canonical example value for `schema`, used inside a field description
/// when the nested object has at least one required field. Only required
/// fields appear in the example.
pub fn example_value(schema: &Schema, field_name: &str) -> Value {
    match schema {
        Schema::Object { properties, required, .. } => {
            let mut obj = serde_json::Map::new();
            let mut names: Vec<_> = required.iter().cloned().collect();
            names.sort();
            for name in names {
                if let Some(sub) = properties.get(&name) {
                    obj.insert(name.clone(), example_value(sub, &name));
                }
            }
            Value::Object(obj)
        }
        Schema::Array { .. } => json!([]),
        Schema::String { enum_values, .. } => {
            if let Some(first) = enum_values.first() {
                json!(first)
            } else {
                json!("string value")
            }
        }
        Schema::Number { .. } => {
            let lower = field_name.to_lowercase();
            if lower.contains("score") || lower.contains("sentiment") {
                json!(3)
            } else if lower.contains("confidence") {
                json!(0.8)
            } else {
                json!(0)
            }
        }
        Schema::Integer { .. } => {
            let lower = field_name.to_lowercase();
            if lower.contains("score") || lower.contains("sentiment") {
                json!(3)
            } else {
                json!(0)
            }
        }
        Schema::Boolean { .. } => json!(true),
        Schema::Null => Value::Null,
    }
}

fn declared_type(schema: &Schema) -> String {
    schema.type_name().to_string()
}

/// English description of what a field should contain, per §4.5.1.
pub fn field_query(name: &str, schema: &Schema) -> String {
    match schema {
        Schema::Object { properties, required, .. } => {
            let mut names: Vec<_> = required.iter().cloned().collect();
            names.sort();
            let fields: Vec<String> = names
                .iter()
                .map(|n| {
                    let ty = properties.get(n).map(declared_type).unwrap_or_else(|| "any".to_string());
                    format!("{n} ({ty})")
                })
                .collect();
            let mut out = format!(
                "Return a JSON object with these REQUIRED fields: {}.",
                fields.join(", ")
            );
            if !required.is_empty() {
                let example = example_value(schema, name);
                out.push_str(&format!("\nExample: {example}"));
            }
            out
        }
        Schema::Array { items, .. } => match items.as_deref() {
            Some(Schema::Object { properties, required, .. }) => {
                let mut req: Vec<_> = required.iter().cloned().collect();
                req.sort();
                let mut opt: Vec<_> = properties
                    .keys()
                    .filter(|k| !required.contains(*k))
                    .cloned()
                    .collect();
                opt.sort();
                format!(
                    "Return a JSON array of objects. Required fields per item: {}. Optional fields: {}.",
                    if req.is_empty() { "none".to_string() } else { req.join(", ") },
                    if opt.is_empty() { "none".to_string() } else { opt.join(", ") }
                )
            }
            Some(other) => format!("Return a JSON array of {} values.", declared_type(other)),
            None => "Return a JSON array.".to_string(),
        },
        Schema::String { enum_values, .. } if !enum_values.is_empty() => {
            format!("Return EXACTLY one of: {}.", enum_values.join(", "))
        }
        other => format!("Return a JSON {} value for '{name}'.", declared_type(other)),
    }
}

/// Bullet-list constraints for the direct whole-object prompt, per §4.5.1.
/// Recurses one level into item properties for array-of-object schemas.
pub fn constraints(schema: &Schema) -> String {
    let bullets = constraint_bullets(schema, 0);
    if bullets.is_empty() {
        String::new()
    } else {
        format!("CONSTRAINTS:\n{}\n\n", bullets.join("\n"))
    }
}

fn constraint_bullets(schema: &Schema, item_depth: u8) -> Vec<String> {
    let mut bullets = Vec::new();
    match schema {
        Schema::Number { minimum, maximum, .. } | Schema::Integer { minimum, maximum, .. } => {
            if minimum.is_some() || maximum.is_some() {
                let min = minimum.map(|m| m.to_string()).unwrap_or_else(|| "-inf".to_string());
                let max = maximum.map(|m| m.to_string()).unwrap_or_else(|| "inf".to_string());
                bullets.push(format!("- value must be >= {min} and <= {max}"));
            }
            if matches!(schema, Schema::Integer { .. }) {
                bullets.push("- value must be an integer".to_string());
            }
        }
        Schema::String { enum_values, min_length, max_length, format, .. } => {
            if !enum_values.is_empty() {
                bullets.push(format!("- must be EXACTLY one of: {}", enum_values.join(", ")));
            }
            if let Some(min) = min_length {
                bullets.push(format!("- string minLength {min}"));
            }
            if let Some(max) = max_length {
                bullets.push(format!("- string maxLength {max}"));
            }
            if let Some(format) = format {
                bullets.push(format!("- string format {format}"));
            }
        }
        Schema::Array { min_items, max_items, items, .. } => {
            if let Some(min) = min_items {
                bullets.push(format!("- array minItems {min}"));
            }
            if let Some(max) = max_items {
                bullets.push(format!("- array maxItems {max}"));
            }
            if item_depth == 0 {
                if let Some(item_schema) = items {
                    if let Schema::Object { properties, .. } = item_schema.as_ref() {
                        for (name, sub) in properties {
                            for bullet in constraint_bullets(sub, item_depth + 1) {
                                bullets.push(format!("- item field '{name}': {}", bullet.trim_start_matches("- ")));
                            }
                        }
                    }
                }
            }
        }
        Schema::Object { properties, .. } => {
            for (name, sub) in properties {
                for bullet in constraint_bullets(sub, item_depth) {
                    bullets.push(format!("- field '{name}': {}", bullet.trim_start_matches("- ")));
                }
            }
        }
        _ => {}
    }
    bullets
}

/// The whole-object prompt used by the direct path (§4.5.2).
pub fn build_direct_prompt(context: &str, query: &str, schema: &Schema) -> String {
    let schema_json = serde_json::to_string_pretty(schema).unwrap_or_default();
    let required_hint = match schema.required() {
        Some(required) if !required.is_empty() => {
            let mut names: Vec<_> = required.iter().cloned().collect();
            names.sort();
            format!("Required fields: {}.\n\n", names.join(", "))
        }
        _ => String::new(),
    };

    format!(
        "CONTEXT:\n{context}\n\nTASK:\n{query}\n\nSCHEMA:\n{schema_json}\n\n{required_hint}{}CRITICAL INSTRUCTIONS:\n1. Return ONLY valid JSON, nothing else.\n2. Do not wrap the JSON in a markdown code fence.\n3. Every required field must be present.\n4. Use the correct type for every field.\n5. Enum values must be copied verbatim.\n6. Do not include any explanatory prose.",
        constraints(schema)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn field_query_for_enum_string_names_exact_values() {
        let schema = Schema::String {
            enum_values: vec!["positive".to_string(), "negative".to_string()],
            min_length: None,
            max_length: None,
            pattern: None,
            format: None,
            nullable: false,
        };
        let q = field_query("sentiment", &schema);
        assert!(q.contains("EXACTLY one of"));
        assert!(q.contains("positive"));
    }

    #[test]
    fn example_value_fills_score_fields_with_three() {
        let schema = Schema::Integer { minimum: None, maximum: None, nullable: false };
        assert_eq!(example_value(&schema, "sentiment_score"), json!(3));
    }

    #[test]
    fn example_value_fills_confidence_fields_with_point_eight() {
        let schema = Schema::Number { minimum: None, maximum: None, multiple_of: None, nullable: false };
        assert_eq!(example_value(&schema, "confidence"), json!(0.8));
    }

    #[test]
    fn constraints_emit_numeric_range_bullet() {
        let schema = Schema::Integer { minimum: Some(0.0), maximum: Some(120.0), nullable: false };
        let c = constraints(&schema);
        assert!(c.starts_with("CONSTRAINTS:\n"));
        assert!(c.contains(">= 0"));
        assert!(c.contains("<= 120"));
    }

    #[test]
    fn constraints_empty_for_unconstrained_schema() {
        let schema = Schema::Object {
            properties: HashMap::new(),
            required: HashSet::new(),
            nullable: false,
            any_of: vec![],
            all_of: vec![],
        };
        assert_eq!(constraints(&schema), "");
    }
}
