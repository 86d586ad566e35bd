//! Validation feedback (§4.5.5): turns a validator error into a corrective
//! message appended to the conversation before retrying.

use crate::types::Schema;

pub fn validation_feedback(err: &str, schema: &Schema, prior_reply: &str) -> String {
    let mut message = String::from("VALIDATION ERROR\n\n");
    message.push_str(err);
    message.push('\n');

    if let Some(field) = err.strip_prefix("missing required field: ") {
        if let Some(sub_schema) = schema.properties().and_then(|props| props.get(field)) {
            message.push_str(&format!(
                "\nField '{field}' must be present and of type {}.",
                sub_schema.type_name()
            ));
            if let Some(required) = sub_schema.required() {
                if !required.is_empty() {
                    let mut names: Vec<_> = required.iter().cloned().collect();
                    names.sort();
                    message.push_str(&format!(
                        " It is an object requiring: {}.",
                        names.join(", ")
                    ));
                }
            }
            if let Schema::Array { items: Some(items), .. } = sub_schema {
                message.push_str(&format!(" It is an array of {} values.", items.type_name()));
            }
        }
    } else if err.contains("type mismatch") {
        message.push_str("\nType mismatch: ensure every field matches its declared type exactly.\n");
    }

    let snippet: String = prior_reply.chars().take(200).collect();
    message.push_str(&format!("\nYour prior response (truncated): {snippet}\n"));

    message.push_str(
        "\nPlease correct your response:\n\
         1. Include all required fields.\n\
         2. Use the correct type for every field.\n\
         3. Satisfy nested required fields inside any object fields.\n\
         4. Respond with JSON only — no markdown, no prose.",
    );

    message
}
