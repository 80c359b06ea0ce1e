//! Decoding of a single batch-output line.
//!
//! Expected record shape:
//!
//! ```json
//! {"custom_id": "tags:42",
//!  "response": {"status_code": 200,
//!               "body": {"choices": [{"message": {"content": "..."}}]}},
//!  "error": null}
//! ```

use super::tags::extract_tags;
use super::{ParsedRow, RowOutcome};
use serde_json::Value;

/// Decode one physical line. Never fails: malformed input becomes a
/// [`RowOutcome::DecodeError`] so the caller can count it.
pub fn decode_line(line_number: usize, line: &str) -> ParsedRow {
    let record: Value = match serde_json::from_str(line.trim()) {
        Ok(value) => value,
        Err(e) => {
            return ParsedRow {
                line_number,
                custom_id: None,
                outcome: RowOutcome::DecodeError {
                    raw: line.to_string(),
                    reason: e.to_string(),
                },
            }
        }
    };

    if !record.is_object() {
        return ParsedRow {
            line_number,
            custom_id: None,
            outcome: RowOutcome::DecodeError {
                raw: line.to_string(),
                reason: "record is not a JSON object".to_string(),
            },
        };
    }

    let custom_id = record.get("custom_id").and_then(|id| match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    ParsedRow {
        line_number,
        custom_id,
        outcome: decode_outcome(&record),
    }
}

fn decode_outcome(record: &Value) -> RowOutcome {
    if let Some(error) = record.get("error").filter(|e| !e.is_null()) {
        return RowOutcome::ProviderError {
            message: error_message(error),
        };
    }

    let Some(response) = record.get("response").filter(|r| !r.is_null()) else {
        return RowOutcome::NoTags {
            reason: "record has no response".to_string(),
        };
    };

    let body = response.get("body");
    if let Some(status) = response.get("status_code").and_then(Value::as_u64) {
        if status != 200 {
            let detail = body
                .and_then(|b| b.get("error"))
                .map(error_message)
                .unwrap_or_else(|| "no error detail".to_string());
            return RowOutcome::ProviderError {
                message: format!("status code {status}: {detail}"),
            };
        }
    }

    let Some(content) = body.and_then(message_content) else {
        return RowOutcome::NoTags {
            reason: "response has no message content".to_string(),
        };
    };

    match extract_tags(&content) {
        Some((strategy, payload)) => {
            tracing::trace!(strategy = strategy.name(), tags = payload.tags.len(), "Extracted tags");
            RowOutcome::Tags(payload)
        }
        None => RowOutcome::NoTags {
            reason: "no tags found in content".to_string(),
        },
    }
}

/// First choice's message content; either a string or an array of text parts
fn message_content(body: &Value) -> Option<String> {
    let content = body
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?;

    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let joined: Vec<&str> = parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(text) => Some(text.as_str()),
                    Value::Object(_) => part.get("text").and_then(Value::as_str),
                    _ => None,
                })
                .collect();
            (!joined.is_empty()).then(|| joined.join("\n"))
        }
        _ => None,
    }
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        _ => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    }
}
