//! Builders for provider output files.

use serde_json::{json, Value};

/// One successful chat-completion output line
pub fn success_line(custom_id: &str, content: &str) -> String {
    json!({
        "id": format!("batch_req_{custom_id}"),
        "custom_id": custom_id,
        "response": {
            "status_code": 200,
            "request_id": "req_123",
            "body": {
                "choices": [
                    {"index": 0, "message": {"role": "assistant", "content": content}}
                ]
            }
        },
        "error": null
    })
    .to_string()
}

/// One line the provider rejected
pub fn error_line(custom_id: &str, message: &str) -> String {
    json!({
        "id": format!("batch_req_{custom_id}"),
        "custom_id": custom_id,
        "response": null,
        "error": {"code": "server_error", "message": message}
    })
    .to_string()
}

/// Content with a JSON tag payload
pub fn tags_content(tags: &[&str], era: Option<&str>) -> String {
    let mut payload = json!({ "tags": tags });
    if let Some(era) = era {
        payload["era"] = Value::String(era.to_string());
    }
    payload.to_string()
}

/// Join lines into a newline-delimited output file
pub fn output_file<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .map(|line| line.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
