use super::builders::{error_line, success_line, tags_content};
use proptest::prelude::*;

/// Strategy for raw model tag strings, including case and whitespace noise
pub fn raw_tag_strategy() -> impl Strategy<Value = String> {
    "[ ]{0,2}[a-zA-Z][a-zA-Z ]{0,12}"
}

pub fn era_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[0-9]{3,4}s")
}

/// Strategy for one output line: valid tags, provider error, or garbage
pub fn output_line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => (1i64..20, prop::collection::vec(raw_tag_strategy(), 1..5), era_strategy()).prop_map(
            |(asset_id, tags, era)| {
                let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
                success_line(&format!("tags:{asset_id}"), &tags_content(&tags, era.as_deref()))
            }
        ),
        1 => (1i64..20).prop_map(|asset_id| error_line(&format!("tags:{asset_id}"), "server_error")),
        1 => "[a-z{}\" :,]{0,30}",
    ]
}

/// Strategy for (asset_id, tags) rows targeting assets `1..=5`
pub fn tag_rows_strategy() -> impl Strategy<Value = Vec<(i64, Vec<String>)>> {
    prop::collection::vec(
        (1i64..=5, prop::collection::vec(raw_tag_strategy(), 1..4)),
        1..8,
    )
}
