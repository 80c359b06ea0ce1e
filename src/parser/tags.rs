//! Tag extraction strategies applied to the generated message content of one row.
//!
//! Strategies run in [`TagStrategy::ORDER`]; the first that yields a non-empty tag
//! list wins.

use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Tags (and optional era) extracted from one output row
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagPayload {
    pub tags: Vec<String>,
    pub era: Option<String>,
}

impl TagPayload {
    pub fn new(tags: Vec<String>, era: Option<String>) -> Self {
        Self { tags, era }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStrategy {
    /// Whole content is a JSON object or array
    DirectJson,
    /// First JSON object or array found inside surrounding prose
    EmbeddedJson,
    /// Line-based scrape of "tags: a, b, c" style answers
    Heuristic,
}

impl TagStrategy {
    pub const ORDER: [TagStrategy; 3] = [
        TagStrategy::DirectJson,
        TagStrategy::EmbeddedJson,
        TagStrategy::Heuristic,
    ];

    pub fn extract(self, content: &str) -> Option<TagPayload> {
        match self {
            TagStrategy::DirectJson => direct_json(content),
            TagStrategy::EmbeddedJson => embedded_json(content),
            TagStrategy::Heuristic => heuristic(content),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TagStrategy::DirectJson => "direct_json",
            TagStrategy::EmbeddedJson => "embedded_json",
            TagStrategy::Heuristic => "heuristic",
        }
    }
}

/// Run every strategy in order, returning the first hit and the strategy that produced it
pub fn extract_tags(content: &str) -> Option<(TagStrategy, TagPayload)> {
    TagStrategy::ORDER
        .iter()
        .find_map(|strategy| strategy.extract(content).map(|payload| (*strategy, payload)))
}

/// Trim, lowercase, drop empties, dedupe keeping the first occurrence
pub fn normalize_tags<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|tag| tag.as_ref().trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

pub fn normalize_era(raw: &str) -> Option<String> {
    let era = raw.trim();
    (!era.is_empty()).then(|| era.to_string())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Interpret a decoded JSON value as a tag payload.
///
/// Accepts an object carrying `tags` (array, or comma-separated string) with an
/// optional `era`, or a bare array of scalars.
fn payload_from_value(value: &Value) -> Option<TagPayload> {
    let payload = match value {
        Value::Object(map) => {
            let tags = match map.get("tags")? {
                Value::Array(items) => normalize_tags(items.iter().filter_map(scalar_to_string)),
                Value::String(joined) => normalize_tags(joined.split(',')),
                _ => return None,
            };
            let era = map
                .get("era")
                .and_then(scalar_to_string)
                .and_then(|era| normalize_era(&era));
            TagPayload::new(tags, era)
        }
        Value::Array(items) => {
            if items.iter().any(|item| item.is_object() || item.is_array()) {
                return None;
            }
            TagPayload::new(normalize_tags(items.iter().filter_map(scalar_to_string)), None)
        }
        _ => return None,
    };

    (!payload.tags.is_empty()).then_some(payload)
}

fn direct_json(content: &str) -> Option<TagPayload> {
    let value: Value = serde_json::from_str(content.trim()).ok()?;
    payload_from_value(&value)
}

fn embedded_json(content: &str) -> Option<TagPayload> {
    content
        .char_indices()
        .filter(|(_, ch)| *ch == '{' || *ch == '[')
        .find_map(|(offset, _)| {
            let mut stream =
                serde_json::Deserializer::from_str(&content[offset..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) => payload_from_value(&value),
                _ => None,
            }
        })
}

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[\s\S]*?```").expect("Valid regex pattern"));

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("Valid regex pattern"));

static TAG_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(tags?|keywords?)\b").expect("Valid regex pattern"));

static ERA_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*\**era\**\s*[:=]\s*(.*)$").expect("Valid regex pattern"));

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+\s*[\).:-]\s*|[-*•]\s*)").expect("Valid regex pattern")
});

static SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;\n]").expect("Valid regex pattern"));

const NO_ERA: [&str; 4] = ["none", "n/a", "unknown", "null"];

fn heuristic(content: &str) -> Option<TagPayload> {
    let without_fences = FENCED_BLOCK.replace_all(content, " ");
    let cleaned = URL.replace_all(&without_fences, "");

    let mut era = None;
    let mut candidates: Vec<String> = Vec::new();
    // A bare "Tags:" label followed by a bulleted list on the next lines
    let mut collecting_list = false;

    for line in cleaned.lines() {
        if let Some(captures) = ERA_LINE.captures(line) {
            collecting_list = false;
            let value = clean_candidate(captures.get(1).map_or("", |m| m.as_str()));
            if !NO_ERA.contains(&value.to_lowercase().as_str()) {
                era = normalize_era(&value);
            }
            continue;
        }

        if TAG_KEYWORD.is_match(line) {
            let listed = line.split_once(':').map_or(line, |(_, rest)| rest);
            collecting_list = listed.trim().is_empty();
            candidates.extend(split_candidates(listed));
        } else if collecting_list && LIST_MARKER.is_match(line) {
            candidates.extend(split_candidates(line));
        } else {
            collecting_list = false;
        }
    }

    let tags = normalize_tags(candidates);
    (!tags.is_empty()).then(|| TagPayload::new(tags, era))
}

fn split_candidates(text: &str) -> impl Iterator<Item = String> + '_ {
    SEPARATOR
        .split(text)
        .map(|piece| clean_candidate(&LIST_MARKER.replace(piece, "")))
}

fn clean_candidate(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '[' | ']' | '{' | '}'))
        .trim_end_matches('.')
        .trim()
        .to_string()
}
