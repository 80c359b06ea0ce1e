//! # Output Parser
//!
//! Turns a newline-delimited batch output artifact into one [`ParsedRow`] per
//! non-empty line. Each line is decoded independently, so parsing the first K
//! lines of a file yields exactly the first K rows of parsing the whole file,
//! and a truncated trailing line only affects itself.

pub mod output;
pub mod tags;

pub use output::decode_line;
pub use tags::{extract_tags, normalize_tags, TagPayload, TagStrategy};

/// One decoded line of batch output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    /// 1-based physical line number in the artifact
    pub line_number: usize,
    /// Row-correlation key echoed back by the provider
    pub custom_id: Option<String>,
    pub outcome: RowOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Tags(TagPayload),
    /// Response decoded but no strategy produced a tag
    NoTags { reason: String },
    /// Provider reported a per-request failure
    ProviderError { message: String },
    /// Line is not a JSON record (malformed or truncated)
    DecodeError { raw: String, reason: String },
}

impl ParsedRow {
    pub fn tags(&self) -> Option<&TagPayload> {
        match &self.outcome {
            RowOutcome::Tags(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn is_decode_error(&self) -> bool {
        matches!(self.outcome, RowOutcome::DecodeError { .. })
    }
}

/// Lazily decode every non-empty line
pub fn parse_lines(content: &str) -> impl Iterator<Item = ParsedRow> + '_ {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| decode_line(index + 1, line))
}

pub fn parse_batch_output(content: &str) -> Vec<ParsedRow> {
    parse_lines(content).collect()
}
