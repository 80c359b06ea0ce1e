//! # Flow Applier
//!
//! Dispatches parsed output rows to the flow that owns them. A flow decides how a
//! row-correlation key maps to a local entity and what side effect a row has.
//!
//! Row-level problems (undecodable line, unknown target, no tags, a write the
//! sink rejects as missing or invalid) are counted in [`ApplyStats::rows_error`].
//! Any other write error, such as a lost database connection, aborts the call.
//! An unregistered flow fails the whole call before anything is parsed or written.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tagbatch_core::applier::{ApplySettings, FlowApplier, InMemoryAssetTagSink};
//!
//! # async fn example(content: &str) -> tagbatch_core::error::Result<()> {
//! let sink = Arc::new(InMemoryAssetTagSink::new());
//! let applier = FlowApplier::with_default_flows(sink);
//! let stats = applier
//!     .apply("generate_tags", content, &ApplySettings::default(), 17)
//!     .await?;
//! println!("{} applied, {} failed", stats.rows_done, stats.rows_error);
//! # Ok(())
//! # }
//! ```

pub mod flows;
pub mod sink;

pub use flows::{parse_correlation_key, GenerateTagsFlow, TranslateNameTagsFlow};
pub use sink::{AssetRecord, AssetTagSink, InMemoryAssetTagSink, PgAssetTagSink};

use crate::constants::defaults;
use crate::error::{BatchError, Result};
use crate::parser::{parse_lines, ParsedRow, RowOutcome, TagPayload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read-only settings passed through to every row write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplySettings {
    /// Target language for `translate_name_tags`
    pub tag_language: String,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            tag_language: defaults::TAG_LANGUAGE.to_string(),
        }
    }
}

/// Outcome counts of one `apply` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyStats {
    pub rows_done: i64,
    pub rows_error: i64,
    /// Subset of `rows_error` whose line was not valid JSON
    pub decode_errors: i64,
}

#[async_trait]
pub trait FlowHandler: Send + Sync {
    fn flow(&self) -> &str;

    /// Map a row-correlation key to the local entity id
    fn resolve_target(&self, correlation_key: &str) -> Option<i64>;

    /// Write one row. Must overwrite, so a replay is a no-op.
    async fn apply_row(&self, target: i64, payload: &TagPayload, settings: &ApplySettings) -> Result<()>;
}

/// Registry of flows keyed by name
#[derive(Default, Clone)]
pub struct FlowApplier {
    handlers: HashMap<String, Arc<dyn FlowHandler>>,
}

impl std::fmt::Debug for FlowApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowApplier")
            .field("flows", &self.flows())
            .finish()
    }
}

impl FlowApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `translate_name_tags` and `generate_tags` writing to `sink`
    pub fn with_default_flows(sink: Arc<dyn AssetTagSink>) -> Self {
        let mut applier = Self::new();
        applier.register(Arc::new(TranslateNameTagsFlow::new(sink.clone())));
        applier.register(Arc::new(GenerateTagsFlow::new(sink)));
        applier
    }

    /// Register a flow, replacing any existing handler of the same name
    pub fn register(&mut self, handler: Arc<dyn FlowHandler>) {
        self.handlers.insert(handler.flow().to_string(), handler);
    }

    pub fn is_registered(&self, flow: &str) -> bool {
        self.handlers.contains_key(flow)
    }

    pub fn flows(&self) -> Vec<String> {
        let mut flows: Vec<String> = self.handlers.keys().cloned().collect();
        flows.sort();
        flows
    }

    /// Apply every row of `content` through `flow`
    pub async fn apply(
        &self,
        flow: &str,
        content: &str,
        settings: &ApplySettings,
        task_id: i64,
    ) -> Result<ApplyStats> {
        let handler = self
            .handlers
            .get(flow)
            .ok_or_else(|| BatchError::UnknownFlow(flow.to_string()))?;

        let mut stats = ApplyStats::default();
        for row in parse_lines(content) {
            match apply_row(handler.as_ref(), &row, settings).await? {
                RowResult::Applied => stats.rows_done += 1,
                RowResult::Rejected(reason) => {
                    stats.rows_error += 1;
                    if row.is_decode_error() {
                        stats.decode_errors += 1;
                    }
                    debug!(
                        flow = %flow,
                        task_id = task_id,
                        line = row.line_number,
                        custom_id = ?row.custom_id,
                        reason = %reason,
                        "Row not applied"
                    );
                }
            }
        }

        if stats.rows_error > 0 {
            warn!(
                flow = %flow,
                task_id = task_id,
                rows_done = stats.rows_done,
                rows_error = stats.rows_error,
                decode_errors = stats.decode_errors,
                "Batch output applied with row errors"
            );
        } else {
            info!(
                flow = %flow,
                task_id = task_id,
                rows_done = stats.rows_done,
                "Batch output applied"
            );
        }

        Ok(stats)
    }
}

enum RowResult {
    Applied,
    Rejected(String),
}

/// Apply one row. Data problems reject the row; any other write failure is returned.
async fn apply_row(
    handler: &dyn FlowHandler,
    row: &ParsedRow,
    settings: &ApplySettings,
) -> Result<RowResult> {
    let payload = match &row.outcome {
        RowOutcome::Tags(payload) => payload,
        RowOutcome::NoTags { reason } => return Ok(RowResult::Rejected(reason.clone())),
        RowOutcome::ProviderError { message } => {
            return Ok(RowResult::Rejected(format!("provider error: {message}")))
        }
        RowOutcome::DecodeError { reason, .. } => {
            return Ok(RowResult::Rejected(format!("decode error: {reason}")))
        }
    };

    let Some(key) = row.custom_id.as_deref() else {
        return Ok(RowResult::Rejected("row has no correlation key".to_string()));
    };

    let Some(target) = handler.resolve_target(key) else {
        let err = BatchError::EntityNotFound {
            flow: handler.flow().to_string(),
            key: key.to_string(),
        };
        return Ok(RowResult::Rejected(err.to_string()));
    };

    match handler.apply_row(target, payload, settings).await {
        Ok(()) => Ok(RowResult::Applied),
        Err(e) if e.is_row_error() => Ok(RowResult::Rejected(e.to_string())),
        Err(e) => {
            warn!(
                flow = %handler.flow(),
                line = row.line_number,
                error = %e,
                "Row write failed; aborting application"
            );
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn line(custom_id: &str, content: &str) -> String {
        json!({
            "custom_id": custom_id,
            "response": {"status_code": 200,
                         "body": {"choices": [{"message": {"content": content}}]}},
            "error": null
        })
        .to_string()
    }

    fn applier_with_assets(ids: &[i64]) -> (FlowApplier, Arc<InMemoryAssetTagSink>) {
        let sink = Arc::new(InMemoryAssetTagSink::new());
        for id in ids {
            sink.insert_asset(*id, format!("asset-{id}"));
        }
        (FlowApplier::with_default_flows(sink.clone()), sink)
    }

    #[tokio::test]
    async fn test_unknown_flow_fails_fast() {
        let (applier, sink) = applier_with_assets(&[1]);
        let content = line("tags:1", r#"{"tags":["ship"]}"#);

        let err = applier
            .apply("summarize", &content, &ApplySettings::default(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::UnknownFlow(ref flow) if flow == "summarize"));
        assert!(sink.asset(1).unwrap().tags.is_empty());
    }

    #[tokio::test]
    async fn test_row_errors_are_counted_not_raised() {
        let (applier, sink) = applier_with_assets(&[1, 2]);
        let content = [
            line("tags:1", r#"{"tags":["Ship","ship","Boat"],"era":"medieval"}"#),
            line("tags:2", "I have no idea."),
            line("tags:3", r#"{"tags":["orphan"]}"#),
            line("translate:2", r#"{"tags":["wrong flow"]}"#),
            "{\"custom_id\":\"tags:2\",\"resp".to_string(),
        ]
        .join("\n");

        let stats = applier
            .apply("generate_tags", &content, &ApplySettings::default(), 5)
            .await
            .unwrap();

        assert_eq!(stats.rows_done, 1);
        assert_eq!(stats.rows_error, 4);
        assert_eq!(stats.decode_errors, 1);
        assert_eq!(sink.asset(1).unwrap().tags, vec!["ship", "boat"]);
        assert!(sink.asset(2).unwrap().tags.is_empty());
    }

    #[tokio::test]
    async fn test_translate_flow_uses_language_setting() {
        let (applier, sink) = applier_with_assets(&[4]);
        let content = line("translate:4", r#"["Schiff","Boot"]"#);
        let settings = ApplySettings {
            tag_language: "german".to_string(),
        };

        let stats = applier
            .apply("translate_name_tags", &content, &settings, 5)
            .await
            .unwrap();

        assert_eq!(stats.rows_done, 1);
        assert_eq!(
            sink.translated_tags(4, "german"),
            Some(vec!["schiff".to_string(), "boot".to_string()])
        );
    }

    #[tokio::test]
    async fn test_apply_twice_is_idempotent() {
        let (applier, sink) = applier_with_assets(&[1]);
        let content = line("tags:1", r#"{"tags":["ship"],"era":"modern"}"#);

        applier
            .apply("generate_tags", &content, &ApplySettings::default(), 1)
            .await
            .unwrap();
        let first = sink.snapshot();
        applier
            .apply("generate_tags", &content, &ApplySettings::default(), 1)
            .await
            .unwrap();

        assert_eq!(sink.snapshot(), first);
    }

    struct UnavailableSink;

    #[async_trait]
    impl AssetTagSink for UnavailableSink {
        async fn write_translated_tags(&self, _: i64, _: &str, _: &[String]) -> Result<()> {
            Err(BatchError::DatabaseError("pool timed out".to_string()))
        }

        async fn write_generated_tags(&self, _: i64, _: &[String], _: Option<&str>) -> Result<()> {
            Err(BatchError::DatabaseError("pool timed out".to_string()))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_application() {
        let applier = FlowApplier::with_default_flows(Arc::new(UnavailableSink));
        let content = [
            line("tags:1", "I have no idea."),
            line("tags:2", r#"{"tags":["ship"]}"#),
        ]
        .join("\n");

        let err = applier
            .apply("generate_tags", &content, &ApplySettings::default(), 2)
            .await
            .unwrap_err();

        assert!(matches!(err, BatchError::DatabaseError(ref msg) if msg == "pool timed out"));
        assert!(!err.is_row_error());
    }

    #[test]
    fn test_registry_lists_default_flows() {
        let (applier, _) = applier_with_assets(&[]);
        assert_eq!(applier.flows(), vec!["generate_tags", "translate_name_tags"]);
        assert!(applier.is_registered("generate_tags"));
        assert!(!applier.is_registered("summarize"));
    }
}
