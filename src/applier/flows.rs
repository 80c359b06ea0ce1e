//! Concrete flows. Each flow owns its row-correlation key scheme.

use super::sink::AssetTagSink;
use super::{ApplySettings, FlowHandler};
use crate::constants::flows;
use crate::error::Result;
use crate::parser::TagPayload;
use async_trait::async_trait;
use std::sync::Arc;

/// Parse `"{prefix}:{id}"`, or a bare integer id
pub fn parse_correlation_key(key: &str, prefix: &str) -> Option<i64> {
    let key = key.trim();
    let id = match key.split_once(':') {
        Some((found, id)) if found == prefix => id,
        Some(_) => return None,
        None => key,
    };
    id.trim().parse().ok()
}

/// Writes translated name tags for `settings.tag_language`. Key: `translate:{asset_id}`.
pub struct TranslateNameTagsFlow {
    sink: Arc<dyn AssetTagSink>,
}

impl TranslateNameTagsFlow {
    pub const KEY_PREFIX: &'static str = "translate";

    pub fn new(sink: Arc<dyn AssetTagSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl FlowHandler for TranslateNameTagsFlow {
    fn flow(&self) -> &str {
        flows::TRANSLATE_NAME_TAGS
    }

    fn resolve_target(&self, correlation_key: &str) -> Option<i64> {
        parse_correlation_key(correlation_key, Self::KEY_PREFIX)
    }

    async fn apply_row(&self, target: i64, payload: &TagPayload, settings: &ApplySettings) -> Result<()> {
        self.sink
            .write_translated_tags(target, &settings.tag_language, &payload.tags)
            .await
    }
}

/// Writes generated tags and era onto the asset. Key: `tags:{asset_id}`.
pub struct GenerateTagsFlow {
    sink: Arc<dyn AssetTagSink>,
}

impl GenerateTagsFlow {
    pub const KEY_PREFIX: &'static str = "tags";

    pub fn new(sink: Arc<dyn AssetTagSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl FlowHandler for GenerateTagsFlow {
    fn flow(&self) -> &str {
        flows::GENERATE_TAGS
    }

    fn resolve_target(&self, correlation_key: &str) -> Option<i64> {
        parse_correlation_key(correlation_key, Self::KEY_PREFIX)
    }

    async fn apply_row(&self, target: i64, payload: &TagPayload, _settings: &ApplySettings) -> Result<()> {
        self.sink
            .write_generated_tags(target, &payload.tags, payload.era.as_deref())
            .await
    }
}
