//! Destination for applied tag rows.
//!
//! Writes are overwrites keyed by asset (and language), so replaying the same
//! output leaves the stored state unchanged.

use crate::error::{BatchError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use tracing::instrument;

#[async_trait]
pub trait AssetTagSink: Send + Sync {
    /// Replace the tags of `asset_id` in `language`
    async fn write_translated_tags(&self, asset_id: i64, language: &str, tags: &[String]) -> Result<()>;

    /// Replace the generated tags and era of `asset_id`
    async fn write_generated_tags(&self, asset_id: i64, tags: &[String], era: Option<&str>) -> Result<()>;
}

/// Postgres-backed sink over `assets` and `asset_translated_tags`
#[derive(Debug, Clone)]
pub struct PgAssetTagSink {
    pool: PgPool,
}

impl PgAssetTagSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetTagSink for PgAssetTagSink {
    #[instrument(skip(self, tags), fields(tag_count = tags.len()))]
    async fn write_translated_tags(&self, asset_id: i64, language: &str, tags: &[String]) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO asset_translated_tags (asset_id, language, tags, updated_at)
            SELECT a.id, $2, $3, NOW()
            FROM assets a
            WHERE a.id = $1
            ON CONFLICT (asset_id, language)
            DO UPDATE SET tags = EXCLUDED.tags, updated_at = NOW()
            "#,
        )
        .bind(asset_id)
        .bind(language)
        .bind(tags)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BatchError::not_found("Asset", asset_id));
        }
        Ok(())
    }

    #[instrument(skip(self, tags), fields(tag_count = tags.len()))]
    async fn write_generated_tags(&self, asset_id: i64, tags: &[String], era: Option<&str>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE assets
            SET tags = $2, era = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(asset_id)
        .bind(tags)
        .bind(era)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BatchError::not_found("Asset", asset_id));
        }
        Ok(())
    }
}

/// Stored state of one asset in [`InMemoryAssetTagSink`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetRecord {
    pub name: String,
    pub tags: Vec<String>,
    pub era: Option<String>,
}

/// Process-local sink. Only assets added with [`insert_asset`](Self::insert_asset)
/// accept writes.
#[derive(Debug, Default)]
pub struct InMemoryAssetTagSink {
    assets: DashMap<i64, AssetRecord>,
    translations: DashMap<(i64, String), Vec<String>>,
}

impl InMemoryAssetTagSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_asset(&self, asset_id: i64, name: impl Into<String>) {
        self.assets.insert(
            asset_id,
            AssetRecord {
                name: name.into(),
                ..AssetRecord::default()
            },
        );
    }

    pub fn asset(&self, asset_id: i64) -> Option<AssetRecord> {
        self.assets.get(&asset_id).map(|entry| entry.value().clone())
    }

    pub fn translated_tags(&self, asset_id: i64, language: &str) -> Option<Vec<String>> {
        self.translations
            .get(&(asset_id, language.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Sorted copy of every asset and translation, for comparing states
    pub fn snapshot(&self) -> (Vec<(i64, AssetRecord)>, Vec<((i64, String), Vec<String>)>) {
        let mut assets: Vec<_> = self
            .assets
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        assets.sort_by_key(|(id, _)| *id);

        let mut translations: Vec<_> = self
            .translations
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        translations.sort_by(|a, b| a.0.cmp(&b.0));

        (assets, translations)
    }
}

#[async_trait]
impl AssetTagSink for InMemoryAssetTagSink {
    async fn write_translated_tags(&self, asset_id: i64, language: &str, tags: &[String]) -> Result<()> {
        if !self.assets.contains_key(&asset_id) {
            return Err(BatchError::not_found("Asset", asset_id));
        }
        self.translations
            .insert((asset_id, language.to_string()), tags.to_vec());
        Ok(())
    }

    async fn write_generated_tags(&self, asset_id: i64, tags: &[String], era: Option<&str>) -> Result<()> {
        let mut asset = self
            .assets
            .get_mut(&asset_id)
            .ok_or_else(|| BatchError::not_found("Asset", asset_id))?;
        asset.tags = tags.to_vec();
        asset.era = era.map(str::to_string);
        Ok(())
    }
}
