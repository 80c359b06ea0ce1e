//! # System Constants
//!
//! Provider status vocabulary, flow names and tuning defaults shared across
//! the store, provider and recovery modules.

/// Batch status strings reported by OpenAI-compatible batch APIs
pub mod provider_status {
    pub const VALIDATING: &str = "validating";
    pub const IN_PROGRESS: &str = "in_progress";
    pub const FINALIZING: &str = "finalizing";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
    pub const EXPIRED: &str = "expired";
    pub const CANCELLING: &str = "cancelling";
    pub const CANCELLED: &str = "cancelled";
}

/// Built-in flow names
pub mod flows {
    pub const TRANSLATE_NAME_TAGS: &str = "translate_name_tags";
    pub const GENERATE_TAGS: &str = "generate_tags";
}

/// Recovery and provider defaults
pub mod defaults {
    pub const BATCH_LIMIT: i64 = 500;
    pub const STALE_MINUTES: i64 = 15;
    pub const MAX_CONCURRENCY: usize = 1;
    pub const JOB_TIMEOUT_SECONDS: u64 = 300;
    pub const CYCLE_INTERVAL_SECONDS: u64 = 60;

    pub const PROVIDER: &str = "openai";
    pub const PROVIDER_BASE_URL: &str = "https://api.openai.com/v1";
    pub const MODEL: &str = "gpt-4o-mini";
    pub const REQUEST_TIMEOUT_MS: u64 = 60_000;
    pub const CONNECT_TIMEOUT_MS: u64 = 30_000;
    pub const MAX_RATE_LIMIT_RETRIES: u32 = 1;
    /// Spacing between requests for providers with aggressive rate limits
    pub const GROQ_MIN_INTERVAL_MS: u64 = 2_000;
    pub const MIN_INTERVAL_MS: u64 = 500;
    /// Wait after a 429 that carries no usable retry hint
    pub const RATE_LIMIT_FALLBACK_MS: u64 = 2_000;

    pub const TAG_LANGUAGE: &str = "english";
    pub const DATABASE_URL: &str = "postgresql://localhost/tagbatch_development";
    pub const DATABASE_MAX_CONNECTIONS: u32 = 10;
    pub const DATABASE_ACQUIRE_TIMEOUT_SECONDS: u64 = 30;
}
