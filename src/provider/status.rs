//! Provider status vocabulary and its mapping onto [`BatchState`].

use super::ProviderBatch;
use crate::constants::provider_status;
use crate::state_machine::BatchState;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    Expired,
    Cancelling,
    Cancelled,
    Unknown(String),
}

impl ProviderStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            provider_status::VALIDATING => Self::Validating,
            provider_status::IN_PROGRESS => Self::InProgress,
            provider_status::FINALIZING => Self::Finalizing,
            provider_status::COMPLETED => Self::Completed,
            provider_status::FAILED => Self::Failed,
            provider_status::EXPIRED => Self::Expired,
            provider_status::CANCELLING => Self::Cancelling,
            provider_status::CANCELLED => Self::Cancelled,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    /// Local state this status corresponds to; `None` for unrecognised values
    pub fn local_state(&self) -> Option<BatchState> {
        match self {
            Self::Validating => Some(BatchState::Submitted),
            Self::InProgress | Self::Finalizing | Self::Cancelling => Some(BatchState::InProgress),
            Self::Completed => Some(BatchState::Completed),
            Self::Failed | Self::Cancelled => Some(BatchState::Failed),
            Self::Expired => Some(BatchState::Expired),
            Self::Unknown(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Validating => provider_status::VALIDATING,
            Self::InProgress => provider_status::IN_PROGRESS,
            Self::Finalizing => provider_status::FINALIZING,
            Self::Completed => provider_status::COMPLETED,
            Self::Failed => provider_status::FAILED,
            Self::Expired => provider_status::EXPIRED,
            Self::Cancelling => provider_status::CANCELLING,
            Self::Cancelled => provider_status::CANCELLED,
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the recovery cycle should do with a job given the provider's answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusResolution {
    /// Still running on the provider; try again later
    Pending(BatchState),
    /// Output is ready to fetch
    Ready { output_file_id: String },
    /// Provider gave up on the job; `state` is failed or expired
    Terminal { state: BatchState, reason: String },
    /// Status could not be interpreted; leave the job non-terminal
    Transient { reason: String },
}

pub fn resolve_status(batch: &ProviderBatch) -> StatusResolution {
    let status = ProviderStatus::parse(&batch.status);
    let detail = || {
        batch
            .error_summary()
            .map(|summary| format!("provider status {status}: {summary}"))
            .unwrap_or_else(|| format!("provider status {status}"))
    };

    match status.local_state() {
        Some(BatchState::Completed) => match batch.output_file_id.as_deref() {
            Some(file_id) if !file_id.is_empty() => StatusResolution::Ready {
                output_file_id: file_id.to_string(),
            },
            _ => StatusResolution::Terminal {
                state: BatchState::Failed,
                reason: "provider reported completed without an output file".to_string(),
            },
        },
        Some(state @ (BatchState::Failed | BatchState::Expired)) => StatusResolution::Terminal {
            state,
            reason: detail(),
        },
        Some(state) => StatusResolution::Pending(state),
        None => StatusResolution::Transient {
            reason: format!("unrecognised provider status: {}", batch.status),
        },
    }
}
