use serde::{Deserialize, Serialize};
use std::fmt;

/// Local view of a provider batch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Recorded locally, provider still validating the input
    Submitted,
    /// Provider is running or finalizing the batch
    InProgress,
    /// Provider finished; output artifact known but not yet applied
    Completed,
    /// Results applied and recorded in the ledger
    Applied,
    /// Provider failed or cancelled the batch, or it can never be applied
    Failed,
    /// Provider discarded the batch before it was recovered
    Expired,
}

impl BatchState {
    pub const ALL: [BatchState; 6] = [
        Self::Submitted,
        Self::InProgress,
        Self::Completed,
        Self::Applied,
        Self::Failed,
        Self::Expired,
    ];

    /// States a recovery cycle still has work to do for
    pub const NON_TERMINAL: [BatchState; 3] = [Self::Submitted, Self::InProgress, Self::Completed];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Applied | Self::Failed | Self::Expired)
    }

    /// Terminal success
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(Self::Submitted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "applied" => Ok(Self::Applied),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid batch state: {s}")),
        }
    }
}

/// Default state for newly recorded jobs
impl Default for BatchState {
    fn default() -> Self {
        Self::Submitted
    }
}
