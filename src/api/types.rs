use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Job status as reported by `GET /api/v1/jobs/{id}`.
///
/// The backend vocabulary has drifted between `queued` and `pending`; anything
/// unrecognised is kept verbatim and treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiJobStatus {
    Queued,
    Pending,
    Running,
    Succeeded,
    Failed,
    Other(String),
}

impl ApiJobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "queued" => Self::Queued,
            "pending" => Self::Pending,
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Other(s) => s,
        }
    }
}

impl Display for ApiJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One sample of the API channel: the parsed status plus the raw body, which is
/// reported verbatim when the job fails.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub status: ApiJobStatus,
    pub payload: serde_json::Value,
}

impl StatusSnapshot {
    /// A body without a string `status` field is treated as an unknown status.
    pub fn from_payload(payload: serde_json::Value) -> Self {
        let status = payload
            .get("status")
            .and_then(|s| s.as_str())
            .map(ApiJobStatus::parse)
            .unwrap_or_else(|| ApiJobStatus::Other(String::new()));
        Self { status, payload }
    }

    /// Progress message the backend attaches to running jobs, for logging.
    pub fn progress_message(&self) -> Option<&str> {
        self.payload
            .get("progress")
            .and_then(|p| p.get("message"))
            .and_then(|m| m.as_str())
    }
}

/// `GET /api/v1/health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}
