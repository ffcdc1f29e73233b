//! Failure taxonomy of a verification run.
//!
//! Every variant is fatal for the run and is reported to the caller as-is.

use crate::api::error::ApiError;
use crate::config::ConfigError;
use crate::ui::UiError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// The job id was never obtained or is malformed.
    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("UI returned error: {text}")]
    UiReportedError { text: String },

    /// Carries the full status body of the failed job.
    #[error("Backend job failed: {payload}")]
    ApiReportedFailure { payload: serde_json::Value },

    #[error(
        "Backend succeeded but UI did not reach done within {divergence:?}. Last UI status: {last_ui_status:?}"
    )]
    DivergenceTimeout {
        last_ui_status: String,
        divergence: Duration,
    },

    #[error(
        "Timed out after {elapsed:?} waiting for completion. Last UI status: {last_ui_status:?}, last API status: {last_api_status:?}"
    )]
    OverallTimeout {
        last_ui_status: String,
        last_api_status: String,
        elapsed: Duration,
    },

    #[error("Result invariant {invariant} violated: {detail}")]
    ResultValidation { invariant: String, detail: String },

    /// A channel left a terminal state it had already reported.
    #[error("Terminal state changed from {previous} to {observed}")]
    ProtocolViolation { previous: String, observed: String },

    /// The UI reported done but the API does not agree.
    #[error("UI reported done but API status is {api_status:?} (UI status {ui_status:?})")]
    UnconfirmedCompletion {
        ui_status: String,
        api_status: String,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Ui(#[from] UiError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HarnessError {
    pub fn result_validation(invariant: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ResultValidation {
            invariant: invariant.into(),
            detail: detail.into(),
        }
    }

    /// Stable machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Submission(_) => "submission_error",
            Self::UiReportedError { .. } => "ui_error",
            Self::ApiReportedFailure { .. } => "api_failed",
            Self::DivergenceTimeout { .. } => "divergence_timeout",
            Self::OverallTimeout { .. } => "timeout",
            Self::ResultValidation { .. } => "result_validation_error",
            Self::ProtocolViolation { .. } => "protocol_violation",
            Self::UnconfirmedCompletion { .. } => "unconfirmed_completion",
            Self::Api(_) => "api_transport_error",
            Self::Ui(_) => "ui_transport_error",
            Self::Config(_) => "config_error",
        }
    }
}
