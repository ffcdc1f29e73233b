//! Dual-channel agreement state machine.
//!
//! Pure bookkeeping: the poller feeds it samples and clock reads in tick order and
//! acts on the resulting state. No channel I/O and no clock access happen here, so
//! every transition can be exercised with synthetic instants.

use crate::api::types::{ApiJobStatus, StatusSnapshot};
use crate::consts::job::UI_DONE_STATUS;
use crate::error::HarnessError;
use crate::watch::PollSettings;
use log::warn;
use std::time::Duration;
use tokio::time::Instant;

/// Why a watch ended unsuccessfully.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchFailure {
    UiReportedError {
        text: String,
    },
    ApiReportedFailure {
        payload: serde_json::Value,
    },
    DivergenceTimeout {
        last_ui_status: String,
        divergence: Duration,
    },
    OverallTimeout {
        last_ui_status: String,
        last_api_status: String,
        elapsed: Duration,
    },
    ProtocolViolation {
        previous: String,
        observed: String,
    },
    UnconfirmedCompletion {
        ui_status: String,
        api_status: String,
    },
}

impl From<WatchFailure> for HarnessError {
    fn from(failure: WatchFailure) -> Self {
        match failure {
            WatchFailure::UiReportedError { text } => HarnessError::UiReportedError { text },
            WatchFailure::ApiReportedFailure { payload } => {
                HarnessError::ApiReportedFailure { payload }
            }
            WatchFailure::DivergenceTimeout {
                last_ui_status,
                divergence,
            } => HarnessError::DivergenceTimeout {
                last_ui_status,
                divergence,
            },
            WatchFailure::OverallTimeout {
                last_ui_status,
                last_api_status,
                elapsed,
            } => HarnessError::OverallTimeout {
                last_ui_status,
                last_api_status,
                elapsed,
            },
            WatchFailure::ProtocolViolation { previous, observed } => {
                HarnessError::ProtocolViolation { previous, observed }
            }
            WatchFailure::UnconfirmedCompletion {
                ui_status,
                api_status,
            } => HarnessError::UnconfirmedCompletion {
                ui_status,
                api_status,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchState {
    /// Neither channel has reported success yet.
    Polling,
    /// The API reported success; the grace window for the UI runs from `since`.
    AwaitingUi { since: Instant },
    /// The UI reported done. Terminal.
    Succeeded,
    /// Terminal.
    Failed(WatchFailure),
}

impl WatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}

/// Tracks one job's agreement state plus the last values seen on each channel.
#[derive(Debug, Clone)]
pub struct Reconciler {
    settings: PollSettings,
    started_at: Instant,
    state: WatchState,
    last_ui_status: String,
    last_api_status: Option<ApiJobStatus>,
    api_succeeded_at: Option<Instant>,
}

impl Reconciler {
    pub fn new(settings: PollSettings, started_at: Instant) -> Self {
        Self {
            settings,
            started_at,
            state: WatchState::Polling,
            last_ui_status: String::new(),
            last_api_status: None,
            api_succeeded_at: None,
        }
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn last_ui_status(&self) -> &str {
        &self.last_ui_status
    }

    pub fn last_api_status(&self) -> String {
        self.last_api_status
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    /// When the API success was first observed, if it has been.
    pub fn api_succeeded_at(&self) -> Option<Instant> {
        self.api_succeeded_at
    }

    fn fail(&mut self, failure: WatchFailure) -> &WatchState {
        self.state = WatchState::Failed(failure);
        &self.state
    }

    /// The UI shows its error indicator.
    pub fn on_ui_error(&mut self, text: String) -> &WatchState {
        if self.state.is_terminal() {
            return &self.state;
        }
        self.fail(WatchFailure::UiReportedError { text })
    }

    /// The UI status field was read. The done text is the only successful exit.
    pub fn on_ui_status(&mut self, status: &str) -> &WatchState {
        if self.state.is_terminal() {
            return &self.state;
        }
        self.last_ui_status = status.to_string();
        if status == UI_DONE_STATUS {
            self.state = WatchState::Succeeded;
        }
        &self.state
    }

    /// The API status was read at `now`.
    pub fn on_api_status(&mut self, snapshot: StatusSnapshot, now: Instant) -> &WatchState {
        if self.state.is_terminal() {
            return &self.state;
        }
        let observed = snapshot.status.clone();
        self.last_api_status = Some(observed.clone());

        let awaiting_ui = matches!(self.state, WatchState::AwaitingUi { .. });
        match observed {
            ApiJobStatus::Succeeded if awaiting_ui => &self.state,
            // A terminal success may not turn into a failure.
            ApiJobStatus::Failed if awaiting_ui => self.fail(WatchFailure::ProtocolViolation {
                previous: ApiJobStatus::Succeeded.to_string(),
                observed: ApiJobStatus::Failed.to_string(),
            }),
            // A lagging read after success keeps the grace window running.
            other if awaiting_ui => {
                warn!(
                    "API reported {:?} after succeeded; still waiting for the UI",
                    other.as_str()
                );
                &self.state
            }
            ApiJobStatus::Failed => self.fail(WatchFailure::ApiReportedFailure {
                payload: snapshot.payload,
            }),
            ApiJobStatus::Succeeded => {
                self.api_succeeded_at = Some(now);
                self.state = WatchState::AwaitingUi { since: now };
                &self.state
            }
            _ => &self.state,
        }
    }

    /// Deadline bookkeeping at `now`. The grace window is checked first so a
    /// stuck UI is never reported as a plain timeout.
    pub fn on_clock(&mut self, now: Instant) -> &WatchState {
        if let WatchState::AwaitingUi { since } = self.state {
            let divergence = now.saturating_duration_since(since);
            if divergence > self.settings.grace_window {
                return self.fail(WatchFailure::DivergenceTimeout {
                    last_ui_status: self.last_ui_status.clone(),
                    divergence,
                });
            }
        }
        if self.state.is_terminal() {
            return &self.state;
        }

        let elapsed = now.saturating_duration_since(self.started_at);
        if elapsed > self.settings.deadline {
            let last_api_status = self.last_api_status();
            return self.fail(WatchFailure::OverallTimeout {
                last_ui_status: self.last_ui_status.clone(),
                last_api_status,
                elapsed,
            });
        }
        &self.state
    }

    /// Final API read after the UI reported done. The API must agree.
    pub fn confirm(&self, snapshot: &StatusSnapshot) -> Result<(), WatchFailure> {
        match &snapshot.status {
            ApiJobStatus::Succeeded => Ok(()),
            ApiJobStatus::Failed if self.api_succeeded_at.is_some() => {
                Err(WatchFailure::ProtocolViolation {
                    previous: ApiJobStatus::Succeeded.to_string(),
                    observed: ApiJobStatus::Failed.to_string(),
                })
            }
            ApiJobStatus::Failed => Err(WatchFailure::ApiReportedFailure {
                payload: snapshot.payload.clone(),
            }),
            other => Err(WatchFailure::UnconfirmedCompletion {
                ui_status: self.last_ui_status.clone(),
                api_status: other.to_string(),
            }),
        }
    }
}
