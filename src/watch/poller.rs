use crate::api::JobApi;
use crate::api::types::StatusSnapshot;
use crate::config::ConfigError;
use crate::error::HarnessError;
use crate::ui::{UiSurface, test_ids};
use crate::watch::{Reconciler, WatchState};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::Instant;

/// Timing of one watch. Supplied by the caller; the poller has no defaults of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub deadline: Duration,
    pub interval: Duration,
    pub grace_window: Duration,
}

impl PollSettings {
    pub fn new(
        deadline: Duration,
        interval: Duration,
        grace_window: Duration,
    ) -> Result<Self, ConfigError> {
        if deadline.is_zero() {
            return Err(ConfigError::InvalidSetting {
                name: "deadline_ms",
                reason: "must be positive".to_string(),
            });
        }
        if interval.is_zero() || interval >= deadline {
            return Err(ConfigError::InvalidSetting {
                name: "poll_interval_ms",
                reason: format!(
                    "must be positive and shorter than the deadline ({:?})",
                    deadline
                ),
            });
        }
        if grace_window.is_zero() {
            return Err(ConfigError::InvalidSetting {
                name: "grace_window_ms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(Self {
            deadline,
            interval,
            grace_window,
        })
    }
}

/// Both channels agreed the job succeeded.
#[derive(Debug, Clone)]
pub struct WatchOutcome {
    pub job_id: String,
    pub ui_status: String,
    /// The confirming API read taken after the UI reported done.
    pub api_status: StatusSnapshot,
    pub polls: u32,
    pub elapsed: Duration,
    /// Time from watch start to the first API success, if it was seen during the loop.
    pub api_succeeded_after: Option<Duration>,
}

pub struct DualChannelPoller<'a> {
    ui: &'a dyn UiSurface,
    api: &'a dyn JobApi,
    settings: PollSettings,
}

impl<'a> DualChannelPoller<'a> {
    pub fn new(ui: &'a dyn UiSurface, api: &'a dyn JobApi, settings: PollSettings) -> Self {
        Self { ui, api, settings }
    }

    /// Samples both channels every interval until they agree or one fails.
    pub async fn watch(&self, job_id: &str) -> Result<WatchOutcome, HarnessError> {
        let started_at = Instant::now();
        let mut reconciler = Reconciler::new(self.settings, started_at);
        let mut polls: u32 = 0;

        loop {
            polls += 1;
            self.tick(job_id, &mut reconciler).await?;

            match reconciler.state() {
                WatchState::Succeeded => break,
                WatchState::Failed(failure) => {
                    warn!("[{}] watch failed after {} polls: {:?}", job_id, polls, failure);
                    return Err(failure.clone().into());
                }
                WatchState::Polling | WatchState::AwaitingUi { .. } => {
                    tokio::time::sleep(self.settings.interval).await;
                }
            }
        }

        let confirmation = self.api.job_status(job_id).await?;
        reconciler.confirm(&confirmation)?;

        let elapsed = started_at.elapsed();
        info!(
            "[{}] UI and API agree on success after {} polls ({:?})",
            job_id, polls, elapsed
        );
        Ok(WatchOutcome {
            job_id: job_id.to_string(),
            ui_status: reconciler.last_ui_status().to_string(),
            api_status: confirmation,
            polls,
            elapsed,
            api_succeeded_after: reconciler
                .api_succeeded_at()
                .map(|at| at.saturating_duration_since(started_at)),
        })
    }

    /// One iteration: UI error, UI status, API status, then the clocks.
    async fn tick(&self, job_id: &str, reconciler: &mut Reconciler) -> Result<(), HarnessError> {
        // A failed visibility probe counts as "no error shown"; the status read below still fails loudly.
        if self.ui.is_visible(test_ids::ERROR).await.unwrap_or(false) {
            let text = self
                .ui
                .text(test_ids::ERROR)
                .await?
                .unwrap_or_else(|| "unknown".to_string());
            reconciler.on_ui_error(text);
            return Ok(());
        }

        let ui_status = self.ui.text(test_ids::STATUS).await?.unwrap_or_default();
        if reconciler.on_ui_status(&ui_status).is_terminal() {
            return Ok(());
        }

        let snapshot = self.api.job_status(job_id).await?;
        debug!(
            "[{}] UI {:?} | API {} {}",
            job_id,
            ui_status,
            snapshot.status,
            snapshot.progress_message().unwrap_or_default()
        );
        let was_awaiting = matches!(reconciler.state(), WatchState::AwaitingUi { .. });
        let state = reconciler.on_api_status(snapshot, Instant::now());
        if !was_awaiting && matches!(state, WatchState::AwaitingUi { .. }) {
            info!(
                "[{}] API reports succeeded; UI has {:?} to follow (UI status {:?})",
                job_id, self.settings.grace_window, ui_status
            );
        }
        if state.is_terminal() {
            return Ok(());
        }

        reconciler.on_clock(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockJobApi;
    use crate::api::error::ApiError;
    use crate::ui::fake::ScriptedUi;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn settings(deadline_secs: u64, interval_secs: u64, grace_secs: u64) -> PollSettings {
        PollSettings::new(
            Duration::from_secs(deadline_secs),
            Duration::from_secs(interval_secs),
            Duration::from_secs(grace_secs),
        )
        .unwrap()
    }

    /// Mock API replaying `statuses` in order; the last one repeats.
    fn scripted_api(statuses: &[&str]) -> (MockJobApi, Arc<Mutex<usize>>) {
        let calls = Arc::new(Mutex::new(0usize));
        let statuses: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        let mut mock = MockJobApi::new();
        let counter = calls.clone();
        mock.expect_job_status().returning(move |job_id| {
            let mut n = counter.lock().unwrap();
            let status = statuses[(*n).min(statuses.len() - 1)].clone();
            *n += 1;
            let error = if status == "failed" {
                json!("RuntimeError: colabfold exited 1")
            } else {
                json!(null)
            };
            Ok(StatusSnapshot::from_payload(json!({
                "job_id": job_id,
                "status": status,
                "error": error,
            })))
        });
        mock.expect_job_result().never();
        (mock, calls)
    }

    #[tokio::test(start_paused = true)]
    // API pending/running/succeeded with the UI following inside the grace window succeeds.
    async fn test_watch_succeeds_when_channels_agree() {
        let ui = ScriptedUi::with_statuses(&["Submitting...", "Running...", "Running...", "Running...", "Done."]);
        let (api, _) = scripted_api(&["pending", "running", "succeeded"]);
        let poller = DualChannelPoller::new(&ui, &api, settings(600, 5, 30));

        let outcome = poller.watch("job_1").await.unwrap();
        assert_eq!(outcome.ui_status, "Done.");
        assert_eq!(outcome.polls, 5);
        assert_eq!(outcome.api_succeeded_after, Some(Duration::from_secs(10)));
        assert_eq!(outcome.api_status.payload["status"], "succeeded");
    }

    #[tokio::test(start_paused = true)]
    // An API stuck in running ends in OverallTimeout, not a hang.
    async fn test_watch_overall_timeout() {
        let ui = ScriptedUi::with_statuses(&["Running..."]);
        let (api, _) = scripted_api(&["pending", "running"]);
        let poller = DualChannelPoller::new(&ui, &api, settings(60, 5, 30));

        let err = poller.watch("job_1").await.unwrap_err();
        match err {
            HarnessError::OverallTimeout {
                last_ui_status,
                last_api_status,
                elapsed,
            } => {
                assert_eq!(last_ui_status, "Running...");
                assert_eq!(last_api_status, "running");
                assert!(elapsed > Duration::from_secs(60));
                assert!(elapsed <= Duration::from_secs(65));
            }
            other => panic!("expected OverallTimeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    // A stuck UI after API success fails with DivergenceTimeout well before the deadline.
    async fn test_watch_divergence_timeout() {
        let ui = ScriptedUi::with_statuses(&["Running...", "Collecting results"]);
        let (api, _) = scripted_api(&["running", "succeeded"]);
        let poller = DualChannelPoller::new(&ui, &api, settings(2_400, 5, 30));

        let start = Instant::now();
        let err = poller.watch("job_1").await.unwrap_err();
        match err {
            HarnessError::DivergenceTimeout {
                last_ui_status,
                divergence,
            } => {
                assert_eq!(last_ui_status, "Collecting results");
                assert!(divergence > Duration::from_secs(30));
            }
            other => panic!("expected DivergenceTimeout, got {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    // API failure ends the watch on the tick it is observed, whatever the UI says.
    async fn test_watch_api_failure() {
        let ui = ScriptedUi::with_statuses(&["Running..."]);
        let (api, calls) = scripted_api(&["running", "running", "failed"]);
        let poller = DualChannelPoller::new(&ui, &api, settings(600, 5, 30));

        let start = Instant::now();
        let err = poller.watch("job_1").await.unwrap_err();
        match err {
            HarnessError::ApiReportedFailure { payload } => {
                assert_eq!(payload["status"], "failed");
                assert_eq!(payload["error"], "RuntimeError: colabfold exited 1");
            }
            other => panic!("expected ApiReportedFailure, got {:?}", other),
        }
        assert_eq!(*calls.lock().unwrap(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    // The UI error indicator wins immediately and the API is never asked.
    async fn test_watch_ui_error() {
        let ui = ScriptedUi::with_statuses(&["Running..."]).error_after(0, "UniProt fetch failed: 404");
        let (api, calls) = scripted_api(&["running"]);
        let poller = DualChannelPoller::new(&ui, &api, settings(600, 5, 30));

        let err = poller.watch("job_1").await.unwrap_err();
        assert!(matches!(err, HarnessError::UiReportedError { ref text } if text == "UniProt fetch failed: 404"));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    // succeeded then failed on the API is reported as a protocol violation.
    async fn test_watch_terminal_flip() {
        let ui = ScriptedUi::with_statuses(&["Running..."]);
        let (api, _) = scripted_api(&["succeeded", "failed"]);
        let poller = DualChannelPoller::new(&ui, &api, settings(600, 5, 30));

        let err = poller.watch("job_1").await.unwrap_err();
        assert_eq!(err.kind(), "protocol_violation");
    }

    #[tokio::test(start_paused = true)]
    // A stale running read between two succeeded reads does not end the watch.
    async fn test_watch_tolerates_lagging_api_read() {
        let ui = ScriptedUi::with_statuses(&["Running...", "Running...", "Done."]);
        let (api, calls) = scripted_api(&["succeeded", "running", "succeeded"]);
        let poller = DualChannelPoller::new(&ui, &api, settings(600, 5, 30));

        let outcome = poller.watch("job_1").await.unwrap();
        assert_eq!(outcome.ui_status, "Done.");
        assert_eq!(outcome.polls, 3);
        assert_eq!(outcome.api_succeeded_after, Some(Duration::ZERO));
        assert_eq!(outcome.api_status.payload["status"], "succeeded");
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    // UI done while the API still runs is not a success.
    async fn test_watch_unconfirmed_completion() {
        let ui = ScriptedUi::with_statuses(&["Done."]);
        let (api, _) = scripted_api(&["running"]);
        let poller = DualChannelPoller::new(&ui, &api, settings(600, 5, 30));

        let err = poller.watch("job_1").await.unwrap_err();
        assert!(matches!(err, HarnessError::UnconfirmedCompletion { ref api_status, .. } if api_status == "running"));
    }

    #[tokio::test(start_paused = true)]
    // Transport errors on the API are not retried silently.
    async fn test_watch_api_transport_error() {
        let ui = ScriptedUi::with_statuses(&["Running..."]);
        let mut api = MockJobApi::new();
        api.expect_job_status().times(1).returning(|_| {
            Err(ApiError::Http {
                status: 503,
                url: "http://127.0.0.1:5090/api/v1/jobs/job_1".to_string(),
                message: "Service Unavailable".to_string(),
            })
        });
        let poller = DualChannelPoller::new(&ui, &api, settings(600, 5, 30));

        let err = poller.watch("job_1").await.unwrap_err();
        assert!(matches!(err, HarnessError::Api(ApiError::Http { status: 503, .. })));
    }

    #[test]
    // Settings are validated at construction.
    fn test_poll_settings_new() {
        let ms = Duration::from_millis;
        assert!(PollSettings::new(ms(0), ms(10), ms(10)).is_err());
        assert!(PollSettings::new(ms(100), ms(0), ms(10)).is_err());
        assert!(PollSettings::new(ms(100), ms(100), ms(10)).is_err());
        assert!(PollSettings::new(ms(100), ms(10), ms(0)).is_err());
        assert!(PollSettings::new(ms(100), ms(10), ms(1_000)).is_ok());
    }
}
