//! Verification runs
//!
//! Wires submission, the dual-channel watch and result validation into the runs the
//! CLI exposes, and turns their outcome into a [`Verdict`].

use crate::api::JobApi;
use crate::api::types::{ApiJobStatus, HealthResponse};
use crate::config::{ConfigError, HarnessConfig};
use crate::consts::polling;
use crate::error::HarnessError;
use crate::submission::{SubmissionRequest, submit_job, validate_job_id};
use crate::ui::{UiSurface, test_ids, wait_until_visible};
use crate::validate::{
    ResultValidator, ScoringPolicy, UiResultFields, VerifiedResult, check_artifact_link,
    check_ui_fields,
};
use crate::watch::{DualChannelPoller, PollSettings};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::time::Duration;

/// Everything a run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub poll: PollSettings,
    /// Bounded wait for UI elements outside the poll loop.
    pub ui_wait: Duration,
    pub ui_step: Duration,
    pub policy: ScoringPolicy,
    /// Exact primary score text the UI must show, when the backend is deterministic.
    pub expected_display: Option<String>,
}

impl RunSettings {
    pub fn from_config(config: &HarnessConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            poll: config.poll_settings()?,
            ui_wait: config.ui_wait(),
            ui_step: Duration::from_millis(polling::UI_WAIT_STEP_MS),
            policy: config.scoring.clone(),
            expected_display: config.environment()?.expected_primary_display(),
        })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ArtifactCheck {
    pub url: String,
    pub size_bytes: u64,
}

/// What a successful run established.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RunReport {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polls: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    /// Time from watch start to the first API success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_succeeded_after_ms: Option<u64>,
    pub result: VerifiedResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactCheck>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub kind: &'static str,
    pub message: String,
    /// Pretty-printed error body when the API answered with one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&HarnessError> for FailureReport {
    fn from(err: &HarnessError) -> Self {
        let details = match err {
            HarnessError::Api(api) => api.to_pretty(),
            HarnessError::ApiReportedFailure { payload } => {
                serde_json::to_string_pretty(payload).ok()
            }
            _ => None,
        };
        Self {
            kind: err.kind(),
            message: err.to_string(),
            details,
        }
    }
}

/// Final pass/fail of one run.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Verdict {
    pub command: String,
    pub passed: bool,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
}

impl Verdict {
    pub fn from_result(
        command: &str,
        job_id: Option<String>,
        result: &Result<RunReport, HarnessError>,
    ) -> Self {
        match result {
            Ok(report) => Self {
                command: command.to_string(),
                passed: true,
                checked_at: Utc::now(),
                job_id: Some(report.job_id.clone()),
                report: Some(report.clone()),
                failure: None,
            },
            Err(err) => Self {
                command: command.to_string(),
                passed: false,
                checked_at: Utc::now(),
                job_id,
                report: None,
                failure: Some(FailureReport::from(err)),
            },
        }
    }
}

/// Health check of the job API before anything is submitted.
pub async fn preflight(api: &dyn JobApi) -> Result<HealthResponse, HarnessError> {
    let health = api.health().await?;
    if health.status == "ok" {
        info!(
            "Job API {} is up (version {})",
            api.api_base(),
            health.version.as_deref().unwrap_or("unknown")
        );
    } else {
        warn!("Job API {} reports status {:?}", api.api_base(), health.status);
    }
    Ok(health)
}

/// Submits through the UI, then watches and validates the new job. Once a job id
/// exists it is carried in the verdict whether or not the run passes.
pub async fn verify(
    ui: &dyn UiSurface,
    api: &dyn JobApi,
    request: &SubmissionRequest,
    settings: &RunSettings,
) -> Verdict {
    let job_id = match submit(ui, api, request, settings).await {
        Ok(job_id) => job_id,
        Err(err) => return Verdict::from_result("verify", None, &Err(err)),
    };
    info!("[{}] submitted through the UI", job_id);
    let result = watch_and_validate(ui, api, &job_id, settings).await;
    Verdict::from_result("verify", Some(job_id), &result)
}

async fn submit(
    ui: &dyn UiSurface,
    api: &dyn JobApi,
    request: &SubmissionRequest,
    settings: &RunSettings,
) -> Result<String, HarnessError> {
    preflight(api).await?;
    submit_job(ui, request, settings.ui_wait, settings.ui_step).await
}

/// Watches a job the UI is already showing, then validates its result.
pub async fn watch_and_validate(
    ui: &dyn UiSurface,
    api: &dyn JobApi,
    job_id: &str,
    settings: &RunSettings,
) -> Result<RunReport, HarnessError> {
    let job_id = validate_job_id(job_id)?;
    let outcome = DualChannelPoller::new(ui, api, settings.poll)
        .watch(&job_id)
        .await?;
    info!(
        "[{}] watch finished: UI {:?}, API {}",
        outcome.job_id, outcome.ui_status, outcome.api_status.status
    );

    let validator = ResultValidator::new(api, settings.policy.clone());
    let result = validator.validate(&job_id).await?;

    let fields = read_result_panel(ui, settings).await?;
    check_ui_fields(&fields, &settings.policy, settings.expected_display.as_deref())?;
    let artifact = check_artifact(api, &fields.artifact_links).await?;

    Ok(RunReport {
        job_id,
        polls: Some(outcome.polls),
        elapsed_ms: Some(outcome.elapsed.as_millis() as u64),
        api_succeeded_after_ms: outcome.api_succeeded_after.map(|d| d.as_millis() as u64),
        result,
        artifact: Some(artifact),
    })
}

/// API-only check of a finished job, optionally re-fetching the result to probe idempotence.
pub async fn check_result(
    api: &dyn JobApi,
    job_id: &str,
    policy: &ScoringPolicy,
    repeat: usize,
) -> Result<RunReport, HarnessError> {
    let job_id = validate_job_id(job_id)?;
    let snapshot = api.job_status(&job_id).await?;
    match snapshot.status {
        ApiJobStatus::Succeeded => {}
        ApiJobStatus::Failed => {
            return Err(HarnessError::ApiReportedFailure {
                payload: snapshot.payload,
            });
        }
        other => {
            return Err(HarnessError::result_validation(
                "status",
                format!("job is {}, not succeeded", other),
            ));
        }
    }

    let result = ResultValidator::new(api, policy.clone())
        .validate_repeated(&job_id, repeat)
        .await?;
    if repeat > 1 {
        info!("[{}] {} result fetches returned the same document", job_id, repeat);
    }
    Ok(RunReport {
        job_id,
        polls: None,
        elapsed_ms: None,
        api_succeeded_after_ms: None,
        result,
        artifact: None,
    })
}

async fn read_result_panel(
    ui: &dyn UiSurface,
    settings: &RunSettings,
) -> Result<UiResultFields, HarnessError> {
    if !wait_until_visible(ui, test_ids::PRIMARY_SCORE, settings.ui_wait, settings.ui_step).await? {
        return Err(HarnessError::result_validation(
            "ui.primary_score",
            format!("result panel not shown within {:?}", settings.ui_wait),
        ));
    }
    Ok(UiResultFields {
        primary_score: ui.text(test_ids::PRIMARY_SCORE).await?.unwrap_or_default(),
        metrics: ui.text(test_ids::METRICS).await?.unwrap_or_default(),
        verification: ui.text(test_ids::VERIFICATION).await?.unwrap_or_default(),
        artifact_links: ui.link_hrefs(test_ids::ARTIFACTS).await?,
    })
}

async fn check_artifact(api: &dyn JobApi, links: &[String]) -> Result<ArtifactCheck, HarnessError> {
    let url = check_artifact_link(links, &api.api_base())?;
    let size_bytes = api
        .fetch_artifact(url)
        .await
        .map_err(|e| HarnessError::result_validation("artifact.fetch", e.to_string()))?;
    info!("Artifact {} resolved ({} bytes)", url, size_bytes);
    Ok(ArtifactCheck {
        url: url.to_string(),
        size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::ui::fake::ScriptedUi;
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const JOB_ID: &str = "job_20250101_120000_deadbeef";

    fn settings() -> RunSettings {
        RunSettings {
            poll: PollSettings::new(
                Duration::from_secs(5),
                Duration::from_millis(20),
                Duration::from_millis(200),
            )
            .unwrap(),
            ui_wait: Duration::from_millis(500),
            ui_step: Duration::from_millis(10),
            policy: ScoringPolicy::default(),
            expected_display: Some("0.3000".to_string()),
        }
    }

    fn status_body(status: &str) -> Value {
        json!({"job_id": JOB_ID, "service": "alphafold-multimer", "status": status})
    }

    fn result_body() -> Value {
        json!({
            "job_id": JOB_ID,
            "service": "alphafold-multimer",
            "status": "succeeded",
            "primary_score": {"name": "ranking_confidence", "value": 0.3},
            "metrics": {"iptm": 0.25, "ptm": 0.5, "ranking_confidence": 0.3, "plddt": 81.5},
            "verification": {"chain_lengths_match": true},
            "artifacts": [
                {"name": "input.fasta", "url": format!("/api/v1/jobs/{}/artifacts/input.fasta", JOB_ID), "media_type": "text/plain"},
                {"name": "rank_001.pdb", "url": format!("/api/v1/jobs/{}/artifacts/rank_001.pdb", JOB_ID), "media_type": "chemical/x-pdb"},
                {"name": "pae.json", "url": format!("/api/v1/jobs/{}/artifacts/pae.json", JOB_ID), "media_type": "application/json"}
            ]
        })
    }

    /// Mounts one response per status, in order; the last one repeats.
    async fn mount_statuses(server: &MockServer, statuses: &[&str]) {
        let status_path = format!("/api/v1/jobs/{}", JOB_ID);
        for (i, status) in statuses.iter().enumerate() {
            let mock = Mock::given(method("GET"))
                .and(path(status_path.as_str()))
                .respond_with(ResponseTemplate::new(200).set_body_json(status_body(status)));
            let mock = if i + 1 < statuses.len() {
                mock.up_to_n_times(1)
            } else {
                mock
            };
            mock.mount(server).await;
        }
    }

    async fn mount_result(server: &MockServer, times: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/jobs/{}/result", JOB_ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(result_body()))
            .expect(times)
            .mount(server)
            .await;
    }

    fn finished_ui(server: &MockServer, statuses: &[&str]) -> ScriptedUi {
        let link = format!(
            "{}/api/v1/jobs/{}/artifacts/rank_001.pdb",
            server.uri(),
            JOB_ID
        );
        ScriptedUi::with_statuses(statuses)
            .field(test_ids::JOB_ID, JOB_ID)
            .field(test_ids::PRIMARY_SCORE, "0.3000")
            .field(test_ids::METRICS, "ipTM 0.2500 pTM 0.5000 pLDDT 81.50")
            .field(test_ids::VERIFICATION, "chain_lengths_match: true")
            .links(&[link.as_str()])
    }

    fn request(server: &MockServer) -> SubmissionRequest {
        SubmissionRequest {
            frontend_url: "http://127.0.0.1:5180".to_string(),
            api_base: server.uri(),
            protein_a: "P43220".to_string(),
            protein_b: "P35625".to_string(),
            preset: Some("fast".to_string()),
        }
    }

    #[tokio::test]
    // Full run: submit, watch pending/running/succeeded, UI done inside the grace window, validate.
    async fn test_verify_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok", "version": "0.1.0"})))
            .expect(1)
            .mount(&server)
            .await;
        mount_statuses(&server, &["pending", "running", "succeeded"]).await;
        mount_result(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/jobs/{}/artifacts/rank_001.pdb", JOB_ID)))
            .respond_with(ResponseTemplate::new(200).set_body_string("ATOM\n"))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let ui = finished_ui(&server, &["Queued", "Running...", "Running...", "Done."]);

        let verdict = verify(&ui, &api, &request(&server), &settings()).await;
        assert!(verdict.passed, "{:?}", verdict.failure);
        assert_eq!(verdict.job_id.as_deref(), Some(JOB_ID));
        let report = verdict.report.unwrap();
        assert_eq!(report.job_id, JOB_ID);
        assert_eq!(report.polls, Some(4));
        assert!(report.api_succeeded_after_ms.is_some());
        assert!(report.result.artifacts.len() >= 3);
        assert_eq!(report.result.primary_score, 0.3);
        assert_eq!(
            report.artifact,
            Some(ArtifactCheck {
                url: format!("{}/api/v1/jobs/{}/artifacts/rank_001.pdb", server.uri(), JOB_ID),
                size_bytes: 5,
            })
        );
    }

    #[tokio::test]
    // A run that fails after submission still names the submitted job.
    async fn test_verify_failure_keeps_job_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok", "version": "0.1.0"})))
            .mount(&server)
            .await;
        mount_statuses(&server, &["succeeded"]).await;
        mount_result(&server, 0).await;

        let api = ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let ui = finished_ui(&server, &["Running model 5/5"]);

        let verdict = verify(&ui, &api, &request(&server), &settings()).await;
        assert!(!verdict.passed);
        assert_eq!(verdict.job_id.as_deref(), Some(JOB_ID));
        assert!(verdict.report.is_none());
        assert_eq!(verdict.failure.unwrap().kind, "divergence_timeout");
    }

    #[tokio::test]
    // A failed preflight has no job to name.
    async fn test_verify_preflight_failure_has_no_job_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/health"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "down"})))
            .mount(&server)
            .await;
        mount_result(&server, 0).await;

        let api = ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let ui = finished_ui(&server, &["Running..."]);

        let verdict = verify(&ui, &api, &request(&server), &settings()).await;
        assert!(!verdict.passed);
        assert_eq!(verdict.job_id, None);
        assert_eq!(verdict.failure.unwrap().kind, "api_transport_error");
    }

    #[tokio::test]
    // An API failure ends the run before the result endpoint is touched.
    async fn test_watch_api_failure_skips_result() {
        let server = MockServer::start().await;
        mount_statuses(&server, &["running", "failed"]).await;
        mount_result(&server, 0).await;

        let api = ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let ui = finished_ui(&server, &["Running..."]);

        let err = watch_and_validate(&ui, &api, JOB_ID, &settings())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "api_failed");
    }

    #[tokio::test]
    // A UI stuck after API success fails with the divergence timeout and the stuck status.
    async fn test_watch_divergence() {
        let server = MockServer::start().await;
        mount_statuses(&server, &["succeeded"]).await;
        mount_result(&server, 0).await;

        let api = ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let ui = finished_ui(&server, &["Running model 5/5"]);

        match watch_and_validate(&ui, &api, JOB_ID, &settings()).await {
            Err(HarnessError::DivergenceTimeout { last_ui_status, .. }) => {
                assert_eq!(last_ui_status, "Running model 5/5");
            }
            other => panic!("expected DivergenceTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    // A UI showing a different score than the deterministic backend fails the run.
    async fn test_watch_ui_score_mismatch() {
        let server = MockServer::start().await;
        mount_statuses(&server, &["succeeded"]).await;
        mount_result(&server, 1).await;

        let api = ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let ui = finished_ui(&server, &["Done."]).field(test_ids::PRIMARY_SCORE, "0.2900");

        let err = watch_and_validate(&ui, &api, JOB_ID, &settings())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::ResultValidation { ref invariant, .. } if invariant == "ui.primary_score.display"));
    }

    #[tokio::test]
    // check-result probes idempotence with repeated fetches.
    async fn test_check_result_repeated() {
        let server = MockServer::start().await;
        mount_statuses(&server, &["succeeded"]).await;
        mount_result(&server, 3).await;

        let api = ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let report = check_result(&api, JOB_ID, &ScoringPolicy::default(), 3)
            .await
            .unwrap();
        assert_eq!(report.result.job_id, JOB_ID);
        assert!(report.polls.is_none());
    }

    #[tokio::test]
    // check-result refuses jobs that have not finished.
    async fn test_check_result_unfinished() {
        let server = MockServer::start().await;
        mount_statuses(&server, &["running"]).await;
        mount_result(&server, 0).await;

        let api = ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = check_result(&api, JOB_ID, &ScoringPolicy::default(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::ResultValidation { ref invariant, .. } if invariant == "status"));
    }

    #[test]
    // Verdicts carry the failure kind and the API error body.
    fn test_verdict_from_failure() {
        let result: Result<RunReport, HarnessError> = Err(HarnessError::ApiReportedFailure {
            payload: json!({"status": "failed", "error": "RuntimeError: OOM"}),
        });
        let verdict = Verdict::from_result("watch", Some(JOB_ID.to_string()), &result);
        assert!(!verdict.passed);
        assert_eq!(verdict.job_id.as_deref(), Some(JOB_ID));
        let failure = verdict.failure.unwrap();
        assert_eq!(failure.kind, "api_failed");
        assert!(failure.details.unwrap().contains("RuntimeError: OOM"));
    }
}
