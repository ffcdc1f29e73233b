//! Terminal result validation
//!
//! Structural and numeric checks on the result document of a finished job, plus the
//! cross-checks of what the UI rendered for it. The first failing check aborts with
//! a `ResultValidation` error naming the invariant.

use crate::api::JobApi;
use crate::api::error::ApiError;
use crate::consts::scoring;
use crate::error::HarnessError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Numeric policy for the result document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScoringPolicy {
    pub iptm_weight: f64,
    pub ptm_weight: f64,
    /// Allowed absolute deviation of the primary score from the weighted sum.
    pub tolerance: f64,
    pub plddt_min: f64,
    pub plddt_max: f64,
    pub primary_min: f64,
    pub primary_max: f64,
    pub min_artifacts: usize,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            iptm_weight: scoring::IPTM_WEIGHT,
            ptm_weight: scoring::PTM_WEIGHT,
            tolerance: scoring::SCORE_TOLERANCE,
            plddt_min: scoring::PLDDT_MIN,
            plddt_max: scoring::PLDDT_MAX,
            primary_min: scoring::PRIMARY_SCORE_MIN,
            primary_max: scoring::PRIMARY_SCORE_MAX,
            min_artifacts: scoring::MIN_ARTIFACTS,
        }
    }
}

impl ScoringPolicy {
    pub fn expected_primary(&self, iptm: f64, ptm: f64) -> f64 {
        self.iptm_weight * iptm + self.ptm_weight * ptm
    }

    fn primary_in_range(&self, value: f64) -> bool {
        value >= self.primary_min && value <= self.primary_max
    }
}

/// Artifact descriptor as listed in the result document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Artifact {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

/// The fields of a result document that passed every check.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VerifiedResult {
    pub job_id: String,
    pub service: Option<String>,
    pub iptm: f64,
    pub ptm: f64,
    pub plddt: f64,
    pub primary_score: f64,
    pub primary_score_name: Option<String>,
    pub ranking_confidence: Option<f64>,
    pub artifacts: Vec<Artifact>,
    pub verification: Option<Value>,
}

/// Strict JSON number lookup; numeric strings are not accepted.
fn finite_number(doc: &Value, pointer: &str, invariant: &str) -> Result<f64, HarnessError> {
    let raw = doc.pointer(pointer);
    match raw.and_then(Value::as_f64) {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(HarnessError::result_validation(
            invariant,
            format!(
                "expected a finite number, got {}",
                raw.map(|v| v.to_string()).unwrap_or_else(|| "nothing".to_string())
            ),
        )),
    }
}

fn optional_string(doc: &Value, pointer: &str) -> Option<String> {
    doc.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

/// Runs the document checks in order and returns the verified fields.
pub fn check_document(
    doc: &Value,
    job_id: &str,
    policy: &ScoringPolicy,
) -> Result<VerifiedResult, HarnessError> {
    let status = doc.get("status").and_then(Value::as_str);
    if status != Some("succeeded") {
        return Err(HarnessError::result_validation(
            "status",
            format!("expected \"succeeded\", got {:?}", status),
        ));
    }

    let doc_job_id = doc.get("job_id").and_then(Value::as_str);
    if doc_job_id != Some(job_id) {
        return Err(HarnessError::result_validation(
            "job_id",
            format!("expected {:?}, got {:?}", job_id, doc_job_id),
        ));
    }

    let artifacts = match doc.get("artifacts").and_then(Value::as_array) {
        Some(list) if list.len() >= policy.min_artifacts => list,
        Some(list) => {
            return Err(HarnessError::result_validation(
                "artifacts",
                format!(
                    "expected at least {} artifacts, got {}",
                    policy.min_artifacts,
                    list.len()
                ),
            ));
        }
        None => {
            return Err(HarnessError::result_validation(
                "artifacts",
                "missing or not an array",
            ));
        }
    };

    let iptm = finite_number(doc, "/metrics/iptm", "metrics.iptm")?;
    let ptm = finite_number(doc, "/metrics/ptm", "metrics.ptm")?;
    let primary = finite_number(doc, "/primary_score/value", "primary_score.value")?;

    let expected = policy.expected_primary(iptm, ptm);
    let deviation = (primary - expected).abs();
    if deviation > policy.tolerance {
        return Err(HarnessError::result_validation(
            "primary_score.formula",
            format!(
                "primary_score {} != {} * iptm({}) + {} * ptm({}) = {} (deviation {:.6}, tolerance {})",
                primary,
                policy.iptm_weight,
                iptm,
                policy.ptm_weight,
                ptm,
                expected,
                deviation,
                policy.tolerance
            ),
        ));
    }

    let plddt = finite_number(doc, "/metrics/plddt", "metrics.plddt")?;
    if plddt < policy.plddt_min || plddt > policy.plddt_max {
        return Err(HarnessError::result_validation(
            "metrics.plddt.range",
            format!("{} not in [{}, {}]", plddt, policy.plddt_min, policy.plddt_max),
        ));
    }

    if !policy.primary_in_range(primary) {
        return Err(HarnessError::result_validation(
            "primary_score.range",
            format!(
                "{} not in [{}, {}]",
                primary, policy.primary_min, policy.primary_max
            ),
        ));
    }

    // Descriptors are informational; a malformed entry is kept as an empty one.
    let artifacts = artifacts
        .iter()
        .map(|a| serde_json::from_value::<Artifact>(a.clone()).unwrap_or_default())
        .collect();

    Ok(VerifiedResult {
        job_id: job_id.to_string(),
        service: optional_string(doc, "/service"),
        iptm,
        ptm,
        plddt,
        primary_score: primary,
        primary_score_name: optional_string(doc, "/primary_score/name"),
        ranking_confidence: doc.pointer("/metrics/ranking_confidence").and_then(Value::as_f64),
        artifacts,
        verification: doc.get("verification").cloned(),
    })
}

/// What the result panel of the UI shows for a finished job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiResultFields {
    pub primary_score: String,
    pub metrics: String,
    pub verification: String,
    pub artifact_links: Vec<String>,
}

/// Checks the rendered result panel. `expected_display` pins the exact primary
/// score text when the backend is deterministic.
pub fn check_ui_fields(
    fields: &UiResultFields,
    policy: &ScoringPolicy,
    expected_display: Option<&str>,
) -> Result<(), HarnessError> {
    let shown = fields.primary_score.trim();
    match shown.parse::<f64>() {
        Ok(v) if v.is_finite() && policy.primary_in_range(v) => {}
        _ => {
            return Err(HarnessError::result_validation(
                "ui.primary_score",
                format!(
                    "{:?} is not a number in [{}, {}]",
                    shown, policy.primary_min, policy.primary_max
                ),
            ));
        }
    }
    if let Some(expected) = expected_display {
        if shown != expected {
            return Err(HarnessError::result_validation(
                "ui.primary_score.display",
                format!("expected {:?}, UI shows {:?}", expected, shown),
            ));
        }
    }

    for label in ["ipTM", "pTM"] {
        if !fields.metrics.contains(label) {
            return Err(HarnessError::result_validation(
                "ui.metrics",
                format!("metrics panel does not mention {}", label),
            ));
        }
    }

    if !fields.verification.contains("chain_lengths_match") {
        return Err(HarnessError::result_validation(
            "ui.verification",
            "verification panel does not mention chain_lengths_match",
        ));
    }

    if fields.artifact_links.is_empty() {
        return Err(HarnessError::result_validation(
            "ui.artifacts",
            "no artifact links rendered",
        ));
    }
    Ok(())
}

/// The first artifact link must point into the job API that served the job.
pub fn check_artifact_link<'a>(links: &'a [String], api_base: &str) -> Result<&'a str, HarnessError> {
    let expected = format!("{}/api/v1/jobs/", api_base.trim_end_matches('/'));
    match links.first() {
        Some(link) if link.contains(&expected) => Ok(link.as_str()),
        Some(link) => Err(HarnessError::result_validation(
            "ui.artifact_link",
            format!("{:?} does not point under {:?}", link, expected),
        )),
        None => Err(HarnessError::result_validation(
            "ui.artifacts",
            "no artifact links rendered",
        )),
    }
}

/// Fetches and checks the result document of a job that both channels reported done.
pub struct ResultValidator<'a> {
    api: &'a dyn JobApi,
    policy: ScoringPolicy,
}

impl<'a> ResultValidator<'a> {
    pub fn new(api: &'a dyn JobApi, policy: ScoringPolicy) -> Self {
        Self { api, policy }
    }

    /// One fetch of the result document.
    async fn fetch(&self, job_id: &str) -> Result<Value, HarnessError> {
        match self.api.job_result(job_id).await {
            Ok(doc) => Ok(doc),
            Err(e @ ApiError::Http { .. }) => {
                let detail = match (e.status(), e.to_pretty()) {
                    (Some(status), Some(body)) => format!("HTTP {}: {}", status, body),
                    _ => e.to_string(),
                };
                Err(HarnessError::result_validation("http.status", detail))
            }
            Err(ApiError::Decode { url, source }) => Err(HarnessError::result_validation(
                "http.body",
                format!("{} did not return JSON: {}", url, source),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetches the result once and checks it.
    pub async fn validate(&self, job_id: &str) -> Result<VerifiedResult, HarnessError> {
        let doc = self.fetch(job_id).await?;
        debug!("[{}] result document: {}", job_id, doc);
        let verified = check_document(&doc, job_id, &self.policy)?;
        info!(
            "[{}] result valid: primary_score={} iptm={} ptm={} plddt={} artifacts={}",
            job_id,
            verified.primary_score,
            verified.iptm,
            verified.ptm,
            verified.plddt,
            verified.artifacts.len()
        );
        Ok(verified)
    }

    /// Fetches the result `repeat` times and requires every copy to equal the
    /// first, then checks that copy.
    pub async fn validate_repeated(
        &self,
        job_id: &str,
        repeat: usize,
    ) -> Result<VerifiedResult, HarnessError> {
        let first = self.fetch(job_id).await?;
        for attempt in 2..=repeat.max(1) {
            let again = self.fetch(job_id).await?;
            if again != first {
                return Err(HarnessError::result_validation(
                    "result.idempotent",
                    format!("fetch {} returned a different document: {}", attempt, again),
                ));
            }
        }
        check_document(&first, job_id, &self.policy)
    }
}
