//! Job submission through the tool page.

use crate::consts::job::{JOB_ID_PLACEHOLDER, JOB_ID_PREFIX};
use crate::error::HarnessError;
use crate::ui::{UiSurface, test_ids, wait_until_visible};
use log::info;
use std::time::Duration;

/// What to submit, and where the page should send it.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub frontend_url: String,
    pub api_base: String,
    pub protein_a: String,
    pub protein_b: String,
    pub preset: Option<String>,
}

/// A job id must carry the job store's prefix and something after it.
pub fn validate_job_id(raw: &str) -> Result<String, HarnessError> {
    let job_id = raw.trim();
    if job_id.len() <= JOB_ID_PREFIX.len() || !job_id.starts_with(JOB_ID_PREFIX) {
        return Err(HarnessError::Submission(format!(
            "malformed job id {:?}, expected prefix {:?}",
            job_id, JOB_ID_PREFIX
        )));
    }
    Ok(job_id.to_string())
}

/// Fills the form, submits it and waits for the page to show the new job id.
pub async fn submit_job(
    ui: &dyn UiSurface,
    request: &SubmissionRequest,
    wait: Duration,
    step: Duration,
) -> Result<String, HarnessError> {
    let tools_url = format!("{}/#tools", request.frontend_url.trim_end_matches('/'));
    ui.open(&tools_url).await?;
    if !wait_until_visible(ui, test_ids::FORM, wait, step).await? {
        return Err(HarnessError::Submission(format!(
            "tool form did not appear at {}",
            tools_url
        )));
    }

    ui.fill(test_ids::API_BASE, &request.api_base).await?;
    ui.fill(test_ids::PROTEIN_A, &request.protein_a).await?;
    ui.fill(test_ids::PROTEIN_B, &request.protein_b).await?;
    if let Some(preset) = &request.preset {
        ui.select(test_ids::PRESET, preset).await?;
    }
    ui.click(test_ids::SUBMIT).await?;

    let start = tokio::time::Instant::now();
    loop {
        // A rejected submission shows the error panel instead of a job id.
        if ui.is_visible(test_ids::ERROR).await.unwrap_or(false) {
            let text = ui.text(test_ids::ERROR).await?.unwrap_or_default();
            return Err(HarnessError::UiReportedError { text });
        }

        let shown = ui.text(test_ids::JOB_ID).await?.unwrap_or_default();
        if !shown.is_empty() && shown != JOB_ID_PLACEHOLDER {
            let job_id = validate_job_id(&shown)?;
            info!("Submitted job {}", job_id);
            return Ok(job_id);
        }

        if start.elapsed() >= wait {
            return Err(HarnessError::Submission(format!(
                "no job id shown within {:?} of submitting",
                wait
            )));
        }
        tokio::time::sleep(step).await;
    }
}
