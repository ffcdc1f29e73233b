//! UI surface
//!
//! The browser side of the verification. The harness only reads text content and
//! link targets of elements addressed by their `data-testid`, and drives the
//! submission form.

pub mod error;
pub mod webdriver;

pub use error::UiError;
pub use webdriver::WebDriverSurface;

use log::debug;
use std::time::Duration;

/// `data-testid` values rendered by the AlphaFold-Multimer tool page.
pub mod test_ids {
    pub const FORM: &str = "af-form";
    pub const API_BASE: &str = "af-api-base";
    pub const PROTEIN_A: &str = "af-protein-a";
    pub const PROTEIN_B: &str = "af-protein-b";
    pub const PRESET: &str = "af-preset";
    pub const SUBMIT: &str = "af-submit";
    pub const STATUS: &str = "af-status";
    pub const ERROR: &str = "af-error";
    pub const JOB_ID: &str = "af-job-id";
    pub const PRIMARY_SCORE: &str = "af-primary-score";
    pub const METRICS: &str = "af-metrics";
    pub const VERIFICATION: &str = "af-verification";
    pub const ARTIFACTS: &str = "af-artifacts";
}

#[async_trait::async_trait]
pub trait UiSurface: Send + Sync {
    /// Navigate to `url`.
    async fn open(&self, url: &str) -> Result<(), UiError>;

    /// Whether the element exists and is displayed. A missing element is not an error.
    async fn is_visible(&self, test_id: &str) -> Result<bool, UiError>;

    /// Trimmed text content, or `None` when the element does not exist.
    async fn text(&self, test_id: &str) -> Result<Option<String>, UiError>;

    /// Replace the value of an input.
    async fn fill(&self, test_id: &str, value: &str) -> Result<(), UiError>;

    /// Choose the `<option>` with the given value inside a select.
    async fn select(&self, test_id: &str, value: &str) -> Result<(), UiError>;

    async fn click(&self, test_id: &str) -> Result<(), UiError>;

    /// `href` of every link inside the container, in document order.
    async fn link_hrefs(&self, container_test_id: &str) -> Result<Vec<String>, UiError>;

    /// Release the underlying browser session.
    async fn close(&self) -> Result<(), UiError> {
        Ok(())
    }
}

/// Polls until the element is visible or `timeout` elapses. Returns whether it became visible.
pub async fn wait_until_visible(
    ui: &dyn UiSurface,
    test_id: &str,
    timeout: Duration,
    step: Duration,
) -> Result<bool, UiError> {
    let start = tokio::time::Instant::now();
    loop {
        if ui.is_visible(test_id).await? {
            return Ok(true);
        }
        if start.elapsed() >= timeout {
            debug!("{} not visible after {:?}", test_id, timeout);
            return Ok(false);
        }
        tokio::time::sleep(step).await;
    }
}
