use thiserror::Error;

#[derive(Debug, Error)]
pub enum UiError {
    /// The WebDriver endpoint could not be reached.
    #[error("WebDriver transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The WebDriver answered with a W3C error object.
    #[error("WebDriver error {status} ({error}): {message}")]
    WebDriver {
        status: u16,
        error: String,
        message: String,
    },

    #[error("No element with data-testid {test_id:?}")]
    NoSuchElement { test_id: String },

    /// The WebDriver answered with something that is not a W3C response.
    #[error("Unexpected WebDriver response: {0}")]
    Protocol(String),
}

impl UiError {
    /// W3C error code, e.g. `no such element`.
    pub fn webdriver_code(&self) -> Option<&str> {
        match self {
            Self::WebDriver { error, .. } => Some(error),
            _ => None,
        }
    }
}
