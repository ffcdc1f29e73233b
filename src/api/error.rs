//! Error handling for the job API client

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body documented by the job API (`ErrorResponse`).
#[derive(Serialize, Deserialize)]
struct RawError {
    error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Reqwest error, typically related to network issues or request failures.
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("HTTP error with status {status} from {url}: {message}")]
    Http {
        status: u16,
        url: String,
        message: String,
    },

    /// The body was not the JSON shape we expected.
    #[error("Invalid response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub async fn from_response(response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response text".to_string());

        ApiError::Http {
            status,
            url,
            message,
        }
    }

    /// HTTP status of the failed response, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Reqwest(e) => e.status().map(|s| s.as_u16()),
            Self::Decode { .. } => None,
        }
    }

    pub fn to_pretty(&self) -> Option<String> {
        match self {
            Self::Http { message: msg, .. } => {
                if let Ok(parsed) = serde_json::from_str::<RawError>(msg) {
                    if let Ok(stringified) = serde_json::to_string_pretty(&parsed) {
                        return Some(stringified);
                    }
                }

                None
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Documented error bodies are pretty-printed; anything else is left alone.
    fn test_to_pretty() {
        let err = ApiError::Http {
            status: 409,
            url: "http://x/api/v1/jobs/job_1/result".to_string(),
            message: r#"{"error":"Job not finished (status=running)"}"#.to_string(),
        };
        let pretty = err.to_pretty().unwrap();
        assert!(pretty.contains("Job not finished"));
        assert_eq!(err.status(), Some(409));

        let plain = ApiError::Http {
            status: 502,
            url: "http://x".to_string(),
            message: "Bad Gateway".to_string(),
        };
        assert!(plain.to_pretty().is_none());
    }
}
