//! Harness configuration.
//!
//! Settings are layered: built-in defaults, then the JSON config file, then the
//! `SHENLAB_E2E_*` environment variables shared with the browser e2e suite, then CLI flags.

use crate::consts::{polling, services};
use crate::environment::{Environment, EnvironmentType};
use crate::validate::ScoringPolicy;
use crate::watch::PollSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use std::{fs, path::Path};
use thiserror::Error;

const LOCAL_CONFIG_FILE: &str = "afm-verify.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value {value:?} for {name}")]
    InvalidEnv { name: String, value: String },

    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Get the path to the harness config file: `./afm-verify.json` when present, else
/// `~/.afm-verify/config.json`.
pub fn get_config_path() -> Result<PathBuf, std::io::Error> {
    let local_config_path = std::env::current_dir()?.join(LOCAL_CONFIG_FILE);
    if local_config_path.exists() {
        return Ok(local_config_path);
    }

    let home_path = home::home_dir().ok_or(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "Home directory not found",
    ))?;
    Ok(home_path.join(".afm-verify").join("config.json"))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Backend mode, `mock` or `real`.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Job API base URL. Derived from the backend port when unset.
    #[serde(default)]
    pub api_base: Option<String>,

    /// Frontend base URL. Derived from the frontend port when unset.
    #[serde(default)]
    pub frontend_url: Option<String>,

    #[serde(default)]
    pub frontend_port: Option<u16>,

    #[serde(default)]
    pub backend_port: Option<u16>,

    /// WebDriver endpoint (chromedriver, geckodriver) driving the browser.
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default = "default_browser")]
    pub browser: String,

    #[serde(default = "default_true")]
    pub headless: bool,

    /// Overall deadline. Falls back to the mode's default when unset.
    #[serde(default)]
    pub deadline_ms: Option<u64>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_grace_window_ms")]
    pub grace_window_ms: u64,

    #[serde(default = "default_ui_wait_ms")]
    pub ui_wait_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_protein_a")]
    pub protein_a: String,

    #[serde(default = "default_protein_b")]
    pub protein_b: String,

    #[serde(default = "default_preset")]
    pub preset: String,

    #[serde(default)]
    pub scoring: ScoringPolicy,
}

fn default_environment() -> String {
    EnvironmentType::default().to_string()
}

fn default_webdriver_url() -> String {
    services::DEFAULT_WEBDRIVER_URL.to_string()
}

fn default_browser() -> String {
    "chrome".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    polling::POLL_INTERVAL_MS
}

fn default_grace_window_ms() -> u64 {
    polling::GRACE_WINDOW_MS
}

fn default_ui_wait_ms() -> u64 {
    polling::UI_WAIT_MS
}

fn default_request_timeout_secs() -> u64 {
    polling::REQUEST_TIMEOUT_SECS
}

fn default_protein_a() -> String {
    services::DEFAULT_PROTEIN_A.to_string()
}

fn default_protein_b() -> String {
    services::DEFAULT_PROTEIN_B.to_string()
}

fn default_preset() -> String {
    services::DEFAULT_PRESET.to_string()
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            api_base: None,
            frontend_url: None,
            frontend_port: None,
            backend_port: None,
            webdriver_url: default_webdriver_url(),
            browser: default_browser(),
            headless: true,
            deadline_ms: None,
            poll_interval_ms: default_poll_interval_ms(),
            grace_window_ms: default_grace_window_ms(),
            ui_wait_ms: default_ui_wait_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            protein_a: default_protein_a(),
            protein_b: default_protein_b(),
            preset: default_preset(),
            scoring: ScoringPolicy::default(),
        }
    }
}

impl HarnessConfig {
    /// Loads configuration from a JSON file at the given path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let buf = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&buf).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the file if it exists, otherwise starts from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Saves the configuration as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Serialization failed: {}", e),
            )
        })?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Applies `SHENLAB_E2E_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(mode) = get("SHENLAB_E2E_MODE") {
            mode.parse::<EnvironmentType>()
                .map_err(|_| invalid_env("SHENLAB_E2E_MODE", &mode))?;
            self.environment = mode.trim().to_lowercase();
        }
        if let Some(base) = get("SHENLAB_E2E_API_BASE") {
            self.api_base = Some(base);
        }
        if let Some(raw) = get("SHENLAB_E2E_REAL_TIMEOUT_MS") {
            let ms = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| invalid_env("SHENLAB_E2E_REAL_TIMEOUT_MS", &raw))?;
            self.deadline_ms = Some(ms);
        }
        if let Some(protein) = get("SHENLAB_E2E_REAL_PROTEIN_A") {
            self.protein_a = protein;
        }
        if let Some(protein) = get("SHENLAB_E2E_REAL_PROTEIN_B") {
            self.protein_b = protein;
        }
        if let Some(raw) = get("SHENLAB_E2E_FRONTEND_PORT") {
            let port = raw
                .trim()
                .parse::<u16>()
                .map_err(|_| invalid_env("SHENLAB_E2E_FRONTEND_PORT", &raw))?;
            self.frontend_port = Some(port);
        }
        if let Some(raw) = get("SHENLAB_E2E_BACKEND_PORT") {
            let port = raw
                .trim()
                .parse::<u16>()
                .map_err(|_| invalid_env("SHENLAB_E2E_BACKEND_PORT", &raw))?;
            self.backend_port = Some(port);
        }
        if let Some(url) = get("AFM_VERIFY_WEBDRIVER_URL") {
            self.webdriver_url = url;
        }
        Ok(())
    }

    pub fn environment(&self) -> Result<Environment, ConfigError> {
        let mut env = self
            .environment
            .parse::<Environment>()
            .map_err(|_| ConfigError::InvalidSetting {
                name: "environment",
                reason: format!("unknown mode {:?}", self.environment),
            })?;
        if let Some(port) = self.frontend_port {
            env.frontend_port = port;
        }
        if let Some(port) = self.backend_port {
            env.backend_port = port;
        }
        Ok(env)
    }

    pub fn api_base(&self) -> Result<String, ConfigError> {
        match &self.api_base {
            Some(base) => Ok(base.trim_end_matches('/').to_string()),
            None => Ok(self.environment()?.api_base()),
        }
    }

    pub fn frontend_url(&self) -> Result<String, ConfigError> {
        match &self.frontend_url {
            Some(url) => Ok(url.trim_end_matches('/').to_string()),
            None => Ok(self.environment()?.frontend_url()),
        }
    }

    pub fn deadline_ms(&self) -> Result<u64, ConfigError> {
        match self.deadline_ms {
            Some(ms) => Ok(ms),
            None => Ok(self.environment()?.default_deadline_ms()),
        }
    }

    /// Timing for the dual-channel poller, validated.
    pub fn poll_settings(&self) -> Result<PollSettings, ConfigError> {
        PollSettings::new(
            Duration::from_millis(self.deadline_ms()?),
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_millis(self.grace_window_ms),
        )
    }

    pub fn ui_wait(&self) -> Duration {
        Duration::from_millis(self.ui_wait_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn invalid_env(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    }
}
