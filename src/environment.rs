use crate::consts::{polling, scoring, services};
use clap::ValueEnum;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// Backend mode the stack under test runs in.
#[derive(Clone, Default, Copy, PartialEq, Eq, ValueEnum, Debug)]
pub enum EnvironmentType {
    /// Deterministic mock runner; jobs finish within seconds.
    #[default]
    Mock,
    /// Real ColabFold runner; jobs take tens of minutes.
    Real,
}

/// Where the frontend and backend of the stack under test listen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Environment {
    pub env_type: EnvironmentType,
    pub frontend_port: u16,
    pub backend_port: u16,
}

impl Environment {
    pub fn new(env_type: EnvironmentType) -> Self {
        Self {
            env_type,
            frontend_port: services::DEFAULT_FRONTEND_PORT,
            backend_port: services::DEFAULT_BACKEND_PORT,
        }
    }

    /// Base URL of the job API.
    pub fn api_base(&self) -> String {
        format!("http://127.0.0.1:{}", self.backend_port)
    }

    /// Base URL of the web frontend.
    pub fn frontend_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.frontend_port)
    }

    pub fn default_deadline_ms(&self) -> u64 {
        match self.env_type {
            EnvironmentType::Mock => polling::MOCK_DEADLINE_MS,
            EnvironmentType::Real => polling::REAL_DEADLINE_MS,
        }
    }

    /// The mock runner always reports the same primary score; real runs are unpredictable.
    pub fn expected_primary_display(&self) -> Option<String> {
        match self.env_type {
            EnvironmentType::Mock => Some(scoring::MOCK_PRIMARY_SCORE_DISPLAY.to_string()),
            EnvironmentType::Real => None,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(EnvironmentType::default())
    }
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<EnvironmentType>().map(Environment::new)
    }
}

impl FromStr for EnvironmentType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(EnvironmentType::Mock),
            "real" => Ok(EnvironmentType::Real),
            _ => Err(()),
        }
    }
}

impl Display for EnvironmentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentType::Mock => write!(f, "mock"),
            EnvironmentType::Real => write!(f, "real"),
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.env_type)
    }
}
