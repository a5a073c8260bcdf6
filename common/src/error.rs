use serde::Serialize;
use thiserror::Error;

/// Failure of one unit's control cycle. Never fatal for the whole tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("invalid thermostat mode '{0}'")]
    InvalidMode(String),
    #[error("invalid thermostat configuration: {0}")]
    Configuration(String),
    #[error("transport error at {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidMode,
    Configuration,
    Transport,
}

impl ControlError {
    pub fn transport(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMode(_) => ErrorKind::InvalidMode,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Transport { .. } => ErrorKind::Transport,
        }
    }
}
