//! Error types for blinkrise-core.

use serde::Serialize;
use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// Operator-visible session errors
// ═══════════════════════════════════════════════════════════════════════════════

/// The single "current error" surfaced to presentation.
///
/// `Display` renders the operator message. None of these are fatal: by the
/// time one is stored the coordinator has already settled in a well-defined
/// phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionError {
    /// The backend rejected a control action.
    #[error("Camera start failed: {reason}")]
    ControlFailed { reason: String },

    /// Network or connection-level failure.
    #[error("{message}")]
    Transport { message: String },

    /// A telemetry message could not be decoded; the prior snapshot is kept.
    #[error("Invalid data from backend: {details}")]
    TelemetryParse { details: String },

    /// The image stream failed to load; readiness still resolves.
    #[error("Video stream failed to load: {reason}")]
    StreamLoad { reason: String },
}

impl SessionError {
    pub fn connection_lost() -> Self {
        SessionError::Transport {
            message: "connection lost".to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Side-effect and configuration errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    #[error("Alarm output unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Home directory not found")]
    HomeNotFound,

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
