//! Normalization of control-endpoint replies.
//!
//! Transports hand over the raw status and body; everything a caller sees is a
//! [`ControlResult`], never a transport error.

use blinkrise_protocol::ControlReply;
use serde::Serialize;

const UNKNOWN_BACKEND_ERROR: &str = "Unknown error from backend";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlOutcome {
    Success,
    /// The backend answered and refused the action.
    Failed,
    /// The request never produced a reply.
    NetworkError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlResult {
    pub outcome: ControlOutcome,
    pub message: String,
}

impl ControlResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            outcome: ControlOutcome::Success,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: ControlOutcome::Failed,
            message: message.into(),
        }
    }

    pub fn network_error(details: impl std::fmt::Display) -> Self {
        Self {
            outcome: ControlOutcome::NetworkError,
            message: format!("Network error: {}", details),
        }
    }

    /// Builds a result from an HTTP reply. `http_ok` is true for 2xx.
    pub fn from_reply(http_ok: bool, body: &[u8]) -> Self {
        let reply = serde_json::from_slice::<ControlReply>(body);

        if !http_ok {
            let message = reply
                .ok()
                .and_then(|reply| reply.message)
                .unwrap_or_else(|| UNKNOWN_BACKEND_ERROR.to_string());
            return Self::failed(message);
        }

        match reply {
            Ok(reply) if reply.is_accepted() => Self::success(reply.message.unwrap_or_default()),
            Ok(reply) => Self::failed(
                reply
                    .message
                    .unwrap_or_else(|| UNKNOWN_BACKEND_ERROR.to_string()),
            ),
            Err(err) => Self::failed(format!("Unreadable reply from backend: {}", err)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ControlOutcome::Success
    }
}
