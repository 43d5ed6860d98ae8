//! Wire types shared by the BlinkRise monitor client and the detection backend.
//!
//! The backend is the authority on what it sends; this crate only mirrors its
//! JSON shapes so the client can validate inbound telemetry and build control
//! requests without schema drift.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const CONTROL_PATH: &str = "camera_control";
pub const VIDEO_FEED_PATH: &str = "video_feed";
pub const STREAM_KEY_PARAM: &str = "key";
pub const MAX_TELEMETRY_BYTES: usize = 64 * 1024;

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_INFO: &str = "info";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("telemetry payload exceeds {} bytes", MAX_TELEMETRY_BYTES)]
    PayloadTooLarge,

    #[error("telemetry payload is invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("telemetry field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("invalid endpoint URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Action carried by the `action` query parameter of the control endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Start,
    Stop,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
        }
    }
}

/// Body of a control reply. Both fields are optional because error replies
/// from the framework (validation failures, proxies) rarely carry a status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ControlReply {
    /// True for the statuses the backend uses when the camera ends up in the
    /// requested state (`info` means it already was).
    pub fn is_accepted(&self) -> bool {
        matches!(
            self.status.as_deref(),
            Some(STATUS_SUCCESS) | Some(STATUS_INFO)
        )
    }
}

/// One telemetry message pushed by the detection pipeline.
///
/// Field names follow the backend's JSON (`blink`, `alarm_on`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub ear: f64,
    pub blink: u32,
    pub status: String,
    pub probability: f64,
    pub alarm_on: bool,
}

impl TelemetrySnapshot {
    /// Value shown whenever no session is active.
    pub fn video_off() -> Self {
        Self {
            ear: 0.0,
            blink: 0,
            status: "Video Off".to_string(),
            probability: 0.0,
            alarm_on: false,
        }
    }

    /// Placeholder between a successful start and the first message.
    pub fn loading() -> Self {
        Self {
            status: "Loading...".to_string(),
            ..Self::video_off()
        }
    }
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self::video_off()
    }
}

pub fn parse_telemetry(payload: &str) -> Result<TelemetrySnapshot, ProtocolError> {
    if payload.len() > MAX_TELEMETRY_BYTES {
        return Err(ProtocolError::PayloadTooLarge);
    }

    let snapshot: TelemetrySnapshot = serde_json::from_str(payload)?;
    if !snapshot.ear.is_finite() {
        return Err(ProtocolError::OutOfRange {
            field: "ear",
            value: snapshot.ear,
        });
    }
    if !(0.0..=1.0).contains(&snapshot.probability) {
        return Err(ProtocolError::OutOfRange {
            field: "probability",
            value: snapshot.probability,
        });
    }
    Ok(snapshot)
}

/// `{base}/camera_control?action=<action>`
pub fn control_url(base: &str, action: ControlAction) -> Result<String, ProtocolError> {
    let mut url = endpoint(base, CONTROL_PATH)?;
    url.query_pairs_mut().append_pair("action", action.as_str());
    Ok(url.into())
}

/// `{base}/video_feed?key=<key>`; the key forces a fresh load per attempt.
pub fn stream_url(base: &str, key: u64) -> Result<String, ProtocolError> {
    let mut url = endpoint(base, VIDEO_FEED_PATH)?;
    url.query_pairs_mut()
        .append_pair(STREAM_KEY_PARAM, &key.to_string());
    Ok(url.into())
}

fn endpoint(base: &str, path: &str) -> Result<Url, ProtocolError> {
    let invalid = |reason: String| ProtocolError::InvalidUrl {
        url: base.to_string(),
        reason,
    };

    let mut url = Url::parse(base).map_err(|err| invalid(err.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("URL cannot be a base".to_string()))?
        .pop_if_empty()
        .push(path);
    Ok(url)
}
