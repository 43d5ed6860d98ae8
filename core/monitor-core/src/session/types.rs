//! Types exchanged between the coordinator and its runtime.

use blinkrise_protocol::{ControlAction, TelemetrySnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::control::ControlResult;
use crate::error::SessionError;
use crate::readiness::StreamEpoch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Off,
    Starting,
    On,
    Error,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Off => "off",
            SessionPhase::Starting => "starting",
            SessionPhase::On => "on",
            SessionPhase::Error => "error",
        }
    }
}

/// Identifies one control request; completions carry it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ControlTicket(pub u64);

/// Identifies one telemetry connection; events from older ones are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelGeneration(pub u64);

impl fmt::Display for ControlTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a telemetry connection reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened,
    Snapshot {
        snapshot: TelemetrySnapshot,
        received_at: DateTime<Utc>,
    },
    /// A message arrived but did not decode. The connection stays up.
    Malformed { details: String },
    /// Transport failure. Reported once; the connection is dead afterwards.
    Failed { reason: String },
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Toggle,
    DismissError,
    Teardown,
    ControlCompleted {
        ticket: ControlTicket,
        action: ControlAction,
        result: ControlResult,
    },
    Channel {
        generation: ChannelGeneration,
        event: ChannelEvent,
    },
    StreamLoaded {
        epoch: StreamEpoch,
    },
    StreamFailed {
        epoch: StreamEpoch,
        reason: String,
    },
    ReadinessTimeout {
        epoch: StreamEpoch,
    },
    GraceElapsed {
        ticket: ControlTicket,
    },
}

/// Side effects requested by the coordinator. A batch must be executed in
/// order: closes always precede the control request that follows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CloseChannel {
        generation: ChannelGeneration,
    },
    CloseStream {
        epoch: StreamEpoch,
    },
    SendControl {
        ticket: ControlTicket,
        action: ControlAction,
    },
    OpenChannel {
        generation: ChannelGeneration,
    },
    OpenStream {
        epoch: StreamEpoch,
        url: String,
    },
    ArmReadinessTimeout {
        epoch: StreamEpoch,
        after: Duration,
    },
    ArmGraceTimer {
        ticket: ControlTicket,
        after: Duration,
    },
}

/// Everything presentation needs, in one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub telemetry: TelemetrySnapshot,
    pub error: Option<SessionError>,
    pub stream_loading: bool,
    pub stream_url: Option<String>,
    /// A control call or the post-stop grace delay is pending; toggles are
    /// rejected until it clears.
    pub busy: bool,
    pub last_telemetry_at: Option<DateTime<Utc>>,
}
