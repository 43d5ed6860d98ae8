//! # blinkrise-core
//!
//! Session and stream coordination for the BlinkRise monitor client.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. The coordinator consumes
//!   [`Input`]s and returns ordered [`Effect`]s; the caller owns sockets,
//!   timers and tasks and reports their outcomes back as inputs.
//! - **Not thread-safe**: Everything is driven from a single event loop.
//! - **Stale events are data**: every asynchronous completion carries the
//!   ticket, channel generation or stream epoch it belongs to, and anything
//!   that no longer matches is dropped.
//! - **Failures are state**: errors never escape the coordinator; they land in
//!   [`SessionView::error`] and leave the session in `Off` or `Error`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use blinkrise_core::{Input, SessionCoordinator, SessionSettings};
//!
//! let mut coordinator = SessionCoordinator::new(SessionSettings::default());
//! for effect in coordinator.handle(Input::Toggle) {
//!     runtime.execute(effect);
//! }
//! ```

pub mod alarm;
pub mod config;
pub mod control;
pub mod error;
pub mod readiness;
pub mod session;

pub use alarm::{AlarmDriver, AlarmSink};
pub use config::{load_config, MonitorConfig};
pub use control::{ControlOutcome, ControlResult};
pub use error::{AlarmError, ConfigError, SessionError};
pub use readiness::{Resolution, StreamEpoch, StreamReadinessTracker};
pub use session::{
    ChannelEvent, ChannelGeneration, ControlTicket, Effect, Input, SessionCoordinator,
    SessionPhase, SessionSettings, SessionView,
};

pub use blinkrise_protocol::{ControlAction, TelemetrySnapshot};
