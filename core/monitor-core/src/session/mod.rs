//! Session lifecycle: the coordinator, its inputs and the effects it asks the
//! runtime to perform.
//!
//! ## Lifecycle
//!
//! ```text
//! Off ──toggle──► Starting ──start ok──► On ──toggle──► (grace delay) ──► Off
//!                    │                    │
//!                    └──start failed──► Off└──channel lost──► Error ──toggle──► Starting
//! ```
//!
//! Teardown from any state closes the channel, issues a stop and makes the
//! coordinator inert.

mod coordinator;
mod types;

pub use coordinator::{SessionCoordinator, SessionSettings};
pub use types::{
    ChannelEvent, ChannelGeneration, ControlTicket, Effect, Input, SessionPhase, SessionView,
};
