//! The session state machine.
//!
//! Owns the phase, the live channel generation, the in-flight control ticket
//! and the stream epoch. Every asynchronous completion is checked against
//! those before it may touch state.

use blinkrise_protocol::{stream_url, ControlAction, TelemetrySnapshot};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{
    ChannelEvent, ChannelGeneration, ControlTicket, Effect, Input, SessionPhase, SessionView,
};
use crate::config::MonitorConfig;
use crate::control::{ControlOutcome, ControlResult};
use crate::error::SessionError;
use crate::readiness::{Resolution, StreamEpoch, StreamReadinessTracker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Base URL the image stream is fetched from.
    pub api_base_url: String,
    pub grace_delay: Duration,
    pub readiness_timeout: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            api_base_url: config.endpoints.api_base_url.clone(),
            grace_delay: config.timing.grace_delay(),
            readiness_timeout: config.timing.readiness_timeout(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingControl {
    ticket: ControlTicket,
    action: ControlAction,
}

pub struct SessionCoordinator {
    settings: SessionSettings,
    phase: SessionPhase,
    telemetry: TelemetrySnapshot,
    last_telemetry_at: Option<DateTime<Utc>>,
    error: Option<SessionError>,
    stream_epoch: StreamEpoch,
    readiness: StreamReadinessTracker,
    stream_url: Option<String>,
    live_channel: Option<ChannelGeneration>,
    next_generation: u64,
    in_flight: Option<PendingControl>,
    next_ticket: u64,
    grace: Option<ControlTicket>,
    torn_down: bool,
}

impl SessionCoordinator {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            phase: SessionPhase::Off,
            telemetry: TelemetrySnapshot::video_off(),
            last_telemetry_at: None,
            error: None,
            stream_epoch: StreamEpoch::default(),
            readiness: StreamReadinessTracker::new(),
            stream_url: None,
            live_channel: None,
            next_generation: 0,
            in_flight: None,
            next_ticket: 0,
            grace: None,
            torn_down: false,
        }
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::Toggle => self.toggle(),
            Input::DismissError => {
                self.dismiss_error();
                Vec::new()
            }
            Input::Teardown => self.teardown(),
            Input::ControlCompleted {
                ticket,
                action,
                result,
            } => self.on_control_completed(ticket, action, result),
            Input::Channel { generation, event } => self.on_channel_event(generation, event),
            Input::StreamLoaded { epoch } => {
                self.on_stream_loaded(epoch);
                Vec::new()
            }
            Input::StreamFailed { epoch, reason } => {
                self.on_stream_failed(epoch, reason);
                Vec::new()
            }
            Input::ReadinessTimeout { epoch } => {
                self.on_readiness_timeout(epoch);
                Vec::new()
            }
            Input::GraceElapsed { ticket } => {
                self.on_grace_elapsed(ticket);
                Vec::new()
            }
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase,
            telemetry: self.telemetry.clone(),
            error: self.error.clone(),
            stream_loading: self.readiness.loading(),
            stream_url: self.stream_url.clone(),
            busy: self.is_busy(),
            last_telemetry_at: self.last_telemetry_at,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn stream_epoch(&self) -> StreamEpoch {
        self.stream_epoch
    }

    pub fn live_channel(&self) -> Option<ChannelGeneration> {
        self.live_channel
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some() || self.grace.is_some()
    }

    pub fn toggle(&mut self) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        if self.is_busy() {
            debug!(
                phase = self.phase.as_str(),
                "Toggle rejected: transition in flight"
            );
            return Vec::new();
        }

        if self.phase == SessionPhase::On {
            self.begin_stop()
        } else {
            self.begin_start()
        }
    }

    pub fn dismiss_error(&mut self) {
        if self.torn_down {
            return;
        }
        self.error = None;
        if self.phase == SessionPhase::Error {
            self.phase = SessionPhase::Off;
        }
    }

    /// Runs the stop sequence unconditionally and makes the coordinator inert.
    /// A start still in flight completes into a no-op; a stop already in
    /// flight is not repeated.
    pub fn teardown(&mut self) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.close_channel(&mut effects);
        self.close_stream(&mut effects);
        match self.in_flight {
            Some(PendingControl {
                ticket,
                action: ControlAction::Stop,
            }) => {
                debug!(ticket = %ticket, "Stop already in flight at teardown");
            }
            _ => {
                let ticket = self.issue_control(ControlAction::Stop);
                effects.push(Effect::SendControl {
                    ticket,
                    action: ControlAction::Stop,
                });
            }
        }

        self.reset();
        self.grace = None;
        self.torn_down = true;
        info!("Session torn down");
        effects
    }

    fn begin_start(&mut self) -> Vec<Effect> {
        self.phase = SessionPhase::Starting;
        self.error = None;
        self.stream_epoch = self.stream_epoch.next();
        let ticket = self.issue_control(ControlAction::Start);
        info!(ticket = %ticket, epoch = %self.stream_epoch, "Starting session");

        vec![Effect::SendControl {
            ticket,
            action: ControlAction::Start,
        }]
    }

    fn begin_stop(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        // No telemetry may land once stop has begun.
        self.close_channel(&mut effects);
        self.close_stream(&mut effects);

        let ticket = self.issue_control(ControlAction::Stop);
        effects.push(Effect::SendControl {
            ticket,
            action: ControlAction::Stop,
        });

        self.grace = Some(ticket);
        effects.push(Effect::ArmGraceTimer {
            ticket,
            after: self.settings.grace_delay,
        });
        info!(ticket = %ticket, "Stopping session");
        effects
    }

    fn on_control_completed(
        &mut self,
        ticket: ControlTicket,
        action: ControlAction,
        result: ControlResult,
    ) -> Vec<Effect> {
        if self.torn_down {
            debug!(ticket = %ticket, action = action.as_str(), "Ignoring control result after teardown");
            return Vec::new();
        }
        match self.in_flight {
            Some(pending) if pending.ticket == ticket && pending.action == action => {
                self.in_flight = None;
            }
            _ => {
                debug!(ticket = %ticket, action = action.as_str(), "Ignoring stale control result");
                return Vec::new();
            }
        }

        match action {
            ControlAction::Start => self.complete_start(result),
            ControlAction::Stop => {
                if result.is_success() {
                    debug!(message = %result.message, "Camera stop acknowledged");
                } else {
                    warn!(outcome = ?result.outcome, message = %result.message, "Camera stop failed");
                }
                Vec::new()
            }
        }
    }

    fn complete_start(&mut self, result: ControlResult) -> Vec<Effect> {
        if self.phase != SessionPhase::Starting {
            return Vec::new();
        }

        match result.outcome {
            ControlOutcome::Success => {
                self.phase = SessionPhase::On;
                self.telemetry = TelemetrySnapshot::loading();

                let generation = ChannelGeneration(self.next_generation);
                self.next_generation += 1;
                self.live_channel = Some(generation);

                let mut effects = vec![Effect::OpenChannel { generation }];
                self.open_stream(&mut effects);
                info!(generation = %generation, "Session on");
                effects
            }
            ControlOutcome::Failed => {
                warn!(message = %result.message, "Camera start failed");
                self.phase = SessionPhase::Off;
                self.reset_presentation();
                self.error = Some(SessionError::ControlFailed {
                    reason: result.message,
                });
                Vec::new()
            }
            ControlOutcome::NetworkError => {
                warn!(message = %result.message, "Camera start failed");
                self.phase = SessionPhase::Off;
                self.reset_presentation();
                self.error = Some(SessionError::Transport {
                    message: format!("Camera start failed: {}", result.message),
                });
                Vec::new()
            }
        }
    }

    fn on_channel_event(
        &mut self,
        generation: ChannelGeneration,
        event: ChannelEvent,
    ) -> Vec<Effect> {
        if self.torn_down || self.live_channel != Some(generation) {
            debug!(generation = %generation, "Dropping event from closed channel");
            return Vec::new();
        }

        match event {
            ChannelEvent::Opened => {
                info!(generation = %generation, "Telemetry channel connected");
                Vec::new()
            }
            ChannelEvent::Snapshot {
                snapshot,
                received_at,
            } => {
                self.telemetry = snapshot;
                self.last_telemetry_at = Some(received_at);
                Vec::new()
            }
            ChannelEvent::Malformed { details } => {
                warn!(error = %details, "Telemetry message parse error");
                self.error = Some(SessionError::TelemetryParse { details });
                Vec::new()
            }
            ChannelEvent::Failed { reason } => {
                warn!(error = %reason, "Telemetry channel error");
                self.fail_channel()
            }
            ChannelEvent::Closed => {
                warn!(generation = %generation, "Telemetry channel closed by backend");
                self.fail_channel()
            }
        }
    }

    fn fail_channel(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.close_channel(&mut effects);
        self.close_stream(&mut effects);
        self.phase = SessionPhase::Error;
        self.reset_presentation();
        self.error = Some(SessionError::connection_lost());
        effects
    }

    fn on_stream_loaded(&mut self, epoch: StreamEpoch) {
        if self.torn_down {
            return;
        }
        if self.readiness.on_loaded(epoch) == Resolution::Stale {
            debug!(epoch = %epoch, "Ignoring stale stream load");
        }
    }

    fn on_stream_failed(&mut self, epoch: StreamEpoch, reason: String) {
        if self.torn_down {
            return;
        }
        match self.readiness.on_failed(epoch) {
            Resolution::Stale => debug!(epoch = %epoch, "Ignoring stale stream error"),
            Resolution::Resolved | Resolution::AlreadyResolved => {
                warn!(epoch = %epoch, error = %reason, "Video stream failed to load");
                self.error = Some(SessionError::StreamLoad { reason });
            }
        }
    }

    fn on_readiness_timeout(&mut self, epoch: StreamEpoch) {
        if self.torn_down {
            return;
        }
        if self.readiness.on_timeout(epoch) == Resolution::Resolved {
            debug!(epoch = %epoch, "Stream readiness fell back to timeout");
        }
    }

    fn on_grace_elapsed(&mut self, ticket: ControlTicket) {
        if self.torn_down || self.grace != Some(ticket) {
            return;
        }
        self.grace = None;
        self.reset();
        info!("Session off");
    }

    fn issue_control(&mut self, action: ControlAction) -> ControlTicket {
        let ticket = ControlTicket(self.next_ticket);
        self.next_ticket += 1;
        self.in_flight = Some(PendingControl { ticket, action });
        ticket
    }

    /// The handle is released before the effect runs, so a second close finds
    /// nothing to close.
    fn close_channel(&mut self, effects: &mut Vec<Effect>) {
        if let Some(generation) = self.live_channel.take() {
            effects.push(Effect::CloseChannel { generation });
        }
    }

    fn open_stream(&mut self, effects: &mut Vec<Effect>) {
        let epoch = self.stream_epoch;
        match stream_url(&self.settings.api_base_url, epoch.0) {
            Ok(url) => {
                self.readiness.begin(epoch);
                self.stream_url = Some(url.clone());
                effects.push(Effect::OpenStream { epoch, url });
                effects.push(Effect::ArmReadinessTimeout {
                    epoch,
                    after: self.settings.readiness_timeout,
                });
            }
            Err(err) => {
                warn!(error = %err, "Cannot build video stream URL");
                self.error = Some(SessionError::StreamLoad {
                    reason: err.to_string(),
                });
            }
        }
    }

    fn close_stream(&mut self, effects: &mut Vec<Effect>) {
        if let Some(epoch) = self.readiness.active() {
            effects.push(Effect::CloseStream { epoch });
        }
        self.readiness.deactivate();
        self.stream_url = None;
    }

    fn reset_presentation(&mut self) {
        self.telemetry = TelemetrySnapshot::video_off();
        self.last_telemetry_at = None;
        self.readiness.deactivate();
        self.stream_url = None;
    }

    /// Full reset of client-owned session state.
    fn reset(&mut self) {
        self.phase = SessionPhase::Off;
        self.error = None;
        self.stream_epoch = self.stream_epoch.next();
        self.reset_presentation();
    }
}
