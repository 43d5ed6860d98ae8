//! Status-line and JSON rendering of the session view.

use blinkrise_core::{SessionPhase, SessionView};

pub fn status_line(view: &SessionView) -> String {
    let telemetry = &view.telemetry;
    let mut line = format!(
        "[{}{}] {} | EAR {:.3} | blinks {} | drowsy {:.0}%",
        phase_label(view.phase),
        if view.busy { "…" } else { "" },
        telemetry.status,
        telemetry.ear,
        telemetry.blink,
        telemetry.probability * 100.0,
    );

    if telemetry.alarm_on {
        line.push_str(" | ALARM");
    }
    if view.phase == SessionPhase::On {
        line.push_str(if view.stream_loading {
            " | video loading"
        } else {
            " | video ready"
        });
    }
    if let Some(error) = &view.error {
        line.push_str(&format!(" | error: {}", error));
    }
    line
}

/// One JSON object per line.
pub fn json_line(view: &SessionView) -> Result<String, serde_json::Error> {
    serde_json::to_string(view)
}

fn phase_label(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Off => "OFF",
        SessionPhase::Starting => "STARTING",
        SessionPhase::On => "ON",
        SessionPhase::Error => "ERROR",
    }
}
