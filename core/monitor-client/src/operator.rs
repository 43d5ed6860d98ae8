//! Operator input: stdin commands and Ctrl-C.

use blinkrise_core::Input;
use std::io::BufRead;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

pub const HELP: &str = "Commands: <enter>/t toggle camera, d dismiss error, q quit";

/// Maps one stdin line to an input. Unknown commands yield `None`.
pub fn parse_command(line: &str) -> Option<Input> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "t" | "toggle" => Some(Input::Toggle),
        "d" | "dismiss" => Some(Input::DismissError),
        "q" | "quit" | "exit" => Some(Input::Teardown),
        _ => None,
    }
}

/// Reads commands until EOF on a dedicated thread, since stdin reads block.
/// EOF counts as quit.
pub fn spawn_stdin_reader(inputs: UnboundedSender<Input>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!(error = %err, "Failed to read operator input");
                    break;
                }
            };
            match parse_command(&line) {
                Some(input) => {
                    if inputs.send(input).is_err() {
                        return;
                    }
                }
                None => eprintln!("{}", HELP),
            }
        }
        debug!("Operator input closed");
        let _ = inputs.send(Input::Teardown);
    });
}

pub fn spawn_ctrl_c(inputs: UnboundedSender<Input>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                debug!("Ctrl-C received");
                let _ = inputs.send(Input::Teardown);
            }
            Err(err) => warn!(error = %err, "Failed to listen for Ctrl-C"),
        }
    });
}
