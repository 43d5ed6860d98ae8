//! blinkrise: terminal client for the BlinkRise drowsiness monitor.
//!
//! ## Subcommands
//!
//! - `run` (default): interactive session; commands are read from stdin and
//!   the view is printed to stdout on every change
//! - `control <start|stop>`: send one camera control request and print the
//!   normalized result

mod alarm;
mod control_client;
mod logging;
mod operator;
mod render;
mod runtime;
mod stream_probe;
mod telemetry;

use blinkrise_core::{
    load_config, ControlAction, MonitorConfig, SessionCoordinator, SessionSettings,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::alarm::BellAlarm;
use crate::control_client::{ControlClient, HttpControlClient};
use crate::runtime::Runtime;
use crate::stream_probe::HttpStreamProbe;
use crate::telemetry::WsTelemetryChannel;

#[derive(Parser)]
#[command(name = "blinkrise")]
#[command(about = "BlinkRise drowsiness monitor client")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ~/.blinkrise/monitor.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backend base URL for camera control and the video stream
    #[arg(long, global = true, value_name = "URL")]
    api_base: Option<String>,

    /// Telemetry WebSocket URL
    #[arg(long, global = true, value_name = "URL")]
    telemetry_url: Option<String>,

    /// Wait after stopping before the session resets
    #[arg(long, global = true, value_name = "MS")]
    grace_delay_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive monitoring session
    Run {
        /// Print the view as JSON lines instead of a status line
        #[arg(long)]
        json: bool,
    },

    /// Send a single camera control request
    Control {
        #[arg(value_enum)]
        action: ActionArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ActionArg {
    Start,
    Stop,
}

impl From<ActionArg> for ControlAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Start => ControlAction::Start,
            ActionArg::Stop => ControlAction::Stop,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _logging_guard = logging::init();
    let cli = Cli::parse();
    let config = resolve_config(&cli);

    match cli.command.unwrap_or(Commands::Run { json: false }) {
        Commands::Run { json } => run_monitor(config, json).await,
        Commands::Control { action } => run_control(&config, action.into()).await,
    }
}

fn resolve_config(cli: &Cli) -> MonitorConfig {
    let mut config = match load_config(cli.config.clone()) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to load config, using defaults");
            MonitorConfig::default()
        }
    };

    if let Some(api_base) = &cli.api_base {
        config.endpoints.api_base_url = api_base.clone();
    }
    if let Some(telemetry_url) = &cli.telemetry_url {
        config.endpoints.telemetry_url = telemetry_url.clone();
    }
    if let Some(grace_delay_ms) = cli.grace_delay_ms {
        config.timing.grace_delay_ms = grace_delay_ms;
    }
    config
}

async fn run_monitor(config: MonitorConfig, json: bool) -> ExitCode {
    let timing = &config.timing;
    let control = match HttpControlClient::new(
        config.endpoints.api_base_url.clone(),
        timing.request_timeout(),
    ) {
        Ok(control) => control,
        Err(err) => {
            tracing::error!(error = %err, "Failed to build control client");
            return ExitCode::FAILURE;
        }
    };
    let probe = match HttpStreamProbe::new(timing.request_timeout()) {
        Ok(probe) => probe,
        Err(err) => {
            tracing::error!(error = %err, "Failed to build stream probe");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        api_base = %config.endpoints.api_base_url,
        telemetry = %config.endpoints.telemetry_url,
        "Starting monitor client"
    );

    let runtime = Runtime::new(
        SessionCoordinator::new(SessionSettings::from_config(&config)),
        control,
        WsTelemetryChannel::new(config.endpoints.telemetry_url.clone()),
        probe,
        BellAlarm::new(),
        timing.request_timeout(),
    );
    operator::spawn_stdin_reader(runtime.sender());
    operator::spawn_ctrl_c(runtime.sender());

    if !json {
        eprintln!("{}", operator::HELP);
    }
    let (last, _) = runtime
        .run(|view| {
            if json {
                match render::json_line(view) {
                    Ok(line) => println!("{}", line),
                    Err(err) => tracing::warn!(error = %err, "Failed to serialize view"),
                }
            } else {
                println!("{}", render::status_line(view));
            }
        })
        .await;

    tracing::info!(phase = last.phase.as_str(), "Monitor client stopped");
    ExitCode::SUCCESS
}

async fn run_control(config: &MonitorConfig, action: ControlAction) -> ExitCode {
    let control = match HttpControlClient::new(
        config.endpoints.api_base_url.clone(),
        config.timing.request_timeout(),
    ) {
        Ok(control) => control,
        Err(err) => {
            eprintln!("Failed to build control client: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let result = control.send(action).await;
    println!("{:?}: {}", result.outcome, result.message);
    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
