use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use callbridge_config::{validate, CallbridgeConfig};
use callbridge_core::{CallRequest, CallStatus};
use callbridge_engine::CallRouter;
use callbridge_logging::init_logging;
use callbridge_providers::{ElevenLabsAdapter, UltravoxAdapter};
use callbridge_telephony::TwilioGateway;

#[derive(Parser)]
#[command(name = "callbridge")]
#[command(about = "Voice call orchestration over AI backends")]
#[command(version)]
struct Cli {
    /// Path to the YAML settings file
    #[arg(short, long, default_value = "callbridge.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the settings file and report every finding
    CheckConfig,
    /// Place one call described by a JSON request file
    Call {
        /// Path to a JSON `CallRequest` document
        request: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::CheckConfig => Ok(check_config(&config)),
        Commands::Call { request } => {
            init_logging(&config.logging.log_dir, &config.logging.level);
            place_call(&config, &request).await
        }
    }
}

fn load_config(path: &Path) -> Result<CallbridgeConfig> {
    let doc = std::fs::read_to_string(path)
        .with_context(|| format!("reading settings file {}", path.display()))?;
    CallbridgeConfig::from_yaml(&doc)
        .with_context(|| format!("parsing settings file {}", path.display()))
}

fn check_config(config: &CallbridgeConfig) -> ExitCode {
    let report = validate(config);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for error in &report.errors {
        println!("error: {error}");
    }
    if report.is_valid() {
        println!("configuration is valid");
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn place_call(config: &CallbridgeConfig, request_path: &Path) -> Result<ExitCode> {
    let report = validate(config);
    if !report.is_valid() {
        for error in &report.errors {
            eprintln!("error: {error}");
        }
        anyhow::bail!("settings are invalid; run check-config");
    }

    let doc = std::fs::read_to_string(request_path)
        .with_context(|| format!("reading request file {}", request_path.display()))?;
    let request: CallRequest =
        serde_json::from_str(&doc).context("parsing call request JSON")?;

    let router = build_router(config);
    let handle = router.route_call(request)?;
    info!(call_id = %handle.call_id, "call submitted");

    // Wait for the leg to be handed to the gateway (or for a failure).
    // Telephony progress past this point arrives on the status-callback
    // channel, which belongs to the embedding application.
    let deadline = Duration::from_millis(config.engine.workflow_deadline_ms + 1_000);
    let settled = tokio::time::timeout(deadline, async {
        loop {
            let state = router.get_status(&handle.call_id)?;
            if state.status.is_terminal() || state.status == CallStatus::TelephonyRequested {
                return Ok::<_, callbridge_core::CallError>(state);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    })
    .await
    .context("call did not settle within the workflow deadline")??;

    println!("{}", serde_json::to_string_pretty(&settled)?);
    let placed = matches!(
        settled.status,
        CallStatus::TelephonyRequested | CallStatus::Connected | CallStatus::Completed
    );
    Ok(if placed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn build_router(config: &CallbridgeConfig) -> CallRouter {
    let agent = Arc::new(UltravoxAdapter::new(
        config.ultravox.clone(),
        config.twilio.service_number.clone(),
    ));
    let synthesis = Arc::new(ElevenLabsAdapter::new(config.elevenlabs.clone()));
    let gateway = Arc::new(TwilioGateway::new(config.twilio.clone()));
    CallRouter::new(agent, synthesis, gateway, &config.engine)
}
