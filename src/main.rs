mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Mutex;

use cli::commands::Commands;
use cli::{Cli, ProbeCommandHandler, TelemetryCommandHandler};
use netscout::collectors::TelemetrySampler;
use netscout::config::Settings;
use netscout::probes::builtin_registry;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let sampler = Arc::new(Mutex::new(TelemetrySampler::new(settings.telemetry.clone())));

    match cli.command {
        Commands::Probes { json } => {
            let registry = builtin_registry(&settings, sampler)?;
            ProbeCommandHandler::new(registry).handle_probes_command(json)?;
        }
        Commands::Describe { id } => {
            let registry = builtin_registry(&settings, sampler)?;
            ProbeCommandHandler::new(registry).handle_describe_command(&id)?;
        }
        Commands::Run {
            id,
            params,
            params_json,
            compact,
        } => {
            let registry = builtin_registry(&settings, sampler)?;
            ProbeCommandHandler::new(registry)
                .handle_run_command(&id, params, params_json, compact)
                .await?;
        }
        Commands::Status {
            measurement_duration,
            json,
        } => {
            TelemetryCommandHandler::new(sampler, settings.telemetry.clone())
                .handle_status_command(measurement_duration, json)
                .await?;
        }
        Commands::Watch {
            interval,
            count,
            json,
        } => {
            TelemetryCommandHandler::new(sampler, settings.telemetry.clone())
                .handle_watch_command(interval, count, json)
                .await?;
        }
    }

    Ok(())
}
