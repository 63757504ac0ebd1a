use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use porchlight::Config;
use porchlight::Controller;
use porchlight::SunPhaseLoop;
use porchlight::alert;
use porchlight::api;
use porchlight::controller::event_channel;
use porchlight::integrations::mqtt::MqttGateway;
use porchlight::integrations::mqtt::RumqttcClient;
use porchlight::schedule::Schedule;
use porchlight::schedule::SystemClock;
use porchlight::schedule::SolarOracle;
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
#[command(version, about = "Turns porch lights on and off by motion and the sun")]
struct Args {
    /// Path to the configuration file
    #[arg(default_value = "porchlight.toml")]
    config: PathBuf,

    /// Log at debug level regardless of the configured level
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets(args.debug))
        .init();

    tracing::info!("porchlight starting");
    tracing::info!("Loaded config from: {}", args.config.display());
    tracing::info!(
        "Location: {}, {} (timezone: {})",
        config.location.latitude,
        config.location.longitude,
        config.location.timezone
    );

    let oracle = SolarOracle::from_config(&config.location)?;
    let schedule = Schedule::new(Arc::new(oracle), Arc::new(SystemClock), config.location.tz()?);
    let alerts = alert::from_config(&config.alerts)?;

    let (events_tx, events_rx) = event_channel();
    let client = RumqttcClient::new(&config.mqtt);
    let (gateway, binding, mqtt_task) =
        MqttGateway::start(client, &config.mqtt, &config.devices, events_tx)
            .await
            .context("Failed to bind devices")?;

    let controller = Controller::new(
        binding,
        schedule,
        Arc::new(gateway),
        alerts,
        config.controller.motion_timeout(),
    );

    let sun_task = tokio::spawn(
        SunPhaseLoop::new(
            controller.clone(),
            config.controller.oracle_retry_initial(),
            config.controller.oracle_retry_max(),
        )
        .run(),
    );

    let controller_task = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run(events_rx).await })
    };

    let api = if config.api.enabled {
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let task = tokio::spawn(api::serve(
            config.api.listen.clone(),
            config.api.port,
            controller.clone(),
            shutdown_rx,
        ));
        Some((shutdown_tx, task))
    } else {
        None
    };

    tracing::info!("Press Ctrl+C to exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }

    sun_task.abort();
    mqtt_task.abort();
    controller_task.abort();

    if let Some((shutdown_tx, task)) = api {
        let _ = shutdown_tx.send(());
        match task.await {
            Ok(Err(e)) => tracing::error!("HTTP API server failed: {:#}", e),
            Err(e) => tracing::error!("HTTP API task panicked: {}", e),
            Ok(Ok(())) => {}
        }
    }

    tracing::info!("porchlight shutdown complete");

    Ok(())
}
