use clap::{Args, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use modbus_sniffer::{
    http_api::ApiState, setup_logging, start_http_server, HubRegistry, PacketLog, SnifferConfig,
};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct CommonArgs {
    /// Path to the config file
    #[arg(short, long, default_value = "/etc/modbus-sniffer.json")]
    config: PathBuf,

    /// Dump default config and exit
    #[arg(long = "dump-default-config")]
    dump_default: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line args
    let cli = Cli::parse();

    if cli.common.dump_default {
        let config = SnifferConfig::default();
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    // Load config
    let (config, config_found) = if cli.common.config.exists() {
        let content = std::fs::read_to_string(&cli.common.config)?;
        let config: SnifferConfig = serde_json::from_str(&content)?;
        config
            .validate()
            .map_err(modbus_sniffer::SnifferError::Config)?;
        (config, true)
    } else {
        (SnifferConfig::default(), false)
    };

    // Initialize logging
    setup_logging(&config.log)?;

    if config_found {
        info!("Loaded config from {}", cli.common.config.display());
    } else {
        info!("Config file not found, using defaults");
        info!(
            "Consider running with --dump-default-config > {}",
            cli.common.config.display()
        );
    }

    let (bindings, rejected) = config.sensor_bindings();
    for rejection in &rejected {
        warn!("{rejection}");
    }
    info!("{} sensor bindings active", bindings.len());

    let log = Arc::new(PacketLog::new(config.packet_log.clone()));
    let registry = HubRegistry::new();
    let hub = registry
        .acquire(&config.capture, &config.events, Arc::clone(&log))
        .await?;

    // Log every register update through the same fan-out consumers use.
    let (subscriber_id, mut updates) = hub.pipeline().bus().subscribe();
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            info!(
                unit_id = update.unit_id,
                register = update.register,
                raw_value = update.raw_value,
                correlation_lost = update.correlation_lost,
                "Register update"
            );
        }
    });

    let shutdown = broadcast::channel(1).0;
    if config.http.enabled {
        let state = Arc::new(ApiState {
            mode: config.capture.mode,
            store: Arc::clone(hub.pipeline().store()),
            log: Arc::clone(&log),
        });
        let bind_addr = config.http.bind_addr.clone();
        let port = config.http.port;
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = start_http_server(bind_addr, port, state, shutdown_rx).await {
                error!("HTTP server error: {e}");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    let _ = shutdown.send(());
    hub.pipeline().bus().unsubscribe(subscriber_id);
    registry.release(&hub.address()).await;

    Ok(())
}
