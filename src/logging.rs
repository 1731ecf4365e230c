use time::UtcOffset;
use tracing_subscriber::{
    fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use crate::{config::LoggingConfig, SnifferError};

pub fn setup_logging(config: &LoggingConfig) -> Result<(), SnifferError> {
    // Validate logging config before proceeding
    config.validate().map_err(SnifferError::Config)?;

    let timer = OffsetTime::new(
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        time::format_description::well_known::Rfc3339,
    );

    // Determine base level filter
    let base_level = config.get_level_filter();

    // Build the EnvFilter
    let mut env_filter = EnvFilter::default().add_directive(base_level.into());

    // If trace_frames is enabled, add more specific filtering
    if config.trace_frames {
        env_filter = env_filter
            .add_directive("modbus_sniffer::capture=trace".parse().unwrap())
            .add_directive("modbus_sniffer::bus=trace".parse().unwrap());
    }

    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(config.thread_ids)
        .with_thread_names(config.thread_names)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_level(true)
        .with_timer(timer);

    let layer = if config.format == "json" {
        layer.json().with_filter(env_filter).boxed()
    } else {
        layer.with_filter(env_filter).boxed()
    };

    Registry::default().with(layer).try_init().map_err(|e| {
        SnifferError::init(format!("Failed to initialize logging: {e}"))
    })?;

    Ok(())
}
