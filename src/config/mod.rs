mod backoff;
mod capture;
mod events;
mod http;
mod logging;
mod sensors;
mod sniffer;

pub use backoff::Config as BackoffConfig;
pub use capture::Config as CaptureConfig;
pub use capture::{ConnectionMode, HubAddress};
pub use events::Config as EventsConfig;
pub use http::Config as HttpConfig;
pub use logging::Config as LoggingConfig;
pub use sensors::{
    default_bindings, ingest_bindings, RawSensorBinding, SensorBinding,
    DEVICE_TYPE_IMMERGAS_AUDAX_12,
};
pub use sniffer::Config as SnifferConfig;
