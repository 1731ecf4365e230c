pub mod bus;
pub mod capture;
pub mod config;
pub mod correlator;
pub mod crc;
pub mod decoder;
pub mod errors;
pub mod frame;
pub mod history;
pub mod http_api;
pub mod logging;
pub mod packet_log;
pub mod registers;

pub use bus::{EventBus, SubscriberId};
pub use capture::{BackoffStrategy, CaptureHub, HubRegistry, HubState, Pipeline};
pub use config::{
    BackoffConfig, CaptureConfig, ConnectionMode, EventsConfig, HttpConfig, HubAddress,
    LoggingConfig, SensorBinding, SnifferConfig,
};
pub use correlator::Correlator;
pub use decoder::{DecodedFrame, FrameKind, Pdu};
pub use errors::{ConfigValidationError, IoOperation, SnifferError, TransportError};
pub use frame::{split_frames, Frame};
pub use history::{HistoryFilter, HistoryReport};
pub use http_api::start_http_server;
pub use logging::setup_logging;
pub use packet_log::{LogEntry, PacketLog};
pub use registers::{RegisterSample, RegisterStore, RegisterUpdate};
