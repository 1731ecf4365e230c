mod backoff;
mod hub;
mod pipeline;
mod registry;

pub use backoff::BackoffStrategy;
pub use hub::{CaptureHub, HubState};
pub use pipeline::Pipeline;
pub use registry::HubRegistry;
