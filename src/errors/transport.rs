use std::fmt;
use std::net::Ipv4Addr;

use thiserror::Error;

/// Which socket operation an I/O error belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IoOperation {
    Bind,
    Configure,
    Connect,
    Read,
}

impl fmt::Display for IoOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoOperation::Bind => write!(f, "bind"),
            IoOperation::Configure => write!(f, "configure"),
            IoOperation::Connect => write!(f, "connect"),
            IoOperation::Read => write!(f, "read"),
        }
    }
}

/// Fatal transport failures surfaced from `CaptureHub::start`.
///
/// Transient socket errors are logged and retried on the capture task and
/// never take this form.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to join multicast group {group} on {interface}: {source}")]
    Multicast {
        group: Ipv4Addr,
        interface: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {operation} failed on {details}: {source}")]
    Io {
        operation: IoOperation,
        details: String,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    pub fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        TransportError::Bind {
            addr: addr.into(),
            source,
        }
    }

    pub fn io(operation: IoOperation, details: impl Into<String>, source: std::io::Error) -> Self {
        TransportError::Io {
            operation,
            details: details.into(),
            source,
        }
    }
}
