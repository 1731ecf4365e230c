use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, PoisonError};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::config::{CaptureConfig, ConnectionMode, HubAddress};
use crate::errors::{IoOperation, TransportError};

use super::{BackoffStrategy, Pipeline};

/// Read size for the TCP client, matching typical capture sources.
const TCP_READ_CHUNK: usize = 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HubState {
    Idle,
    Running,
    Stopping,
}

/// One capture endpoint: a bound UDP socket or a reconnecting TCP client
/// feeding the decode pipeline.
///
/// The hub owns its transport and all mutable capture state; consumers
/// only ever hold subscriber inboxes obtained through the pipeline's
/// event bus.
pub struct CaptureHub {
    config: CaptureConfig,
    pipeline: Arc<Pipeline>,
    shutdown: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
    state: std::sync::Mutex<HubState>,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
}

impl CaptureHub {
    pub fn new(config: CaptureConfig, pipeline: Arc<Pipeline>) -> Self {
        Self {
            config,
            pipeline,
            shutdown: broadcast::channel(1).0,
            task: Mutex::new(None),
            state: std::sync::Mutex::new(HubState::Idle),
            local_addr: std::sync::Mutex::new(None),
        }
    }

    pub fn address(&self) -> HubAddress {
        self.config.address()
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn state(&self) -> HubState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Local address of the bound UDP socket while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: HubState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Starts the capture task. Bind failures surface here; once the hub
    /// is running, transport errors are handled on the task itself.
    /// Calling `start` on a running hub is a no-op.
    pub async fn start(&self) -> Result<(), TransportError> {
        if self.state() == HubState::Running {
            return Ok(());
        }

        let shutdown_rx = self.shutdown.subscribe();
        let pipeline = Arc::clone(&self.pipeline);

        let handle = match self.config.mode {
            ConnectionMode::Udp => {
                let socket = bind_udp(&self.config)?;
                let bound = socket.local_addr().ok();
                *self
                    .local_addr
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = bound;
                info!(
                    "UDP capture listening on {}",
                    bound.map_or_else(|| self.address().to_string(), |addr| addr.to_string())
                );
                let buffer_size = self.config.buffer_size;
                tokio::spawn(udp_capture(socket, buffer_size, pipeline, shutdown_rx))
            }
            ConnectionMode::Tcp => {
                let config = self.config.clone();
                tokio::spawn(tcp_capture(config, pipeline, shutdown_rx))
            }
        };

        *self.task.lock().await = Some(handle);
        self.set_state(HubState::Running);
        Ok(())
    }

    /// Cooperative stop: signal the task, await its termination, drain
    /// correlation state.
    pub async fn stop(&self) {
        self.set_state(HubState::Stopping);
        let _ = self.shutdown.send(());

        if let Some(handle) = self.task.lock().await.take() {
            if let Err(join_error) = handle.await {
                if join_error.is_panic() {
                    error!("Capture task panicked: {join_error}");
                }
            }
        }

        self.pipeline.reset();
        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.set_state(HubState::Idle);
        debug!("Capture hub for {} stopped", self.address());
    }
}

fn bind_udp(config: &CaptureConfig) -> Result<UdpSocket, TransportError> {
    let endpoint = format!("{}:{}", config.host, config.port);

    let addr = endpoint
        .to_socket_addrs()
        .and_then(|mut addrs| {
            addrs
                .next()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "address did not resolve"))
        })
        .map_err(|source| TransportError::bind(endpoint.as_str(), source))?;

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|source| TransportError::bind(endpoint.as_str(), source))?;
    socket
        .set_reuse_address(true)
        .map_err(|source| TransportError::io(IoOperation::Configure, endpoint.as_str(), source))?;
    socket
        .bind(&addr.into())
        .map_err(|source| TransportError::bind(endpoint.as_str(), source))?;
    socket
        .set_nonblocking(true)
        .map_err(|source| TransportError::io(IoOperation::Configure, endpoint.as_str(), source))?;

    let socket = UdpSocket::from_std(socket.into())
        .map_err(|source| TransportError::io(IoOperation::Configure, endpoint.as_str(), source))?;

    if let Some(group) = config.multicast_group {
        socket
            .join_multicast_v4(group, config.multicast_interface)
            .map_err(|source| TransportError::Multicast {
                group,
                interface: config.multicast_interface,
                source,
            })?;
        info!(
            "Joined multicast group {group} via {}",
            config.multicast_interface
        );
    }

    Ok(socket)
}

async fn udp_capture(
    socket: UdpSocket,
    buffer_size: usize,
    pipeline: Arc<Pipeline>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("UDP capture task received shutdown signal");
                break;
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => {
                    trace!(%peer, len, "Datagram received");
                    pipeline.ingest_datagram(&buf[..len]);
                }
                Err(error) => {
                    // Single-shot failures do not tear the endpoint down.
                    error!("UDP socket error: {error}");
                }
            }
        }
    }
}

async fn tcp_capture(
    config: CaptureConfig,
    pipeline: Arc<Pipeline>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let endpoint = format!("{}:{}", config.host, config.port);
    let mut backoff = BackoffStrategy::new(config.backoff.clone());
    let mut leftover: Vec<u8> = Vec::new();

    'reconnect: loop {
        let mut stream = tokio::select! {
            _ = shutdown_rx.recv() => break,
            connected = TcpStream::connect(endpoint.as_str()) => match connected {
                Ok(stream) => stream,
                Err(error) => {
                    let delay = backoff.next_backoff();
                    warn!("Failed to connect to {endpoint}: {error}; retrying in {delay:?}");
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = sleep(delay) => {}
                    }
                    continue;
                }
            }
        };

        info!("TCP capture connected to {endpoint}");
        backoff.reset();
        leftover.clear();

        let mut buf = [0u8; TCP_READ_CHUNK];
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break 'reconnect,
                read = stream.read(&mut buf) => match read {
                    Ok(0) => {
                        warn!("TCP capture connection closed by {endpoint}");
                        break;
                    }
                    Ok(len) => pipeline.ingest_chunk(&mut leftover, &buf[..len]),
                    Err(error) => {
                        warn!("TCP read error from {endpoint}: {error}");
                        break;
                    }
                }
            }
        }

        drop(stream);
        leftover.clear();

        let delay = backoff.next_backoff();
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = sleep(delay) => {}
        }
    }

    debug!("TCP capture task for {endpoint} finished");
}
