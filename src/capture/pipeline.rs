use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, trace};

use crate::bus::EventBus;
use crate::correlator::Correlator;
use crate::decoder;
use crate::frame::{split_frames, Frame};
use crate::packet_log::{now_timestamp, PacketLog};
use crate::registers::RegisterStore;

/// The per-payload decode path: log, reconstruct, decode, correlate,
/// store, broadcast.
///
/// CPU-only; once bytes are handed over it runs to completion for every
/// frame, so update ordering per unit matches the byte order of the
/// capture stream.
#[derive(Debug)]
pub struct Pipeline {
    correlator: Mutex<Correlator>,
    store: Arc<RegisterStore>,
    bus: Arc<EventBus>,
    log: Arc<PacketLog>,
}

impl Pipeline {
    pub fn new(store: Arc<RegisterStore>, bus: Arc<EventBus>, log: Arc<PacketLog>) -> Self {
        Self {
            correlator: Mutex::new(Correlator::new()),
            store,
            bus,
            log,
        }
    }

    pub fn store(&self) -> &Arc<RegisterStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn log(&self) -> &Arc<PacketLog> {
        &self.log
    }

    /// Feeds one UDP datagram.
    ///
    /// Datagrams stand alone: the transport preserves message boundaries,
    /// so an unparsed tail is noise, not a frame prefix, and is dropped.
    pub fn ingest_datagram(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.log.append(&now_timestamp(), data);

        let (frames, leftover) = split_frames(data);
        if !leftover.is_empty() {
            debug!(
                dropped = leftover.len(),
                "Unframed bytes at datagram boundary"
            );
        }
        self.process_frames(&frames);
    }

    /// Feeds one TCP read, carrying the leftover across calls.
    ///
    /// Only the consumed prefix is written to the packet log; a trailing
    /// partial frame waits in `leftover` for the next read.
    pub fn ingest_chunk(&self, leftover: &mut Vec<u8>, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        leftover.extend_from_slice(data);

        let (frames, remainder) = split_frames(leftover);
        let consumed = leftover.len() - remainder.len();
        if consumed > 0 {
            self.log.append(&now_timestamp(), &leftover[..consumed]);
        }
        if !remainder.is_empty() {
            trace!(kept = remainder.len(), "Partial frame retained for next read");
        }
        *leftover = remainder;
        self.process_frames(&frames);
    }

    fn process_frames(&self, frames: &[Frame]) {
        if frames.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut correlator = self
            .correlator
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for frame in frames {
            let decoded = decoder::decode(frame);
            trace!(
                unit_id = decoded.unit_id,
                function = decoded.function_code(),
                kind = %decoded.kind,
                summary = %decoded.summary,
                "Decoded frame"
            );
            for update in correlator.handle(&decoded, now) {
                self.store
                    .insert(update.unit_id, update.register, update.raw_value, now);
                self.bus.broadcast(update);
            }
        }
    }

    /// Drops correlation state; leftover bytes are owned by the capture
    /// task and die with it.
    pub fn reset(&self) {
        self.correlator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
