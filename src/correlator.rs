//! Pairs Read Holding Registers responses with their originating request.
//!
//! RTU responses do not carry the start address; the only recoverable
//! linkage is temporal ordering within a single unit-id channel, bounded
//! by a monotonic TTL on unmatched requests.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::decoder::{DecodedFrame, Pdu};
use crate::registers::RegisterUpdate;

/// How long an unmatched request may wait for its response.
pub const PENDING_REQUEST_TTL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug)]
struct PendingRequest {
    start_address: u16,
    quantity: u16,
    queued_at: Instant,
}

#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<u8, VecDeque<PendingRequest>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one decoded frame through the correlation rules and returns
    /// the register updates it produces.
    ///
    /// FC03 requests are queued per unit; an FC03 response consumes the
    /// head of its unit's queue (base address 0 with the lost flag set
    /// when the queue is empty). FC06 and FC16 writes carry their own
    /// addresses and bypass the queue entirely.
    pub fn handle(&mut self, frame: &DecodedFrame, now: Instant) -> Vec<RegisterUpdate> {
        if frame.is_exception() {
            return Vec::new();
        }

        let unit_id = frame.unit_id;
        match (frame.function_code(), &frame.pdu) {
            (3, Pdu::ReadRequest { start_address, quantity }) => {
                let queue = self.pending.entry(unit_id).or_default();
                queue.push_back(PendingRequest {
                    start_address: *start_address,
                    quantity: *quantity,
                    queued_at: now,
                });
                Self::purge_stale(queue, now);
                Vec::new()
            }
            (3, Pdu::RegisterResponse { values }) => {
                let queue = self.pending.entry(unit_id).or_default();
                Self::purge_stale(queue, now);
                let (start_address, correlation_lost) = match queue.pop_front() {
                    Some(request) => {
                        if usize::from(request.quantity) != values.len() {
                            debug!(
                                unit_id,
                                expected = request.quantity,
                                got = values.len(),
                                "Response length differs from the paired request"
                            );
                        }
                        (request.start_address, false)
                    }
                    None => (0, true),
                };
                Self::spread(unit_id, start_address, values, correlation_lost)
            }
            (6, Pdu::WriteSingle { address, value }) => vec![RegisterUpdate {
                unit_id,
                register: *address,
                raw_value: *value,
                correlation_lost: false,
            }],
            (16, Pdu::WriteRegistersRequest { start_address, values, .. }) => {
                Self::spread(unit_id, *start_address, values, false)
            }
            _ => Vec::new(),
        }
    }

    /// Drops all pending state, e.g. when a capture hub stops.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn spread(
        unit_id: u8,
        start_address: u16,
        values: &[u16],
        correlation_lost: bool,
    ) -> Vec<RegisterUpdate> {
        values
            .iter()
            .enumerate()
            .map(|(offset, &raw_value)| RegisterUpdate {
                unit_id,
                register: start_address.wrapping_add(offset as u16),
                raw_value,
                correlation_lost,
            })
            .collect()
    }

    fn purge_stale(queue: &mut VecDeque<PendingRequest>, now: Instant) {
        while queue
            .front()
            .is_some_and(|request| now.duration_since(request.queued_at) > PENDING_REQUEST_TTL)
        {
            queue.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_parts;

    fn read_request(unit_id: u8, start: u16, quantity: u16) -> DecodedFrame {
        let mut payload = start.to_be_bytes().to_vec();
        payload.extend_from_slice(&quantity.to_be_bytes());
        decode_parts(unit_id, 0x03, &payload)
    }

    fn read_response(unit_id: u8, values: &[u16]) -> DecodedFrame {
        let mut payload = vec![(values.len() * 2) as u8];
        for value in values {
            payload.extend_from_slice(&value.to_be_bytes());
        }
        decode_parts(unit_id, 0x03, &payload)
    }

    #[test]
    fn test_request_response_pairing() {
        let mut correlator = Correlator::new();
        let now = Instant::now();

        assert!(correlator.handle(&read_request(1, 0, 2), now).is_empty());
        let updates = correlator.handle(&read_response(1, &[10, 20]), now);

        assert_eq!(updates.len(), 2);
        assert_eq!((updates[0].register, updates[0].raw_value), (0, 10));
        assert_eq!((updates[1].register, updates[1].raw_value), (1, 20));
        assert!(updates.iter().all(|update| !update.correlation_lost));
    }

    #[test]
    fn test_response_without_request_flags_lost_correlation() {
        let mut correlator = Correlator::new();
        let updates = correlator.handle(&read_response(2, &[255]), Instant::now());

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].unit_id, 2);
        assert_eq!(updates[0].register, 0);
        assert_eq!(updates[0].raw_value, 255);
        assert!(updates[0].correlation_lost);
    }

    #[test]
    fn test_pending_request_expires() {
        let mut correlator = Correlator::new();
        let queued_at = Instant::now();
        correlator.handle(&read_request(1, 100, 1), queued_at);

        let late = queued_at + Duration::from_millis(5001);
        let updates = correlator.handle(&read_response(1, &[7]), late);
        assert_eq!(updates[0].register, 0);
        assert!(updates[0].correlation_lost);
    }

    #[test]
    fn test_pending_request_survives_under_ttl() {
        let mut correlator = Correlator::new();
        let queued_at = Instant::now();
        correlator.handle(&read_request(1, 100, 1), queued_at);

        let almost = queued_at + Duration::from_millis(4999);
        let updates = correlator.handle(&read_response(1, &[7]), almost);
        assert_eq!(updates[0].register, 100);
        assert!(!updates[0].correlation_lost);
    }

    #[test]
    fn test_short_response_still_consumes_head() {
        let mut correlator = Correlator::new();
        let now = Instant::now();
        correlator.handle(&read_request(1, 50, 4), now);

        let updates = correlator.handle(&read_response(1, &[9]), now);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].register, 50);

        // The head request is spent; a second response has nothing to pair.
        let updates = correlator.handle(&read_response(1, &[8]), now);
        assert!(updates[0].correlation_lost);
    }

    #[test]
    fn test_long_response_assigns_consecutive_addresses() {
        let mut correlator = Correlator::new();
        let now = Instant::now();
        correlator.handle(&read_request(1, 10, 1), now);

        let updates = correlator.handle(&read_response(1, &[1, 2, 3]), now);
        let registers: Vec<u16> = updates.iter().map(|update| update.register).collect();
        assert_eq!(registers, vec![10, 11, 12]);
    }

    #[test]
    fn test_units_are_independent() {
        let mut correlator = Correlator::new();
        let now = Instant::now();
        correlator.handle(&read_request(1, 100, 1), now);

        // Unit 2 never sent a request.
        let updates = correlator.handle(&read_response(2, &[5]), now);
        assert!(updates[0].correlation_lost);

        // Unit 1's request is still pending.
        let updates = correlator.handle(&read_response(1, &[5]), now);
        assert_eq!(updates[0].register, 100);
    }

    #[test]
    fn test_requests_pair_in_fifo_order() {
        let mut correlator = Correlator::new();
        let now = Instant::now();
        correlator.handle(&read_request(1, 0, 1), now);
        correlator.handle(&read_request(1, 40, 1), now);

        assert_eq!(correlator.handle(&read_response(1, &[1]), now)[0].register, 0);
        assert_eq!(correlator.handle(&read_response(1, &[2]), now)[0].register, 40);
    }

    #[test]
    fn test_write_single_bypasses_queue() {
        let mut correlator = Correlator::new();
        let frame = decode_parts(1, 0x06, &[0x00, 0x05, 0x00, 0x64]);
        let updates = correlator.handle(&frame, Instant::now());

        assert_eq!(updates.len(), 1);
        assert_eq!((updates[0].register, updates[0].raw_value), (5, 100));
    }

    #[test]
    fn test_write_multiple_emits_synchronously() {
        let mut correlator = Correlator::new();
        let frame = decode_parts(
            1,
            0x10,
            &[0x00, 0x10, 0x00, 0x02, 0x04, 0x00, 0x01, 0x00, 0x02],
        );
        let updates = correlator.handle(&frame, Instant::now());

        assert_eq!(updates.len(), 2);
        assert_eq!((updates[0].register, updates[0].raw_value), (16, 1));
        assert_eq!((updates[1].register, updates[1].raw_value), (17, 2));
    }

    #[test]
    fn test_exception_emits_nothing() {
        let mut correlator = Correlator::new();
        let frame = decode_parts(1, 0x83, &[0x02]);
        assert!(correlator.handle(&frame, Instant::now()).is_empty());
    }
}
