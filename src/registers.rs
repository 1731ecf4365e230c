//! Last-value cache for observed holding registers.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Instant;

/// The last value seen for one (unit, register) pair.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegisterSample {
    pub unit_id: u8,
    pub register: u16,
    pub raw_value: u16,
    pub updated_at: Instant,
}

/// One register update flowing from the decode path to subscribers.
///
/// `correlation_lost` marks values from an FC03 response that had no
/// pending request to pair with; their addresses are counted from zero.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegisterUpdate {
    pub unit_id: u8,
    pub register: u16,
    pub raw_value: u16,
    pub correlation_lost: bool,
}

/// Concurrent map of (unit, register) to the latest sample.
///
/// Mutated only on the decode path; serving threads read concurrently
/// through the read half of the lock. Writes always overwrite.
#[derive(Debug, Default)]
pub struct RegisterStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    samples: HashMap<(u8, u16), RegisterSample>,
    // First-insertion order, for the newest-first register-only lookup.
    order: Vec<(u8, u16)>,
}

impl RegisterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, unit_id: u8, register: u16, raw_value: u16, now: Instant) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let key = (unit_id, register);
        let sample = RegisterSample {
            unit_id,
            register,
            raw_value,
            updated_at: now,
        };
        if inner.samples.insert(key, sample).is_none() {
            inner.order.push(key);
        }
    }

    pub fn get(&self, unit_id: u8, register: u16) -> Option<RegisterSample> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.samples.get(&(unit_id, register)).copied()
    }

    /// Latest sample for `register` across all units, scanning the most
    /// recently inserted pairs first.
    pub fn latest_for_register(&self, register: u16) -> Option<RegisterSample> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .order
            .iter()
            .rev()
            .find(|(_, observed)| *observed == register)
            .and_then(|key| inner.samples.get(key))
            .copied()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
