//! Multi-subscriber fan-out of register updates.
//!
//! Joining subscribers receive a short replay of recent events before any
//! new one. Pushes happen outside the subscriber-set mutex and never
//! block; an inbox that cannot accept an event gets its subscriber
//! evicted, so slow consumers cannot stall the decode path.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use crate::registers::RegisterUpdate;

pub const DEFAULT_REPLAY_HISTORY: usize = 2;
pub const DEFAULT_INBOX_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubscriberId(u64);

#[derive(Debug)]
struct Subscriber {
    id: SubscriberId,
    sender: mpsc::Sender<RegisterUpdate>,
}

#[derive(Debug)]
struct Inner {
    subscribers: Vec<Subscriber>,
    replay: VecDeque<RegisterUpdate>,
    replay_capacity: usize,
    inbox_capacity: usize,
    next_id: u64,
}

#[derive(Debug)]
pub struct EventBus {
    inner: Mutex<Inner>,
}

impl EventBus {
    pub fn new(replay_capacity: usize, inbox_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                subscribers: Vec::new(),
                replay: VecDeque::with_capacity(replay_capacity),
                replay_capacity,
                // The inbox must at least hold the replay handed to a
                // fresh subscriber.
                inbox_capacity: inbox_capacity.max(replay_capacity).max(1),
                next_id: 0,
            }),
        }
    }

    /// Registers a new subscriber and primes its inbox with the replay
    /// buffer.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<RegisterUpdate>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let (sender, receiver) = mpsc::channel(inner.inbox_capacity);
        for &event in &inner.replay {
            let _ = sender.try_send(event);
        }
        let id = SubscriberId(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.push(Subscriber { id, sender });
        (id, receiver)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.subscribers.retain(|subscriber| subscriber.id != id);
    }

    /// Delivers `event` to every live subscriber in publication order.
    pub fn broadcast(&self, event: RegisterUpdate) {
        let senders: Vec<(SubscriberId, mpsc::Sender<RegisterUpdate>)> = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.replay_capacity > 0 {
                if inner.replay.len() == inner.replay_capacity {
                    inner.replay.pop_front();
                }
                inner.replay.push_back(event);
            }
            inner
                .subscribers
                .iter()
                .map(|subscriber| (subscriber.id, subscriber.sender.clone()))
                .collect()
        };

        let mut dead = Vec::new();
        for (id, sender) in senders {
            if sender.try_send(event).is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            debug!(evicted = dead.len(), "Removing unresponsive subscribers");
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner
                .subscribers
                .retain(|subscriber| !dead.contains(&subscriber.id));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_HISTORY, DEFAULT_INBOX_CAPACITY)
    }
}
