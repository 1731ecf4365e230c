use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::bus::EventBus;
use crate::config::{CaptureConfig, EventsConfig, HubAddress};
use crate::errors::TransportError;
use crate::packet_log::PacketLog;
use crate::registers::RegisterStore;

use super::{CaptureHub, Pipeline};

/// Owning registry of capture hubs keyed by (mode, host, port).
///
/// Multiple logical consumers of the same endpoint share one underlying
/// hub: the first `acquire` creates and starts it, the last `release`
/// stops and drops it.
#[derive(Default)]
pub struct HubRegistry {
    hubs: Mutex<HashMap<HubAddress, Entry>>,
}

struct Entry {
    hub: Arc<CaptureHub>,
    subscribers: usize,
}

impl HubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(
        &self,
        config: &CaptureConfig,
        events: &EventsConfig,
        log: Arc<PacketLog>,
    ) -> Result<Arc<CaptureHub>, TransportError> {
        let address = config.address();
        let mut hubs = self.hubs.lock().await;

        if let Some(entry) = hubs.get_mut(&address) {
            entry.subscribers += 1;
            return Ok(Arc::clone(&entry.hub));
        }

        let store = Arc::new(RegisterStore::new());
        let bus = Arc::new(EventBus::new(events.replay_history, events.inbox_capacity));
        let pipeline = Arc::new(Pipeline::new(store, bus, log));
        let hub = Arc::new(CaptureHub::new(config.clone(), pipeline));
        hub.start().await?;
        info!("Capture hub started for {address}");

        hubs.insert(
            address,
            Entry {
                hub: Arc::clone(&hub),
                subscribers: 1,
            },
        );
        Ok(hub)
    }

    pub async fn release(&self, address: &HubAddress) {
        let orphaned = {
            let mut hubs = self.hubs.lock().await;
            match hubs.get_mut(address) {
                Some(entry) => {
                    entry.subscribers = entry.subscribers.saturating_sub(1);
                    if entry.subscribers == 0 {
                        hubs.remove(address).map(|entry| entry.hub)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        if let Some(hub) = orphaned {
            hub.stop().await;
            info!("Capture hub stopped for {address}");
        }
    }

    /// Stops every hub regardless of its reference count.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<CaptureHub>> = {
            let mut hubs = self.hubs.lock().await;
            hubs.drain().map(|(_, entry)| entry.hub).collect()
        };
        for hub in drained {
            hub.stop().await;
        }
    }

    pub async fn hub_count(&self) -> usize {
        self.hubs.lock().await.len()
    }
}
