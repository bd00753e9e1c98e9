//! The event bus and server counters.
//!
//! Everything the management plane can observe flows through here: device lifecycle, a packet
//! activity tap, scenario edits and a periodic stats tick.  The bus is a bounded broadcast
//! channel so a slow consumer loses events instead of stalling the request pipeline.

use lifx_proto::Serial;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum EmulatorEvent {
    DeviceAdded {
        serial: Serial,
    },
    DeviceRemoved {
        serial: Serial,
    },
    /// A handler committed a state mutation on this device.
    DeviceUpdated {
        serial: Serial,
    },
    PacketRx {
        pkt_type: u16,
        name: Option<&'static str>,
        /// None for broadcast requests
        target: Option<Serial>,
        addr: SocketAddr,
    },
    PacketTx {
        pkt_type: u16,
        name: Option<&'static str>,
        serial: Serial,
        addr: SocketAddr,
    },
    ScenarioChanged {
        scope: String,
    },
    StatsTick(StatsSnapshot),
}

/// A point-in-time copy of the server counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub uptime_seconds: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub malformed_dropped: u64,
    pub unknown_type: u64,
    pub scenario_dropped: u64,
    pub devices: usize,
}

/// Monotonic counters maintained by the request pipeline.
#[derive(Debug)]
pub struct ServerStats {
    pub packets_received: AtomicU64,
    pub packets_sent: AtomicU64,
    pub malformed_dropped: AtomicU64,
    pub unknown_type: AtomicU64,
    pub scenario_dropped: AtomicU64,
    started: Instant,
}

impl Default for ServerStats {
    fn default() -> ServerStats {
        ServerStats {
            packets_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            malformed_dropped: AtomicU64::new(0),
            unknown_type: AtomicU64::new(0),
            scenario_dropped: AtomicU64::new(0),
            started: Instant::now(),
        }
    }
}

impl ServerStats {
    pub fn new() -> ServerStats {
        ServerStats::default()
    }

    pub fn snapshot(&self, devices: usize) -> StatsSnapshot {
        StatsSnapshot {
            uptime_seconds: self.started.elapsed().as_secs(),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            unknown_type: self.unknown_type.load(Ordering::Relaxed),
            scenario_dropped: self.scenario_dropped.load(Ordering::Relaxed),
            devices,
        }
    }
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Cloneable handle onto the broadcast bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EmulatorEvent>,
}

impl Default for EventBus {
    fn default() -> EventBus {
        EventBus::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> EventBus {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    /// Sends an event to whoever is listening.  No subscribers is not an error.
    pub fn publish(&self, event: EmulatorEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EmulatorEvent> {
        self.tx.subscribe()
    }
}
