//! An emulator for the LIFX LAN protocol.
//!
//! This crate impersonates a fleet of virtual lighting devices (color and white bulbs, infrared
//! and HEV models, multizone strips, matrix tiles, relay switches) over the real binary wire
//! protocol, so client libraries can be exercised without physical hardware.
//!
//! The pieces, leaves first:
//!
//!  * [state] — the per-device record, with capability-gated sub-state
//!  * [factory] — device construction from the product registry
//!  * [handlers] — packet-type to behavior dispatch, one module per protocol namespace
//!  * [scenarios] — fault injection: drop/delay/truncate/corrupt rules at five scopes
//!  * [manager] — the live device collection and request routing
//!  * [persist] — debounced, crash-safe state persistence
//!  * [events] — the broadcast bus the management plane subscribes to
//!  * [server] — the UDP socket loop tying it all together
//!
//! Wire types come from the `lifx-proto` crate.
//!
//! # Quick start
//!
//! ```no_run
//! use lifx_emu::events::EventBus;
//! use lifx_emu::manager::DeviceManager;
//! use lifx_emu::scenarios::ScenarioEngine;
//! use lifx_emu::server::{EmulatedServer, ServerConfig};
//! use lifx_emu::factory;
//! use std::sync::Arc;
//!
//! # async fn start() -> std::io::Result<()> {
//! let events = EventBus::default();
//! let devices = Arc::new(DeviceManager::new(events.clone()));
//! devices.add(factory::create_color_light("d073d5000001".parse().unwrap()));
//!
//! let server = EmulatedServer::bind(
//!     &ServerConfig::default(),
//!     devices,
//!     Arc::new(ScenarioEngine::new()),
//!     events,
//!     None,
//! )
//! .await?;
//! server.run().await;
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod factory;
pub mod handlers;
pub mod manager;
pub mod persist;
pub mod scenarios;
pub mod server;
pub mod state;

pub use events::{EmulatorEvent, EventBus};
pub use factory::DeviceOverrides;
pub use manager::{Device, DeviceManager};
pub use persist::PersistenceEngine;
pub use scenarios::{ScenarioConfig, ScenarioEngine, Scope};
pub use server::{EmulatedServer, ServerConfig};
pub use state::{Capabilities, DeviceState};
