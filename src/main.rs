//! The emulator application: parse flags, build the device fleet, run the UDP server until
//! ctrl-c, then flush persistence.

mod config;

use anyhow::Context;
use clap::Parser;
use config::{DeviceDefinition, FileConfig};
use lifx_emu::events::EventBus;
use lifx_emu::factory::{self, DeviceOverrides};
use lifx_emu::manager::DeviceManager;
use lifx_emu::persist::{PersistenceEngine, DEFAULT_DEBOUNCE, SCENARIOS_KEY};
use lifx_emu::scenarios::{ScenarioEngine, ScenarioStore};
use lifx_emu::server::{EmulatedServer, ServerConfig};
use lifx_emu::state::DeviceState;
use lifx_proto::Serial;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Clone, Debug)]
#[command(
    name = "lifx-emulator",
    about = "Emulates a fleet of LIFX devices over the LAN protocol",
    version
)]
struct Cli {
    /// YAML config file (default: lifx-emulator.yaml in cwd, or $LIFX_EMULATOR_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    bind: Option<String>,

    /// UDP port (0 picks an ephemeral port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Persist device state to disk
    #[arg(long)]
    persistent: bool,

    /// Persist scenario rules alongside device state
    #[arg(long)]
    persistent_scenarios: bool,

    /// Directory for persisted state
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Create one device per listed product id
    #[arg(long, value_delimiter = ',')]
    products: Vec<u32>,

    /// Number of color bulbs
    #[arg(long)]
    color: Option<u32>,

    /// Number of white-temperature bulbs
    #[arg(long)]
    color_temperature: Option<u32>,

    /// Number of infrared bulbs
    #[arg(long)]
    infrared: Option<u32>,

    /// Number of HEV bulbs
    #[arg(long)]
    hev: Option<u32>,

    /// Number of multizone strips
    #[arg(long)]
    multizone: Option<u32>,

    /// Zones per multizone strip
    #[arg(long)]
    zones: Option<u16>,

    /// Multizone strips speak the extended (82 zones/packet) encoding
    #[arg(long)]
    extended: bool,

    /// Number of matrix tile devices
    #[arg(long)]
    tile: Option<u32>,

    /// Tiles per matrix device
    #[arg(long)]
    tile_count: Option<u8>,

    /// Tile width in pixels
    #[arg(long)]
    tile_width: Option<u8>,

    /// Tile height in pixels
    #[arg(long)]
    tile_height: Option<u8>,

    /// Number of relay switches
    #[arg(long)]
    switch: Option<u32>,

    /// First 6 hex characters of generated serials
    #[arg(long)]
    serial_prefix: Option<String>,

    /// Counter the generated serial suffix starts at
    #[arg(long)]
    serial_start: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let file = match config::resolve_config_path(cli.config.as_deref())? {
        Some(path) => {
            info!(path = %path.display(), "loading config file");
            config::load(&path)?
        }
        None => FileConfig::default(),
    };

    let events = EventBus::default();
    let devices = Arc::new(DeviceManager::new(events.clone()));

    let persistent = cli.persistent || file.persistent.unwrap_or(false);
    let persistent_scenarios =
        cli.persistent_scenarios || file.persistent_scenarios.unwrap_or(false);
    let persistence = if persistent || persistent_scenarios {
        let dir = cli
            .state_dir
            .clone()
            .or(file.state_dir.clone())
            .unwrap_or_else(|| PathBuf::from("lifx-emulator-state"));
        Some(Arc::new(
            PersistenceEngine::new(&dir, DEFAULT_DEBOUNCE)
                .with_context(|| format!("creating state directory {}", dir.display()))?,
        ))
    } else {
        None
    };

    let scenarios = match (persistent_scenarios, &persistence) {
        (true, Some(engine)) => match engine.load(SCENARIOS_KEY) {
            Some(json) => match serde_json::from_str::<ScenarioStore>(&json) {
                Ok(store) => {
                    info!("restored scenario rules");
                    Arc::new(ScenarioEngine::with_store(store))
                }
                Err(e) => {
                    warn!(error = %e, "ignoring unreadable scenarios file");
                    Arc::new(ScenarioEngine::new())
                }
            },
            None => Arc::new(ScenarioEngine::new()),
        },
        _ => Arc::new(ScenarioEngine::new()),
    };

    let restore_from = if persistent { persistence.as_deref() } else { None };
    let fleet = build_fleet(&cli, &file, restore_from)?;
    info!(devices = fleet.len(), "created device fleet");
    for state in fleet {
        devices.add(state);
    }

    let server = EmulatedServer::bind(
        &ServerConfig {
            bind: cli
                .bind
                .clone()
                .or(file.bind.clone())
                .unwrap_or_else(|| "127.0.0.1".into()),
            port: cli.port.or(file.port).unwrap_or(lifx_proto::DEFAULT_PORT),
        },
        Arc::clone(&devices),
        scenarios,
        events,
        persistence.clone(),
    )
    .await
    .context("binding UDP socket")?;

    let runner = server.clone();
    let run = tokio::spawn(async move { runner.run().await });

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    server.shutdown();
    let _ = run.await;

    if let Some(engine) = persistence {
        engine.shutdown(Duration::from_secs(5)).await;
    }
    Ok(())
}

/// Hands out serials `<prefix><counter>` in creation order.
struct SerialAllocator {
    prefix: [u8; 3],
    next: u32,
}

impl SerialAllocator {
    fn next(&mut self) -> Serial {
        let n = self.next;
        self.next = self.next.wrapping_add(1);
        let b = n.to_be_bytes();
        Serial([
            self.prefix[0],
            self.prefix[1],
            self.prefix[2],
            b[1],
            b[2],
            b[3],
        ])
    }
}

fn build_fleet(
    cli: &Cli,
    file: &FileConfig,
    persistence: Option<&PersistenceEngine>,
) -> anyhow::Result<Vec<DeviceState>> {
    let prefix = config::parse_serial_prefix(
        cli.serial_prefix
            .as_deref()
            .or(file.serial_prefix.as_deref())
            .unwrap_or("d073d5"),
    )?;
    let mut serials = SerialAllocator {
        prefix,
        next: cli.serial_start.or(file.serial_start).unwrap_or(1),
    };

    let zones = cli.zones.or(file.multizone_zones);
    let extended = cli.extended || file.multizone_extended.unwrap_or(true);
    let tile_overrides = DeviceOverrides {
        tile_count: cli.tile_count.or(file.tile_count),
        tile_width: cli.tile_width.or(file.tile_width),
        tile_height: cli.tile_height.or(file.tile_height),
        ..Default::default()
    };

    let mut fleet: Vec<DeviceState> = Vec::new();

    for def in file.devices.iter().flatten() {
        fleet.push(restore_or(
            device_from_definition(def, serials.next())?,
            persistence,
        ));
    }

    let products = if cli.products.is_empty() {
        file.products.clone().unwrap_or_default()
    } else {
        cli.products.clone()
    };
    for product in products {
        let state = factory::create_device(product, serials.next(), &DeviceOverrides::default())
            .with_context(|| format!("creating device for product {}", product))?;
        fleet.push(restore_or(state, persistence));
    }

    let count = |cli_n: Option<u32>, file_n: Option<u32>| cli_n.or(file_n).unwrap_or(0);
    for _ in 0..count(cli.color, file.color) {
        fleet.push(restore_or(
            factory::create_color_light(serials.next()),
            persistence,
        ));
    }
    for _ in 0..count(cli.color_temperature, file.color_temperature) {
        fleet.push(restore_or(
            factory::create_white_light(serials.next()),
            persistence,
        ));
    }
    for _ in 0..count(cli.infrared, file.infrared) {
        fleet.push(restore_or(
            factory::create_infrared_light(serials.next()),
            persistence,
        ));
    }
    for _ in 0..count(cli.hev, file.hev) {
        fleet.push(restore_or(
            factory::create_hev_light(serials.next()),
            persistence,
        ));
    }
    for _ in 0..count(cli.multizone, file.multizone) {
        let product = if extended { 32 } else { 31 };
        let state = factory::create_device(
            product,
            serials.next(),
            &DeviceOverrides {
                zone_count: zones,
                extended_multizone: Some(extended),
                ..Default::default()
            },
        )?;
        fleet.push(restore_or(state, persistence));
    }
    for _ in 0..count(cli.tile, file.tile) {
        let state = factory::create_device(55, serials.next(), &tile_overrides)?;
        fleet.push(restore_or(state, persistence));
    }
    for _ in 0..count(cli.switch, file.switch) {
        fleet.push(restore_or(factory::create_switch(serials.next()), persistence));
    }

    // An emulator with nothing to emulate isn't useful; default to one color bulb.
    if fleet.is_empty() {
        info!("no devices configured, creating one color bulb");
        fleet.push(restore_or(
            factory::create_color_light(serials.next()),
            persistence,
        ));
    }

    Ok(fleet)
}

fn device_from_definition(def: &DeviceDefinition, serial: Serial) -> anyhow::Result<DeviceState> {
    factory::create_device(
        def.product_id,
        serial,
        &DeviceOverrides {
            label: def.label.clone(),
            zone_count: def.zone_count,
            tile_count: def.tile_count,
            tile_width: def.tile_width,
            tile_height: def.tile_height,
            ..Default::default()
        },
    )
    .with_context(|| format!("creating device for product {}", def.product_id))
}

/// Replaces a freshly built device with its persisted snapshot, when one exists and parses.
fn restore_or(state: DeviceState, persistence: Option<&PersistenceEngine>) -> DeviceState {
    let Some(engine) = persistence else {
        return state;
    };
    let serial = state.serial;
    match engine.load(&serial.to_string()) {
        Some(json) => match serde_json::from_str::<DeviceState>(&json) {
            Ok(saved) if saved.serial == serial => {
                info!(%serial, "restored persisted state");
                saved
            }
            Ok(_) => {
                warn!(%serial, "persisted state has mismatched serial, ignoring");
                state
            }
            Err(e) => {
                warn!(%serial, error = %e, "ignoring unreadable persisted state");
                state
            }
        },
        None => state,
    }
}
