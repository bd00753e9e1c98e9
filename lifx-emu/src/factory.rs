//! Device construction.
//!
//! [create_device] builds a [DeviceState] for any product id, taking capabilities and defaults
//! from the product registry; the `create_*` helpers pick a representative product per device
//! class.

use crate::state::{
    Capabilities, DeviceState, HevState, InfraredState, MatrixState, Membership, MultizoneState,
    WaveformState, TILE_PIXELS,
};
use lifx_proto::{
    products, DEFAULT_PORT, HSBK, LifxIdent, LifxString, Serial, TileStateDevice,
};
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;

/// Firmware version advertised by freshly created devices.
pub const DEFAULT_FIRMWARE: (u16, u16) = (3, 70);

/// Build timestamp matching [DEFAULT_FIRMWARE]; new enough to clear every extended-multizone
/// upgrade bound in the registry.
pub const DEFAULT_FIRMWARE_BUILD: u64 = 1604880106;

#[derive(Error, Debug)]
pub enum FactoryError {
    #[error("unknown product id {0}")]
    UnknownProduct(u32),
}

/// Optional overrides applied on top of product defaults at creation time.
#[derive(Debug, Clone, Default)]
pub struct DeviceOverrides {
    pub label: Option<String>,
    pub zone_count: Option<u16>,
    pub extended_multizone: Option<bool>,
    pub tile_count: Option<u8>,
    pub tile_width: Option<u8>,
    pub tile_height: Option<u8>,
    pub firmware: Option<(u16, u16)>,
}

/// Create a device of any known product.
pub fn create_device(
    product: u32,
    serial: Serial,
    overrides: &DeviceOverrides,
) -> Result<DeviceState, FactoryError> {
    let info = products::get_product_info(lifx_proto::VENDOR_LIFX, product)
        .ok_or(FactoryError::UnknownProduct(product))?;

    let (firmware_major, firmware_minor) = overrides.firmware.unwrap_or(DEFAULT_FIRMWARE);
    let mut caps = Capabilities::from_product(product, DEFAULT_FIRMWARE_BUILD);
    if let Some(ext) = overrides.extended_multizone {
        caps.has_extended_multizone = ext && caps.has_multizone;
    }

    let default_color = HSBK {
        hue: 0,
        saturation: 0,
        brightness: 65535,
        kelvin: 3500,
    };

    let multizone = caps.has_multizone.then(|| {
        let zone_count = overrides
            .zone_count
            .unwrap_or_else(|| products::default_zone_count(product))
            .max(1);
        MultizoneState {
            zone_count,
            zone_colors: vec![default_color; usize::from(zone_count)],
            pending: None,
            effect: Default::default(),
        }
    });

    let matrix = caps.has_matrix.then(|| {
        let (def_count, def_w, def_h) = products::default_tile_layout(product);
        let tile_count = overrides.tile_count.unwrap_or(def_count).max(1);
        let tile_width = overrides.tile_width.unwrap_or(def_w).clamp(1, 8);
        let tile_height = overrides.tile_height.unwrap_or(def_h).clamp(1, 8);
        let tiles = (0..tile_count)
            .map(|i| TileStateDevice {
                user_x: f32::from(i),
                user_y: 0.0,
                width: tile_width,
                height: tile_height,
                device_version_vendor: lifx_proto::VENDOR_LIFX,
                device_version_product: product,
                firmware_build: DEFAULT_FIRMWARE_BUILD,
                firmware_version_major: firmware_major,
                firmware_version_minor: firmware_minor,
                ..Default::default()
            })
            .collect();
        let mut framebuffers = BTreeMap::new();
        framebuffers.insert(
            0u8,
            vec![vec![default_color; TILE_PIXELS]; usize::from(tile_count)],
        );
        MatrixState {
            tile_count,
            tile_width,
            tile_height,
            tiles,
            framebuffers,
            effect: Default::default(),
        }
    });

    let label = overrides
        .label
        .clone()
        .unwrap_or_else(|| format!("{} {}", info.name, &serial.to_string()[6..]));

    Ok(DeviceState {
        serial,
        label: LifxString::new(&label),
        power_level: 0,
        color: default_color,
        vendor: lifx_proto::VENDOR_LIFX,
        product,
        hw_version: 0,
        firmware_major,
        firmware_minor,
        build_timestamp: DEFAULT_FIRMWARE_BUILD,
        mac: serial.to_mac(),
        port: u32::from(DEFAULT_PORT),
        wifi_signal_dbm: -45.0,
        location: Membership::new(membership_ident(serial, 0x10), "Home"),
        group: Membership::new(membership_ident(serial, 0x20), "Lights"),
        waveform: WaveformState::default(),
        caps,
        infrared: caps.has_infrared.then(InfraredState::default),
        hev: caps.has_hev.then(HevState::default),
        multizone,
        matrix,
        started: Instant::now(),
        dirty: false,
    })
}

// Membership ids only need to be stable and distinct per device; derive them from the serial.
fn membership_ident(serial: Serial, tag: u8) -> LifxIdent {
    let mut id = [0u8; 16];
    id[0] = tag;
    id[1..7].copy_from_slice(&serial.0);
    LifxIdent(id)
}

/// A color A19 bulb.
pub fn create_color_light(serial: Serial) -> DeviceState {
    create_device(27, serial, &DeviceOverrides::default()).unwrap()
}

/// A white-temperature-only bulb.
pub fn create_white_light(serial: Serial) -> DeviceState {
    create_device(50, serial, &DeviceOverrides::default()).unwrap()
}

/// A color bulb with an infrared channel.
pub fn create_infrared_light(serial: Serial) -> DeviceState {
    create_device(29, serial, &DeviceOverrides::default()).unwrap()
}

/// A HEV "Clean" bulb.
pub fn create_hev_light(serial: Serial) -> DeviceState {
    create_device(90, serial, &DeviceOverrides::default()).unwrap()
}

/// A linear multizone strip.  `extended_multizone` picks the product generation.
pub fn create_multizone_light(serial: Serial, zone_count: u16, extended_multizone: bool) -> DeviceState {
    let product = if extended_multizone { 32 } else { 31 };
    create_device(
        product,
        serial,
        &DeviceOverrides {
            zone_count: Some(zone_count),
            ..Default::default()
        },
    )
    .unwrap()
}

/// A chain of 8x8 tiles.
pub fn create_tile_device(serial: Serial, tile_count: u8) -> DeviceState {
    create_device(
        55,
        serial,
        &DeviceOverrides {
            tile_count: Some(tile_count),
            ..Default::default()
        },
    )
    .unwrap()
}

/// A relay switch (default product 70).
pub fn create_switch(serial: Serial) -> DeviceState {
    create_device(70, serial, &DeviceOverrides::default()).unwrap()
}
