//! The product capability registry.
//!
//! Data is taken from https://github.com/LIFX/products/blob/master/products.json
//!
//! The table body is generated by `cargo xtask update-products`; edit the generator, not the
//! match arms.

/// The color temperatures a product can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureRange {
    /// The device supports a range of temperatures
    Variable { min: u16, max: u16 },
    /// The device only supports 1 temperature
    Fixed(u16),
    /// For devices that aren't lighting products (the LIFX switch)
    None,
}

impl TemperatureRange {
    pub fn bounds(&self) -> Option<(u16, u16)> {
        match *self {
            TemperatureRange::Variable { min, max } => Some((min, max)),
            TemperatureRange::Fixed(k) => Some((k, k)),
            TemperatureRange::None => None,
        }
    }
}

/// Capabilities of one product, as published in the upstream product registry.
#[derive(Clone, Debug)]
pub struct ProductInfo {
    pub name: &'static str,
    pub color: bool,
    pub infrared: bool,
    pub multizone: bool,
    /// Whether the product can ever speak the 82-zone extended encoding.
    pub extended_multizone: bool,
    /// Firmware build that introduced extended multizone, for products that gained it in an
    /// update.  `None` on products that shipped with it (or never support it).
    pub min_ext_mz_firmware: Option<u64>,
    pub matrix: bool,
    pub chain: bool,
    pub hev: bool,
    pub relays: bool,
    pub buttons: bool,
    pub temperature_range: TemperatureRange,
}

/// Look up info about what a LIFX product supports.
///
/// You can get the vendor and product IDs from a device by receiving a
/// [crate::Message::StateVersion] message.
#[rustfmt::skip]
pub fn get_product_info(vendor: u32, product: u32) -> Option<&'static ProductInfo> {
    if vendor != crate::VENDOR_LIFX {
        return None;
    }
    match product {
        1 => Some(&ProductInfo { name: "LIFX Original 1000", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        3 => Some(&ProductInfo { name: "LIFX Color 650", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        10 => Some(&ProductInfo { name: "LIFX White 800 (Low Voltage)", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2700, max: 6500 } }),
        11 => Some(&ProductInfo { name: "LIFX White 800 (High Voltage)", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2700, max: 6500 } }),
        18 => Some(&ProductInfo { name: "LIFX White 900 BR30 (Low Voltage)", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        20 => Some(&ProductInfo { name: "LIFX Color 1000 BR30", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        22 => Some(&ProductInfo { name: "LIFX Color 1000", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        27 => Some(&ProductInfo { name: "LIFX A19", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        28 => Some(&ProductInfo { name: "LIFX BR30", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        29 => Some(&ProductInfo { name: "LIFX+ A19", color: true, infrared: true, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        30 => Some(&ProductInfo { name: "LIFX+ BR30", color: true, infrared: true, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        31 => Some(&ProductInfo { name: "LIFX Z", color: true, infrared: false, multizone: true, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        32 => Some(&ProductInfo { name: "LIFX Z", color: true, infrared: false, multizone: true, extended_multizone: true, min_ext_mz_firmware: Some(1532997580), matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        36 => Some(&ProductInfo { name: "LIFX Downlight", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        37 => Some(&ProductInfo { name: "LIFX Downlight", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        38 => Some(&ProductInfo { name: "LIFX Beam", color: true, infrared: false, multizone: true, extended_multizone: true, min_ext_mz_firmware: Some(1532997580), matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        43 => Some(&ProductInfo { name: "LIFX A19", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        44 => Some(&ProductInfo { name: "LIFX BR30", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        45 => Some(&ProductInfo { name: "LIFX+ A19", color: true, infrared: true, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        46 => Some(&ProductInfo { name: "LIFX+ BR30", color: true, infrared: true, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        49 => Some(&ProductInfo { name: "LIFX Mini Color", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        50 => Some(&ProductInfo { name: "LIFX Mini White to Warm", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 1500, max: 4000 } }),
        51 => Some(&ProductInfo { name: "LIFX Mini White", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Fixed(2700) }),
        52 => Some(&ProductInfo { name: "LIFX GU10", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        55 => Some(&ProductInfo { name: "LIFX Tile", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: true, chain: true, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        57 => Some(&ProductInfo { name: "LIFX Candle", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: true, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 1500, max: 9000 } }),
        59 => Some(&ProductInfo { name: "LIFX Mini Color", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        60 => Some(&ProductInfo { name: "LIFX Mini White to Warm", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 1500, max: 4000 } }),
        61 => Some(&ProductInfo { name: "LIFX Mini White", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Fixed(2700) }),
        62 => Some(&ProductInfo { name: "LIFX A19", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        63 => Some(&ProductInfo { name: "LIFX BR30", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        64 => Some(&ProductInfo { name: "LIFX+ A19", color: true, infrared: true, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        65 => Some(&ProductInfo { name: "LIFX+ BR30", color: true, infrared: true, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2500, max: 9000 } }),
        68 => Some(&ProductInfo { name: "LIFX Candle", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: true, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 1500, max: 9000 } }),
        70 => Some(&ProductInfo { name: "LIFX Switch", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: true, buttons: true, temperature_range: TemperatureRange::None }),
        71 => Some(&ProductInfo { name: "LIFX Switch", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: true, buttons: true, temperature_range: TemperatureRange::None }),
        81 => Some(&ProductInfo { name: "LIFX Candle White to Warm", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 2200, max: 6500 } }),
        82 => Some(&ProductInfo { name: "LIFX Filament", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Fixed(2100) }),
        89 => Some(&ProductInfo { name: "LIFX Switch", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: true, buttons: true, temperature_range: TemperatureRange::None }),
        90 => Some(&ProductInfo { name: "LIFX Clean", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: true, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 1500, max: 9000 } }),
        91 => Some(&ProductInfo { name: "LIFX Color", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 1500, max: 9000 } }),
        92 => Some(&ProductInfo { name: "LIFX Color", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 1500, max: 9000 } }),
        99 => Some(&ProductInfo { name: "LIFX Clean", color: true, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: true, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 1500, max: 9000 } }),
        100 => Some(&ProductInfo { name: "LIFX Filament Clear", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Fixed(2100) }),
        101 => Some(&ProductInfo { name: "LIFX Filament Amber", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Fixed(2000) }),
        109 => Some(&ProductInfo { name: "LIFX A19 Night Vision", color: true, infrared: true, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 1500, max: 9000 } }),
        110 => Some(&ProductInfo { name: "LIFX BR30 Night Vision", color: true, infrared: true, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 1500, max: 9000 } }),
        115 => Some(&ProductInfo { name: "LIFX Switch", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: true, buttons: true, temperature_range: TemperatureRange::None }),
        116 => Some(&ProductInfo { name: "LIFX Switch", color: false, infrared: false, multizone: false, extended_multizone: false, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: true, buttons: true, temperature_range: TemperatureRange::None }),
        117 => Some(&ProductInfo { name: "LIFX Z", color: true, infrared: false, multizone: true, extended_multizone: true, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 1500, max: 9000 } }),
        118 => Some(&ProductInfo { name: "LIFX Z", color: true, infrared: false, multizone: true, extended_multizone: true, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 1500, max: 9000 } }),
        119 => Some(&ProductInfo { name: "LIFX Beam", color: true, infrared: false, multizone: true, extended_multizone: true, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 1500, max: 9000 } }),
        120 => Some(&ProductInfo { name: "LIFX Beam", color: true, infrared: false, multizone: true, extended_multizone: true, min_ext_mz_firmware: None, matrix: false, chain: false, hev: false, relays: false, buttons: false, temperature_range: TemperatureRange::Variable { min: 1500, max: 9000 } }),
        _ => None,
    }
}

/// Whether a product can speak the extended (82 zones per packet) multizone encoding.
///
/// Products whose feature table carries `extended_multizone` natively always can; products that
/// gained it in a firmware update can only when the reported firmware build is at least the
/// listed bound.
pub fn supports_extended_multizone(product: u32, firmware_build: Option<u64>) -> bool {
    match get_product_info(crate::VENDOR_LIFX, product) {
        Some(info) if info.extended_multizone => match info.min_ext_mz_firmware {
            None => true,
            Some(bound) => firmware_build.is_some_and(|build| build >= bound),
        },
        _ => false,
    }
}

/// Default zone count for a multizone product (one strip segment for Z, a full Beam set).
pub fn default_zone_count(product: u32) -> u16 {
    match product {
        38 | 119 | 120 => 10,
        _ => 8,
    }
}

/// Default tile layout (count, width, height) for a matrix product.
pub fn default_tile_layout(product: u32) -> (u8, u8, u8) {
    match product {
        55 => (5, 8, 8),
        57 | 68 => (1, 5, 6),
        _ => (1, 8, 8),
    }
}
