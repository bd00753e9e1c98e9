//! The per-device state record.
//!
//! A device is a composed record: a core that every device has, plus optional sub-records that
//! exist only when the product's capability flags enable them.  Reads of absent sub-state return
//! documented defaults and writes to absent sub-state are silently ignored, so handlers get a
//! uniform surface without violating capability gating.
//!
//! The whole record serializes to JSON; that serialization is the persistence schema.

use lifx_proto::{
    products, HSBK, LifxIdent, LifxString, MultiZoneEffectSettings, Serial, TileEffectSettings,
    TileStateDevice, Waveform,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Lowest kelvin value a handler will store.
pub const KELVIN_MIN: u16 = 1500;
/// Highest kelvin value a handler will store.
pub const KELVIN_MAX: u16 = 9000;

/// Number of color slots in one tile framebuffer.
pub const TILE_PIXELS: usize = 64;

/// Framebuffers per matrix device.  Buffer 0 is the visible one; the rest are scratch,
/// allocated on first write.
pub const FRAMEBUFFER_COUNT: u8 = 8;

/// Capability flags, fixed at device creation from the product registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub has_color: bool,
    pub has_infrared: bool,
    pub has_multizone: bool,
    pub has_extended_multizone: bool,
    pub has_matrix: bool,
    pub has_chain: bool,
    pub has_hev: bool,
    pub has_relays: bool,
    pub has_buttons: bool,
}

impl Capabilities {
    pub fn from_product(product: u32, firmware_build: u64) -> Capabilities {
        match products::get_product_info(lifx_proto::VENDOR_LIFX, product) {
            Some(info) => Capabilities {
                has_color: info.color,
                has_infrared: info.infrared,
                has_multizone: info.multizone,
                has_extended_multizone: products::supports_extended_multizone(
                    product,
                    Some(firmware_build),
                ),
                has_matrix: info.matrix,
                has_chain: info.chain,
                has_hev: info.hev,
                has_relays: info.relays,
                has_buttons: info.buttons,
            },
            None => Capabilities {
                has_color: true,
                ..Capabilities::default()
            },
        }
    }

    /// Relay switches answer the Device namespace only; everything else is StateUnhandled.
    pub fn is_switch(&self) -> bool {
        self.has_relays && self.has_buttons && !self.has_color
    }

    /// The key this device resolves under in the `type` scenario scope, by the most specific
    /// capability it has.
    pub fn type_key(&self) -> Option<&'static str> {
        if self.has_matrix {
            Some("matrix")
        } else if self.has_extended_multizone {
            Some("extended_multizone")
        } else if self.has_multizone {
            Some("multizone")
        } else if self.has_hev {
            Some("hev")
        } else if self.has_infrared {
            Some("infrared")
        } else if self.has_color {
            Some("color")
        } else {
            None
        }
    }
}

/// Location or group membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub id: LifxIdent,
    pub label: LifxString,
    /// UTC timestamp of the last update, nanoseconds since epoch
    pub updated_at: u64,
}

impl Membership {
    pub(crate) fn new(id: LifxIdent, label: &str) -> Membership {
        Membership {
            id,
            label: LifxString::new(label),
            updated_at: now_nanos(),
        }
    }
}

/// The most recently requested waveform effect.  The emulator doesn't render transitions over
/// time; the final color is applied immediately and the parameters are kept for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformState {
    pub transient: bool,
    pub color: HSBK,
    pub period: u32,
    pub cycles: f32,
    pub skew_ratio: i16,
    pub waveform: Waveform,
}

impl Default for WaveformState {
    fn default() -> WaveformState {
        WaveformState {
            transient: false,
            color: HSBK::default(),
            period: 0,
            cycles: 0.0,
            skew_ratio: 0,
            waveform: Waveform::Saw,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfraredState {
    pub brightness: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HevState {
    /// Configured cycle duration in seconds
    pub cycle_duration_s: u32,
    /// Seconds left in the running cycle; zero when idle
    pub cycle_remaining_s: u32,
    /// Power level that will be restored when the cycle ends
    pub last_power: u8,
    /// Whether the device glows during a cycle
    pub indication: bool,
    pub last_result: lifx_proto::LastHevCycleResult,
    /// When the running cycle started; `None` when idle.  Remaining time is derived from this
    /// on read so no background timer is needed.
    #[serde(skip)]
    pub cycle_started: Option<Instant>,
}

impl Default for HevState {
    fn default() -> HevState {
        HevState {
            cycle_duration_s: 7200,
            cycle_remaining_s: 0,
            last_power: 0,
            indication: false,
            last_result: lifx_proto::LastHevCycleResult::None,
            cycle_started: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultizoneState {
    pub zone_count: u16,
    /// One entry per zone; length always equals `zone_count`
    pub zone_colors: Vec<HSBK>,
    /// Zone writes sent with `NoApply` accumulate here until an `Apply`
    #[serde(skip)]
    pub pending: Option<Vec<HSBK>>,
    pub effect: MultiZoneEffectSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixState {
    pub tile_count: u8,
    pub tile_width: u8,
    pub tile_height: u8,
    /// Per-tile metadata reported in StateDeviceChain (user position, dimensions, firmware)
    pub tiles: Vec<TileStateDevice>,
    /// framebuffer index -> per-tile pixel buffers.  Index 0 always exists.
    pub framebuffers: BTreeMap<u8, Vec<Vec<HSBK>>>,
    pub effect: TileEffectSettings,
}

impl MatrixState {
    /// The visible pixels of one tile.  Missing indices read as an empty slice.
    pub fn visible_tile(&self, tile: usize) -> &[HSBK] {
        self.framebuffers
            .get(&0)
            .and_then(|tiles| tiles.get(tile))
            .map(|px| px.as_slice())
            .unwrap_or(&[])
    }

    /// A writable framebuffer, allocating scratch buffers (1..7) on first use.
    pub fn framebuffer_mut(&mut self, fb_index: u8) -> Option<&mut Vec<Vec<HSBK>>> {
        if fb_index >= FRAMEBUFFER_COUNT {
            return None;
        }
        let tile_count = usize::from(self.tile_count);
        Some(
            self.framebuffers
                .entry(fb_index)
                .or_insert_with(|| vec![vec![HSBK::default(); TILE_PIXELS]; tile_count]),
        )
    }
}

/// The full state record of one emulated device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceState {
    pub serial: Serial,
    pub label: LifxString,
    /// 0 or 65535
    pub power_level: u16,
    pub color: HSBK,
    pub vendor: u32,
    pub product: u32,
    /// hardware revision, reported in StateVersion
    pub hw_version: u32,
    pub firmware_major: u16,
    pub firmware_minor: u16,
    /// Firmware build time, nanosecond epoch value reported in StateHostFirmware
    pub build_timestamp: u64,
    pub mac: String,
    /// UDP port the device advertises in StateService
    pub port: u32,
    /// Radio signal strength in dBm
    pub wifi_signal_dbm: f32,
    pub location: Membership,
    pub group: Membership,
    pub waveform: WaveformState,
    pub caps: Capabilities,
    pub infrared: Option<InfraredState>,
    pub hev: Option<HevState>,
    pub multizone: Option<MultizoneState>,
    pub matrix: Option<MatrixState>,
    #[serde(skip, default = "Instant::now")]
    pub(crate) started: Instant,
    #[serde(skip)]
    pub(crate) dirty: bool,
}

pub(crate) fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

impl DeviceState {
    /// Nanoseconds since this device object was created; reported in StateInfo.
    pub fn uptime_nanos(&self) -> u64 {
        self.started.elapsed().as_nanos() as u64
    }

    pub fn now_nanos(&self) -> u64 {
        now_nanos()
    }

    /// The `target` header field value for this device.
    pub fn target(&self) -> u64 {
        self.serial.as_target()
    }

    /// Marks the record as changed; picked up after dispatch to drive persistence and the
    /// `device_updated` event.
    pub fn touch(&mut self) {
        self.dirty = true;
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    // Capability-gated accessors.  Absent sub-state reads as a documented default; absent
    // sub-state writes are no-ops.

    pub fn zone_count(&self) -> u16 {
        self.multizone.as_ref().map_or(0, |mz| mz.zone_count)
    }

    pub fn tile_count(&self) -> u8 {
        self.matrix.as_ref().map_or(0, |m| m.tile_count)
    }

    pub fn tile_width(&self) -> u8 {
        self.matrix.as_ref().map_or(8, |m| m.tile_width)
    }

    pub fn tile_height(&self) -> u8 {
        self.matrix.as_ref().map_or(8, |m| m.tile_height)
    }

    pub fn infrared_brightness(&self) -> u16 {
        self.infrared.as_ref().map_or(0, |ir| ir.brightness)
    }

    pub fn set_infrared_brightness(&mut self, brightness: u16) {
        if let Some(ir) = self.infrared.as_mut() {
            ir.brightness = brightness;
            self.dirty = true;
        }
    }

    /// Clamps and stores power.  Only 0 and 65535 exist on real hardware.
    pub fn set_power(&mut self, level: u16) {
        self.power_level = if level > 0 { 65535 } else { 0 };
        self.dirty = true;
    }

    /// Clamps kelvin into the supported band and stores the color.  On multizone devices the
    /// color also fills every zone; on matrix devices it fills the visible framebuffer.
    pub fn set_color(&mut self, color: HSBK) {
        let color = clamp_kelvin(color);
        self.color = color;
        if let Some(mz) = self.multizone.as_mut() {
            mz.zone_colors.fill(color);
        }
        if let Some(m) = self.matrix.as_mut() {
            if let Some(tiles) = m.framebuffers.get_mut(&0) {
                for tile in tiles.iter_mut() {
                    tile.fill(color);
                }
            }
        }
        self.dirty = true;
    }

    pub fn set_label(&mut self, label: LifxString) {
        self.label = label;
        self.dirty = true;
    }

    pub fn set_location(&mut self, id: LifxIdent, label: LifxString, updated_at: u64) {
        self.location = Membership {
            id,
            label,
            updated_at,
        };
        self.dirty = true;
    }

    pub fn set_group(&mut self, id: LifxIdent, label: LifxString, updated_at: u64) {
        self.group = Membership {
            id,
            label,
            updated_at,
        };
        self.dirty = true;
    }

    /// Brings the HEV countdown up to date and returns the seconds remaining.
    pub fn hev_remaining(&mut self) -> u32 {
        let Some(hev) = self.hev.as_mut() else {
            return 0;
        };
        if let Some(started) = hev.cycle_started {
            let elapsed = started.elapsed().as_secs();
            if elapsed >= u64::from(hev.cycle_remaining_s) {
                hev.cycle_remaining_s = 0;
                hev.cycle_started = None;
                hev.last_result = lifx_proto::LastHevCycleResult::Success;
            } else {
                return hev.cycle_remaining_s - elapsed as u32;
            }
        }
        hev.cycle_remaining_s
    }
}

pub(crate) fn clamp_kelvin(mut color: HSBK) -> HSBK {
    color.kelvin = color.kelvin.clamp(KELVIN_MIN, KELVIN_MAX);
    color
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory;

    #[test]
    fn absent_substate_reads_defaults() {
        let st = factory::create_color_light("d073d5000001".parse().unwrap());
        assert_eq!(st.zone_count(), 0);
        assert_eq!(st.tile_count(), 0);
        assert_eq!(st.tile_width(), 8);
        assert_eq!(st.tile_height(), 8);
        assert_eq!(st.infrared_brightness(), 0);
    }

    #[test]
    fn absent_substate_writes_are_ignored() {
        let mut st = factory::create_color_light("d073d5000001".parse().unwrap());
        st.set_infrared_brightness(30000);
        assert_eq!(st.infrared_brightness(), 0);
    }

    #[test]
    fn power_clamps_to_relay_values() {
        let mut st = factory::create_color_light("d073d5000001".parse().unwrap());
        st.set_power(1);
        assert_eq!(st.power_level, 65535);
        st.set_power(0);
        assert_eq!(st.power_level, 0);
    }

    #[test]
    fn kelvin_clamps_into_band() {
        let mut st = factory::create_color_light("d073d5000001".parse().unwrap());
        st.set_color(HSBK {
            hue: 0,
            saturation: 0,
            brightness: 65535,
            kelvin: 1000,
        });
        assert_eq!(st.color.kelvin, KELVIN_MIN);
        st.set_color(HSBK {
            hue: 0,
            saturation: 0,
            brightness: 65535,
            kelvin: 20000,
        });
        assert_eq!(st.color.kelvin, KELVIN_MAX);
    }

    #[test]
    fn set_color_fills_zones_and_visible_pixels() {
        let color = HSBK {
            hue: 1,
            saturation: 2,
            brightness: 3,
            kelvin: 3500,
        };

        let mut mz = factory::create_multizone_light("d073d5000002".parse().unwrap(), 16, false);
        mz.set_color(color);
        assert!(mz
            .multizone
            .as_ref()
            .unwrap()
            .zone_colors
            .iter()
            .all(|c| *c == color));

        let mut tile = factory::create_tile_device("d073d5000003".parse().unwrap(), 2);
        tile.set_color(color);
        let m = tile.matrix.as_ref().unwrap();
        for t in 0..2 {
            assert!(m.visible_tile(t).iter().all(|c| *c == color));
        }
    }

    #[test]
    fn scratch_framebuffers_allocate_lazily() {
        let mut tile = factory::create_tile_device("d073d5000003".parse().unwrap(), 2);
        let m = tile.matrix.as_mut().unwrap();
        assert_eq!(m.framebuffers.len(), 1);
        m.framebuffer_mut(3).unwrap();
        assert_eq!(m.framebuffers.len(), 2);
        assert!(m.framebuffer_mut(8).is_none());
    }

    #[test]
    fn snapshot_roundtrips_through_json() {
        let mut st = factory::create_multizone_light("d073d5000004".parse().unwrap(), 12, true);
        st.set_power(65535);
        st.set_label(LifxString::new("Shelf"));
        let json = serde_json::to_string(&st).unwrap();
        let back: DeviceState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.serial, st.serial);
        assert_eq!(back.label, st.label);
        assert_eq!(back.power_level, 65535);
        assert_eq!(back.zone_count(), 12);
        assert!(back.caps.has_extended_multizone);
    }
}
