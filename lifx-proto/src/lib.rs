//! This crate provides low-level message types and structures for dealing with the LIFX LAN
//! protocol.
//!
//! It is the wire-protocol half of the emulator: the 36-byte header codec, the typed payload
//! codecs, and the product capability table.  It does not deal with sockets, device state, or
//! scheduling; that all lives in the `lifx-emu` crate.
//!
//! # Framing
//!
//! Every datagram starts with a 36-byte header ([Frame] + [FrameAddress] + [ProtocolHeader])
//! followed by a typed payload.  All multi-byte integers are little-endian.  [RawMessage] holds
//! the header plus the raw payload bytes; [Message] is the typed view of the payload, produced by
//! [Message::from_raw] and consumed by [RawMessage::build].
//!
//! # Reserved fields
//!
//! When *constructing* packets, every reserved field is set to zero.  However, it's possible to
//! receive packets with these fields set to non-zero values.  Be conservative in what you send,
//! and liberal in what you accept.
//!
//! # Unknown values
//!
//! Real clients and real bulbs both emit packets that don't match the documented protocol.
//! Enumerated fields therefore decode unknown discriminants into an `Unknown(n)` variant instead
//! of failing; only a truncated header or a short payload is a decode error.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::{fmt, io, str};
use thiserror::Error;

pub mod messages;
pub mod products;

pub use messages::{type_name, Message};
pub use products::{get_product_info, supports_extended_multizone, ProductInfo, TemperatureRange};

/// Size of the packed wire header, in bytes.
pub const HEADER_SIZE: usize = 36;

/// The UDP port LIFX devices listen on.
pub const DEFAULT_PORT: u16 = 56700;

/// The only protocol number ever seen on the wire.
pub const PROTOCOL_NUMBER: u16 = 1024;

/// LIFX's vendor id.  Every product in the registry belongs to it.
pub const VENDOR_LIFX: u32 = 1;

/// Various message encoding/decoding errors
#[derive(Error, Debug)]
pub enum Error {
    /// This error means we were unable to parse a raw message because its type is unknown.
    ///
    /// LIFX devices are known to send messages that are not officially documented, so this error
    /// type does not necessarily represent a bug.
    #[error("unknown message type {0}")]
    UnknownMessageType(u16),

    /// This error means one of the message fields contains an invalid or unsupported value.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A device serial: the 6-byte identifier carried in the low bytes of [FrameAddress::target].
///
/// Formats as 12 lowercase hex characters (`d073d5000001`), the form used in persistence file
/// names and the management plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct Serial(pub [u8; 6]);

impl Serial {
    /// Packs the serial into a `target` field value (low 6 bytes, 2 zero bytes on top).
    pub fn as_target(&self) -> u64 {
        let mut b = [0u8; 8];
        b[..6].copy_from_slice(&self.0);
        u64::from_le_bytes(b)
    }

    /// Extracts the serial from a `target` field value.
    pub fn from_target(target: u64) -> Serial {
        let b = target.to_le_bytes();
        Serial([b[0], b[1], b[2], b[3], b[4], b[5]])
    }

    /// The device's MAC address presentation (`d0:73:d5:00:00:01`).
    pub fn to_mac(&self) -> String {
        let b = &self.0;
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl str::FromStr for Serial {
    type Err = Error;

    fn from_str(s: &str) -> Result<Serial, Error> {
        if s.len() != 12 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::ProtocolError(format!(
                "serial must be 12 hex characters, got {:?}",
                s
            )));
        }
        let mut out = [0u8; 6];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex = str::from_utf8(chunk).unwrap();
            out[i] = u8::from_str_radix(hex, 16).unwrap();
        }
        Ok(Serial(out))
    }
}

impl TryFrom<String> for Serial {
    type Error = Error;

    fn try_from(s: String) -> Result<Serial, Error> {
        s.parse()
    }
}

impl From<Serial> for String {
    fn from(s: Serial) -> String {
        s.to_string()
    }
}

/// Lifx strings are fixed-length (32-bytes maximum)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LifxString(pub String);

impl LifxString {
    /// Constructs a new LifxString, truncating to 32 bytes (on a char boundary).
    pub fn new(s: &str) -> LifxString {
        if s.len() <= 32 {
            return LifxString(s.to_owned());
        }
        let mut end = 32;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        LifxString(s[..end].to_owned())
    }
}

impl fmt::Display for LifxString {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

impl std::cmp::PartialEq<str> for LifxString {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

#[cfg(feature = "arbitrary")]
impl<'a> arbitrary::Arbitrary<'a> for LifxString {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let len = u.int_in_range(0..=32)?;
        let mut s = String::with_capacity(len);
        for _ in 0..len {
            s.push(u.int_in_range(0x20u8..=0x7e)? as char);
        }
        Ok(LifxString(s))
    }
}

/// A 16-byte identifier, used for location and group ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct LifxIdent(pub [u8; 16]);

pub struct EchoPayload(pub [u8; 64]);

impl Clone for EchoPayload {
    fn clone(&self) -> EchoPayload {
        let mut p = [0; 64];
        p.clone_from_slice(&self.0);
        EchoPayload(p)
    }
}

impl PartialEq for EchoPayload {
    fn eq(&self, other: &EchoPayload) -> bool {
        self.0[..] == other.0[..]
    }
}

impl fmt::Debug for EchoPayload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<EchoPayload>")
    }
}

#[cfg(feature = "arbitrary")]
impl<'a> arbitrary::Arbitrary<'a> for EchoPayload {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let mut p = [0u8; 64];
        u.fill_buffer(&mut p)?;
        Ok(EchoPayload(p))
    }
}

/// Bulb color (Hue-Saturation-Brightness-Kelvin)
///
/// # Notes:
///
/// When a light is displaying whites, saturation will be zero, hue will be ignored, and only
/// brightness and kelvin will matter.  When a light is displaying colors, kelvin is ignored.
///
/// To display "pure" colors, set saturation to full (65535).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct HSBK {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
    pub kelvin: u16,
}

/// What services are exposed by the device.
///
/// LIFX only documents the UDP service, though bulbs may advertise other undocumented services.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum Service {
    Udp,
    Unknown(u8),
}

impl Service {
    pub fn as_u8(self) -> u8 {
        match self {
            Service::Udp => 1,
            Service::Unknown(x) => x,
        }
    }

    pub fn from_u8(v: u8) -> Service {
        match v {
            1 => Service::Udp,
            x => Service::Unknown(x),
        }
    }
}

/// Controls how/when multizone devices apply color changes
///
/// See also [Message::SetColorZones].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum ApplicationRequest {
    /// Don't apply the requested changes until a message with Apply or ApplyOnly is sent
    NoApply,
    /// Apply the changes immediately and apply any pending changes
    Apply,
    /// Ignore the requested changes in this message and only apply pending changes
    ApplyOnly,
    Unknown(u8),
}

impl ApplicationRequest {
    pub fn as_u8(self) -> u8 {
        match self {
            ApplicationRequest::NoApply => 0,
            ApplicationRequest::Apply => 1,
            ApplicationRequest::ApplyOnly => 2,
            ApplicationRequest::Unknown(x) => x,
        }
    }

    pub fn from_u8(v: u8) -> ApplicationRequest {
        match v {
            0 => ApplicationRequest::NoApply,
            1 => ApplicationRequest::Apply,
            2 => ApplicationRequest::ApplyOnly,
            x => ApplicationRequest::Unknown(x),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum Waveform {
    Saw,
    Sine,
    HalfSine,
    Triangle,
    Pulse,
    Unknown(u8),
}

impl Waveform {
    pub fn as_u8(self) -> u8 {
        match self {
            Waveform::Saw => 0,
            Waveform::Sine => 1,
            Waveform::HalfSine => 2,
            Waveform::Triangle => 3,
            Waveform::Pulse => 4,
            Waveform::Unknown(x) => x,
        }
    }

    pub fn from_u8(v: u8) -> Waveform {
        match v {
            0 => Waveform::Saw,
            1 => Waveform::Sine,
            2 => Waveform::HalfSine,
            3 => Waveform::Triangle,
            4 => Waveform::Pulse,
            x => Waveform::Unknown(x),
        }
    }
}

/// Firmware effects available on multizone devices.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum MultiZoneEffectType {
    Off,
    Move,
    Unknown(u8),
}

impl MultiZoneEffectType {
    pub fn as_u8(self) -> u8 {
        match self {
            MultiZoneEffectType::Off => 0,
            MultiZoneEffectType::Move => 1,
            MultiZoneEffectType::Unknown(x) => x,
        }
    }

    pub fn from_u8(v: u8) -> MultiZoneEffectType {
        match v {
            0 => MultiZoneEffectType::Off,
            1 => MultiZoneEffectType::Move,
            x => MultiZoneEffectType::Unknown(x),
        }
    }
}

/// Firmware effects available on matrix devices.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum TileEffectType {
    Off,
    Reserved,
    Morph,
    Flame,
    Unknown(u8),
}

impl TileEffectType {
    pub fn as_u8(self) -> u8 {
        match self {
            TileEffectType::Off => 0,
            TileEffectType::Reserved => 1,
            TileEffectType::Morph => 2,
            TileEffectType::Flame => 3,
            TileEffectType::Unknown(x) => x,
        }
    }

    pub fn from_u8(v: u8) -> TileEffectType {
        match v {
            0 => TileEffectType::Off,
            1 => TileEffectType::Reserved,
            2 => TileEffectType::Morph,
            3 => TileEffectType::Flame,
            x => TileEffectType::Unknown(x),
        }
    }
}

/// Outcome of the most recent HEV cleaning cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum LastHevCycleResult {
    Success,
    Busy,
    InterruptedByReset,
    InterruptedByHomekit,
    InterruptedByLan,
    InterruptedByCloud,
    None,
    Unknown(u8),
}

impl LastHevCycleResult {
    pub fn as_u8(self) -> u8 {
        match self {
            LastHevCycleResult::Success => 0,
            LastHevCycleResult::Busy => 1,
            LastHevCycleResult::InterruptedByReset => 2,
            LastHevCycleResult::InterruptedByHomekit => 3,
            LastHevCycleResult::InterruptedByLan => 4,
            LastHevCycleResult::InterruptedByCloud => 5,
            LastHevCycleResult::None => 255,
            LastHevCycleResult::Unknown(x) => x,
        }
    }

    pub fn from_u8(v: u8) -> LastHevCycleResult {
        match v {
            0 => LastHevCycleResult::Success,
            1 => LastHevCycleResult::Busy,
            2 => LastHevCycleResult::InterruptedByReset,
            3 => LastHevCycleResult::InterruptedByHomekit,
            4 => LastHevCycleResult::InterruptedByLan,
            5 => LastHevCycleResult::InterruptedByCloud,
            255 => LastHevCycleResult::None,
            x => LastHevCycleResult::Unknown(x),
        }
    }
}

/// One tile's slot in a [Message::StateDeviceChain] reply: position, dimensions and firmware.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct TileStateDevice {
    pub accel_meas_x: i16,
    pub accel_meas_y: i16,
    pub accel_meas_z: i16,
    pub reserved: i16,
    pub user_x: f32,
    pub user_y: f32,
    pub width: u8,
    pub height: u8,
    pub reserved2: u8,
    pub device_version_vendor: u32,
    pub device_version_product: u32,
    pub device_version_version: u32,
    pub firmware_build: u64,
    pub reserved3: u64,
    pub firmware_version_minor: u16,
    pub firmware_version_major: u16,
    pub reserved4: u32,
}

/// A rectangle of pixels within one tile framebuffer.  Framebuffer 0 is the visible one.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct TileBufferRect {
    pub fb_index: u8,
    pub x: u8,
    pub y: u8,
    pub width: u8,
}

/// The settings block shared by [Message::SetMultiZoneEffect] and
/// [Message::StateMultiZoneEffect].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct MultiZoneEffectSettings {
    pub instanceid: u32,
    pub typ: MultiZoneEffectType,
    pub reserved0: u16,
    /// Time between moves, in milliseconds
    pub speed: u32,
    /// Total effect duration in nanoseconds; zero means "until told to stop"
    pub duration: u64,
    pub reserved1: u32,
    pub reserved2: u32,
    pub parameters: [u32; 8],
}

impl Default for MultiZoneEffectSettings {
    fn default() -> MultiZoneEffectSettings {
        MultiZoneEffectSettings {
            instanceid: 0,
            typ: MultiZoneEffectType::Off,
            reserved0: 0,
            speed: 0,
            duration: 0,
            reserved1: 0,
            reserved2: 0,
            parameters: [0; 8],
        }
    }
}

/// The settings block shared by [Message::SetTileEffect] and [Message::StateTileEffect].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct TileEffectSettings {
    pub instanceid: u32,
    pub typ: TileEffectType,
    pub speed: u32,
    pub duration: u64,
    pub reserved0: u32,
    pub reserved1: u32,
    pub parameters: [u32; 8],
    pub palette_count: u8,
    pub palette: Vec<HSBK>,
}

impl Default for TileEffectSettings {
    fn default() -> TileEffectSettings {
        TileEffectSettings {
            instanceid: 0,
            typ: TileEffectType::Off,
            speed: 0,
            duration: 0,
            reserved0: 0,
            reserved1: 0,
            parameters: [0; 8],
            palette_count: 0,
            palette: Vec::new(),
        }
    }
}

pub(crate) trait LittleEndianWriter<T>: WriteBytesExt {
    fn write_val(&mut self, v: T) -> Result<(), io::Error>;
}

macro_rules! derive_writer {
{ $( $m:ident: $t:ty ),*} => {
    $(
        impl<T: WriteBytesExt> LittleEndianWriter<$t> for T {
            fn write_val(&mut self, v: $t) -> Result<(), io::Error> {
                self . $m ::<LittleEndian>(v)
            }
        }
    )*

}
}

derive_writer! { write_u32: u32, write_u16: u16, write_i16: i16, write_u64: u64, write_f32: f32 }

impl<T: WriteBytesExt> LittleEndianWriter<u8> for T {
    fn write_val(&mut self, v: u8) -> Result<(), io::Error> {
        self.write_u8(v)
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<bool> for T {
    fn write_val(&mut self, v: bool) -> Result<(), io::Error> {
        self.write_u8(u8::from(v))
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<LifxString> for T {
    fn write_val(&mut self, v: LifxString) -> Result<(), io::Error> {
        let bytes = v.0.as_bytes();
        for idx in 0..32 {
            self.write_u8(bytes.get(idx).copied().unwrap_or(0))?;
        }
        Ok(())
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<LifxIdent> for T {
    fn write_val(&mut self, v: LifxIdent) -> Result<(), io::Error> {
        for idx in 0..16 {
            self.write_u8(v.0[idx])?;
        }
        Ok(())
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<EchoPayload> for T {
    fn write_val(&mut self, v: EchoPayload) -> Result<(), io::Error> {
        for idx in 0..64 {
            self.write_u8(v.0[idx])?;
        }
        Ok(())
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<HSBK> for T {
    fn write_val(&mut self, v: HSBK) -> Result<(), io::Error> {
        self.write_val(v.hue)?;
        self.write_val(v.saturation)?;
        self.write_val(v.brightness)?;
        self.write_val(v.kelvin)?;
        Ok(())
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<Service> for T {
    fn write_val(&mut self, v: Service) -> Result<(), io::Error> {
        self.write_u8(v.as_u8())
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<ApplicationRequest> for T {
    fn write_val(&mut self, v: ApplicationRequest) -> Result<(), io::Error> {
        self.write_u8(v.as_u8())
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<Waveform> for T {
    fn write_val(&mut self, v: Waveform) -> Result<(), io::Error> {
        self.write_u8(v.as_u8())
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<LastHevCycleResult> for T {
    fn write_val(&mut self, v: LastHevCycleResult) -> Result<(), io::Error> {
        self.write_u8(v.as_u8())
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<TileBufferRect> for T {
    fn write_val(&mut self, v: TileBufferRect) -> Result<(), io::Error> {
        self.write_u8(v.fb_index)?;
        self.write_u8(v.x)?;
        self.write_u8(v.y)?;
        self.write_u8(v.width)?;
        Ok(())
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<TileStateDevice> for T {
    fn write_val(&mut self, v: TileStateDevice) -> Result<(), io::Error> {
        self.write_val(v.accel_meas_x)?;
        self.write_val(v.accel_meas_y)?;
        self.write_val(v.accel_meas_z)?;
        self.write_val(v.reserved)?;
        self.write_val(v.user_x)?;
        self.write_val(v.user_y)?;
        self.write_u8(v.width)?;
        self.write_u8(v.height)?;
        self.write_u8(v.reserved2)?;
        self.write_val(v.device_version_vendor)?;
        self.write_val(v.device_version_product)?;
        self.write_val(v.device_version_version)?;
        self.write_val(v.firmware_build)?;
        self.write_val(v.reserved3)?;
        self.write_val(v.firmware_version_minor)?;
        self.write_val(v.firmware_version_major)?;
        self.write_val(v.reserved4)?;
        Ok(())
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<MultiZoneEffectSettings> for T {
    fn write_val(&mut self, v: MultiZoneEffectSettings) -> Result<(), io::Error> {
        self.write_val(v.instanceid)?;
        self.write_u8(v.typ.as_u8())?;
        self.write_val(v.reserved0)?;
        self.write_val(v.speed)?;
        self.write_val(v.duration)?;
        self.write_val(v.reserved1)?;
        self.write_val(v.reserved2)?;
        for p in v.parameters {
            self.write_val(p)?;
        }
        Ok(())
    }
}

impl<T: WriteBytesExt> LittleEndianWriter<TileEffectSettings> for T {
    fn write_val(&mut self, v: TileEffectSettings) -> Result<(), io::Error> {
        self.write_val(v.instanceid)?;
        self.write_u8(v.typ.as_u8())?;
        self.write_val(v.speed)?;
        self.write_val(v.duration)?;
        self.write_val(v.reserved0)?;
        self.write_val(v.reserved1)?;
        for p in v.parameters {
            self.write_val(p)?;
        }
        self.write_u8(v.palette_count)?;
        for idx in 0..16 {
            self.write_val(v.palette.get(idx).copied().unwrap_or_default())?;
        }
        Ok(())
    }
}

pub(crate) trait LittleEndianReader<T> {
    fn read_val(&mut self) -> Result<T, io::Error>;
}

macro_rules! derive_reader {
{ $( $m:ident: $t:ty ),*} => {
    $(
        impl<T: ReadBytesExt> LittleEndianReader<$t> for T {
            fn read_val(&mut self) -> Result<$t, io::Error> {
                self . $m ::<LittleEndian>()
            }
        }
    )*

}
}

derive_reader! { read_u32: u32, read_u16: u16, read_i16: i16, read_u64: u64, read_f32: f32 }

impl<R: ReadBytesExt> LittleEndianReader<u8> for R {
    fn read_val(&mut self) -> Result<u8, io::Error> {
        self.read_u8()
    }
}

impl<R: ReadBytesExt> LittleEndianReader<HSBK> for R {
    fn read_val(&mut self) -> Result<HSBK, io::Error> {
        Ok(HSBK {
            hue: self.read_val()?,
            saturation: self.read_val()?,
            brightness: self.read_val()?,
            kelvin: self.read_val()?,
        })
    }
}

impl<R: ReadBytesExt> LittleEndianReader<LifxIdent> for R {
    fn read_val(&mut self) -> Result<LifxIdent, io::Error> {
        let mut val = [0; 16];
        for v in &mut val {
            *v = self.read_val()?;
        }
        Ok(LifxIdent(val))
    }
}

impl<R: ReadBytesExt> LittleEndianReader<LifxString> for R {
    fn read_val(&mut self) -> Result<LifxString, io::Error> {
        let mut label = Vec::with_capacity(32);
        for _ in 0..32 {
            let c: u8 = self.read_val()?;
            if c > 0 {
                label.push(c);
            }
        }
        Ok(LifxString(String::from_utf8_lossy(&label).into_owned()))
    }
}

impl<R: ReadBytesExt> LittleEndianReader<EchoPayload> for R {
    fn read_val(&mut self) -> Result<EchoPayload, io::Error> {
        let mut val = [0; 64];
        for v in val.iter_mut() {
            *v = self.read_val()?;
        }
        Ok(EchoPayload(val))
    }
}

impl<R: ReadBytesExt> LittleEndianReader<TileBufferRect> for R {
    fn read_val(&mut self) -> Result<TileBufferRect, io::Error> {
        Ok(TileBufferRect {
            fb_index: self.read_val()?,
            x: self.read_val()?,
            y: self.read_val()?,
            width: self.read_val()?,
        })
    }
}

impl<R: ReadBytesExt> LittleEndianReader<TileStateDevice> for R {
    fn read_val(&mut self) -> Result<TileStateDevice, io::Error> {
        Ok(TileStateDevice {
            accel_meas_x: self.read_val()?,
            accel_meas_y: self.read_val()?,
            accel_meas_z: self.read_val()?,
            reserved: self.read_val()?,
            user_x: self.read_val()?,
            user_y: self.read_val()?,
            width: self.read_val()?,
            height: self.read_val()?,
            reserved2: self.read_val()?,
            device_version_vendor: self.read_val()?,
            device_version_product: self.read_val()?,
            device_version_version: self.read_val()?,
            firmware_build: self.read_val()?,
            reserved3: self.read_val()?,
            firmware_version_minor: self.read_val()?,
            firmware_version_major: self.read_val()?,
            reserved4: self.read_val()?,
        })
    }
}

impl<R: ReadBytesExt> LittleEndianReader<MultiZoneEffectSettings> for R {
    fn read_val(&mut self) -> Result<MultiZoneEffectSettings, io::Error> {
        Ok(MultiZoneEffectSettings {
            instanceid: self.read_val()?,
            typ: MultiZoneEffectType::from_u8(self.read_val()?),
            reserved0: self.read_val()?,
            speed: self.read_val()?,
            duration: self.read_val()?,
            reserved1: self.read_val()?,
            reserved2: self.read_val()?,
            parameters: {
                let mut p = [0u32; 8];
                for v in &mut p {
                    *v = self.read_val()?;
                }
                p
            },
        })
    }
}

impl<R: ReadBytesExt> LittleEndianReader<TileEffectSettings> for R {
    fn read_val(&mut self) -> Result<TileEffectSettings, io::Error> {
        let instanceid = self.read_val()?;
        let typ = TileEffectType::from_u8(self.read_val()?);
        let speed = self.read_val()?;
        let duration = self.read_val()?;
        let reserved0 = self.read_val()?;
        let reserved1 = self.read_val()?;
        let mut parameters = [0u32; 8];
        for v in &mut parameters {
            *v = self.read_val()?;
        }
        let palette_count: u8 = self.read_val()?;
        let mut palette = Vec::with_capacity(16);
        for _ in 0..16 {
            palette.push(self.read_val()?);
        }
        palette.truncate(usize::from(palette_count).min(16));
        Ok(TileEffectSettings {
            instanceid,
            typ,
            speed,
            duration,
            reserved0,
            reserved1,
            parameters,
            palette_count,
            palette,
        })
    }
}

/// The raw message structure
///
/// Contains low-level protocol info.  This is what is sent and received via UDP packets.
///
/// To parse the payload, use [Message::from_raw].
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub frame: Frame,
    pub frame_addr: FrameAddress,
    pub protocol_header: ProtocolHeader,
    pub payload: Vec<u8>,
}

/// The Frame section contains information about the following:
///
/// * Size of the entire message
/// * LIFX Protocol number: must be 1024 (decimal)
/// * Use of the Frame Address target field
/// * Source identifier
///
/// The `tagged` field is a boolean that indicates whether the Frame Address target field is
/// being used to address an individual device or all devices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// 16 bits: Size of entire message in bytes including this field
    pub size: u16,

    /// 2 bits: Message origin indicator: must be zero (0)
    pub origin: u8,

    /// 1 bit: Determines usage of the Frame Address target field
    pub tagged: bool,

    /// 1 bit: Message includes a target address: must be one (1)
    pub addressable: bool,

    /// 12 bits: Protocol number: must be 1024 (decimal)
    pub protocol: u16,

    /// 32 bits: Source identifier: unique value set by the client, echoed in responses.
    pub source: u32,
}

/// The Frame Address section contains the following routing information:
///
/// * Target device address
/// * Acknowledgement message is required flag
/// * State response message is required flag
/// * Message sequence number
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameAddress {
    /// 64 bits: 6 byte device serial in the low bytes, or zero (0) for all devices
    pub target: u64,

    /// 48 bits: Must all be zero (0)
    pub reserved: [u8; 6],

    /// 6 bits: Reserved
    pub reserved2: u8,

    /// 1 bit: Acknowledgement message required
    pub ack_required: bool,

    /// 1 bit: Response message required
    pub res_required: bool,

    /// 8 bits: Wrap around message sequence number
    pub sequence: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtocolHeader {
    /// 64 bits: Reserved
    pub reserved: u64,

    /// 16 bits: Message type determines the payload being used
    pub typ: u16,

    /// 16 bits: Reserved
    pub reserved2: u16,
}

impl Frame {
    /// packed size, in bytes
    pub(crate) fn packed_size() -> usize {
        8
    }

    fn pack(&self) -> Result<Vec<u8>, Error> {
        let mut v = Vec::with_capacity(Self::packed_size());

        v.write_u16::<LittleEndian>(self.size)?;

        // pack origin + tagged + addressable + protocol as a u16
        let mut d: u16 = (u16::from(self.origin) & 0b11) << 14;
        d |= u16::from(self.tagged) << 13;
        d |= u16::from(self.addressable) << 12;
        d |= self.protocol & 0b1111_1111_1111;

        v.write_u16::<LittleEndian>(d)?;

        v.write_u32::<LittleEndian>(self.source)?;

        Ok(v)
    }

    fn unpack(v: &[u8]) -> Result<Frame, Error> {
        let mut c = Cursor::new(v);

        let size = c.read_val()?;

        // origin + tagged + addressable + protocol
        let d: u16 = c.read_val()?;

        let origin: u8 = ((d & 0b1100_0000_0000_0000) >> 14) as u8;
        let tagged: bool = (d & 0b0010_0000_0000_0000) > 0;
        let addressable = (d & 0b0001_0000_0000_0000) > 0;
        let protocol: u16 = d & 0b0000_1111_1111_1111;

        if protocol != PROTOCOL_NUMBER {
            return Err(Error::ProtocolError(format!(
                "unpacked frame had protocol version {}",
                protocol
            )));
        }

        let source = c.read_val()?;

        Ok(Frame {
            size,
            origin,
            tagged,
            addressable,
            protocol,
            source,
        })
    }
}

impl FrameAddress {
    pub(crate) fn packed_size() -> usize {
        16
    }

    fn pack(&self) -> Result<Vec<u8>, Error> {
        let mut v = Vec::with_capacity(Self::packed_size());
        v.write_u64::<LittleEndian>(self.target)?;
        for idx in 0..6 {
            v.write_u8(self.reserved[idx])?;
        }

        let b: u8 = (self.reserved2 << 2)
            + if self.ack_required { 2 } else { 0 }
            + if self.res_required { 1 } else { 0 };
        v.write_u8(b)?;
        v.write_u8(self.sequence)?;
        Ok(v)
    }

    fn unpack(v: &[u8]) -> Result<FrameAddress, Error> {
        let mut c = Cursor::new(v);

        let target = c.read_val()?;

        let mut reserved: [u8; 6] = [0; 6];
        for slot in &mut reserved {
            *slot = c.read_val()?;
        }

        let b: u8 = c.read_val()?;
        let reserved2: u8 = (b & 0b1111_1100) >> 2;
        let ack_required = (b & 0b10) > 0;
        let res_required = (b & 0b01) > 0;

        let sequence = c.read_val()?;

        Ok(FrameAddress {
            target,
            reserved,
            reserved2,
            ack_required,
            res_required,
            sequence,
        })
    }
}

impl ProtocolHeader {
    pub(crate) fn packed_size() -> usize {
        12
    }

    fn pack(&self) -> Result<Vec<u8>, Error> {
        let mut v = Vec::with_capacity(Self::packed_size());
        v.write_u64::<LittleEndian>(self.reserved)?;
        v.write_u16::<LittleEndian>(self.typ)?;
        v.write_u16::<LittleEndian>(self.reserved2)?;
        Ok(v)
    }

    fn unpack(v: &[u8]) -> Result<ProtocolHeader, Error> {
        let mut c = Cursor::new(v);

        let reserved = c.read_val()?;
        let typ = c.read_val()?;
        let reserved2 = c.read_val()?;

        Ok(ProtocolHeader {
            reserved,
            typ,
            reserved2,
        })
    }
}

/// Options used to construct a [RawMessage].
///
/// See also [RawMessage::build].
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// If not `None`, this is the serial of the device being addressed (or, for emulated
    /// responses, the device doing the responding).
    pub target: Option<u64>,
    /// Acknowledgement message required.
    pub ack_required: bool,
    /// Response message required.
    pub res_required: bool,
    /// A wrap around sequence number.  Responses echo the request's sequence.
    pub sequence: u8,
    /// A unique client identifier.  Responses echo the request's source.
    pub source: u32,
}

impl Default for BuildOptions {
    fn default() -> BuildOptions {
        BuildOptions {
            target: None,
            ack_required: false,
            res_required: false,
            sequence: 0,
            source: 0,
        }
    }
}

impl RawMessage {
    /// The total size (in bytes) of the packed version of this message.
    pub fn packed_size(&self) -> usize {
        Frame::packed_size()
            + FrameAddress::packed_size()
            + ProtocolHeader::packed_size()
            + self.payload.len()
    }

    /// Packs this RawMessage into some bytes that can be sent over the network.
    ///
    /// The length of the returned data will be [RawMessage::packed_size] in size.
    pub fn pack(&self) -> Result<Vec<u8>, Error> {
        let mut v = Vec::with_capacity(self.packed_size());
        v.extend(self.frame.pack()?);
        v.extend(self.frame_addr.pack()?);
        v.extend(self.protocol_header.pack()?);
        v.extend(&self.payload);
        Ok(v)
    }

    /// Given some bytes (generally read from a network socket), unpack the data into a
    /// `RawMessage` structure.
    pub fn unpack(v: &[u8]) -> Result<RawMessage, Error> {
        if v.len() < HEADER_SIZE {
            return Err(Error::ProtocolError(format!(
                "datagram too short for a header: {} bytes",
                v.len()
            )));
        }
        let mut start = 0;
        let frame = Frame::unpack(v)?;
        start += Frame::packed_size();
        let addr = FrameAddress::unpack(&v[start..])?;
        start += FrameAddress::packed_size();
        let proto = ProtocolHeader::unpack(&v[start..])?;
        start += ProtocolHeader::packed_size();

        // The size field is untrusted; never read past the end of the datagram.
        let end = (frame.size as usize).clamp(start, v.len());
        let body = Vec::from(&v[start..end]);

        Ok(RawMessage {
            frame,
            frame_addr: addr,
            protocol_header: proto,
            payload: body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame() {
        let frame = Frame {
            size: 0x1122,
            origin: 0,
            tagged: true,
            addressable: true,
            protocol: 1024,
            source: 1234567,
        };

        let v = frame.pack().unwrap();
        assert_eq!(v[0], 0x22);
        assert_eq!(v[1], 0x11);

        assert_eq!(v.len(), Frame::packed_size());

        let unpacked = Frame::unpack(&v).unwrap();
        assert_eq!(frame, unpacked);
    }

    #[test]
    fn test_decode_frame() {
        //             00    01    02    03    04    05    06    07
        let v = vec![0x28, 0x00, 0x00, 0x54, 0x42, 0x52, 0x4b, 0x52];
        let frame = Frame::unpack(&v).unwrap();

        // manual decoding:
        // size: 0x0028 ==> 40
        // 0x00, 0x54 (origin, tagged, addressable, protocol)

        //  /-Origin ==> 0
        // || /- addressable=1
        // || |
        // 01010100 00000000
        //   |
        //   \- Tagged=0

        assert_eq!(frame.size, 0x0028);
        assert_eq!(frame.origin, 1);
        assert!(frame.addressable);
        assert!(!frame.tagged);
        assert_eq!(frame.protocol, 1024);
        assert_eq!(frame.source, 0x524b5242);
    }

    #[test]
    fn test_frame_address() {
        let frame = FrameAddress {
            target: 0x11224488,
            reserved: [0; 6],
            reserved2: 0,
            ack_required: true,
            res_required: false,
            sequence: 248,
        };

        let v = frame.pack().unwrap();
        assert_eq!(v.len(), FrameAddress::packed_size());

        let unpacked = FrameAddress::unpack(&v).unwrap();
        assert_eq!(frame, unpacked);
    }

    #[test]
    fn test_protocol_header() {
        let frame = ProtocolHeader {
            reserved: 0,
            reserved2: 0,
            typ: 0x4455,
        };

        let v = frame.pack().unwrap();
        assert_eq!(v.len(), ProtocolHeader::packed_size());

        let unpacked = ProtocolHeader::unpack(&v).unwrap();
        assert_eq!(frame, unpacked);
    }

    #[test]
    fn test_unpack_short_datagram() {
        assert!(RawMessage::unpack(&[0x24, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_unpack_lying_size_field() {
        // A GetService header whose size field claims 1000 bytes; the payload must be
        // clamped to the real datagram length instead of panicking.
        let mut v = RawMessage::build(
            &BuildOptions::default(),
            Message::GetService,
        )
        .unwrap()
        .pack()
        .unwrap();
        v[0] = 0xe8;
        v[1] = 0x03;
        let msg = RawMessage::unpack(&v).unwrap();
        assert!(msg.payload.is_empty());
    }

    #[test]
    fn test_serial_roundtrip() {
        let s: Serial = "d073d5000001".parse().unwrap();
        assert_eq!(s.0, [0xd0, 0x73, 0xd5, 0x00, 0x00, 0x01]);
        assert_eq!(s.to_string(), "d073d5000001");
        assert_eq!(Serial::from_target(s.as_target()), s);
        assert_eq!(s.to_mac(), "d0:73:d5:00:00:01");

        assert!("d073d50000".parse::<Serial>().is_err());
        assert!("d073d500000z".parse::<Serial>().is_err());
    }

    #[test]
    fn test_lifx_string_truncation() {
        let s = LifxString::new("a very long label that does not fit in the field");
        assert_eq!(s.0.len(), 32);
        assert_eq!(s, *"a very long label that does not ");
    }
}
