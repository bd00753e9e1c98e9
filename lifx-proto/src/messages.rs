//! Typed packet payloads: the [Message] enum and its codecs.
//!
//! One variant exists per packet type.  [Message::from_raw] decodes a [RawMessage] payload and
//! [RawMessage::build] encodes one; both are table-driven (one `match` arm per type) so the set
//! can be regenerated from the upstream protocol description without touching the rest of the
//! crate.

use crate::{
    ApplicationRequest, EchoPayload, Error, LastHevCycleResult, LifxIdent, LifxString,
    LittleEndianReader, LittleEndianWriter, MultiZoneEffectSettings, RawMessage, Service,
    TileBufferRect, TileEffectSettings, TileStateDevice, Waveform, BuildOptions, Frame,
    FrameAddress, ProtocolHeader, HSBK, PROTOCOL_NUMBER,
};
use std::io::Cursor;

trait LifxFrom<T>: Sized {
    fn from(val: T) -> Result<Self, Error>;
}

macro_rules! derive_lifx_from {
{ $( $t:ty ),*} => {
    $(
        impl LifxFrom<$t> for $t {
            fn from(val: $t) -> Result<Self, Error> { Ok(val) }
        }
    )*

}
}

derive_lifx_from! {
    u8, u16, i16, u32, f32, u64, LifxIdent, LifxString, EchoPayload, HSBK, TileBufferRect,
    MultiZoneEffectSettings, TileEffectSettings
}

impl LifxFrom<u8> for bool {
    fn from(val: u8) -> Result<bool, Error> {
        Ok(val > 0)
    }
}

impl LifxFrom<u8> for Service {
    fn from(val: u8) -> Result<Service, Error> {
        Ok(Service::from_u8(val))
    }
}

impl LifxFrom<u8> for ApplicationRequest {
    fn from(val: u8) -> Result<ApplicationRequest, Error> {
        Ok(ApplicationRequest::from_u8(val))
    }
}

impl LifxFrom<u8> for Waveform {
    fn from(val: u8) -> Result<Waveform, Error> {
        Ok(Waveform::from_u8(val))
    }
}

impl LifxFrom<u8> for LastHevCycleResult {
    fn from(val: u8) -> Result<LastHevCycleResult, Error> {
        Ok(LastHevCycleResult::from_u8(val))
    }
}

macro_rules! unpack {
    ($msg:ident, $typ:ident, $( $n:ident: $t:ident ),*) => {
        {
        let mut c = Cursor::new(&$msg.payload);
        $(
            let $n: $t = c.read_val()?;
        )*

        Message::$typ{
            $(
                $n: LifxFrom::from($n)?,
            )*
        }
        }

    };
}

fn write_colors(v: &mut Vec<u8>, colors: &[HSBK], len: usize) -> Result<(), std::io::Error> {
    for idx in 0..len {
        v.write_val(colors.get(idx).copied().unwrap_or_default())?;
    }
    Ok(())
}

fn read_colors(c: &mut Cursor<&Vec<u8>>, len: usize) -> Result<Vec<HSBK>, std::io::Error> {
    let mut colors = Vec::with_capacity(len);
    for _ in 0..len {
        colors.push(c.read_val()?);
    }
    Ok(colors)
}

/// Decoded LIFX Messages
///
/// This enum lists all of the LIFX message types known to this library: the Device range (2-59
/// plus StateUnhandled 223), the Light range (101-149), the MultiZone range (501-512) and the
/// Tile range (701-720).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum Message {
    /// GetService - 2
    ///
    /// Sent by a client to acquire responses from all devices on the local network.  No payload
    /// is required.  Causes the devices to transmit a [Message::StateService] message.
    GetService,

    /// StateService - 3
    ///
    /// Response to [Message::GetService] message.
    StateService {
        /// unsigned 8-bit integer, maps to `Service`
        service: Service,
        /// Port number of the light.  If the service is temporarily unavailable, the port value
        /// will be 0.
        port: u32,
    },

    /// GetHostInfo - 12
    ///
    /// Get Host MCU information.  Causes the device to transmit a [Message::StateHostInfo]
    /// message.
    GetHostInfo,

    /// StateHostInfo - 13
    ///
    /// Response to [Message::GetHostInfo] message.
    StateHostInfo {
        /// radio receive signal strength
        signal: f32,
        /// Bytes transmitted since power on
        tx: u32,
        /// Bytes received since power on
        rx: u32,
        reserved: i16,
    },

    /// GetHostFirmware - 14
    ///
    /// Gets Host MCU firmware information.  Causes the device to transmit a
    /// [Message::StateHostFirmware] message.
    GetHostFirmware,

    /// StateHostFirmware - 15
    ///
    /// Response to [Message::GetHostFirmware] message.
    StateHostFirmware {
        /// Firmware build time (absolute time in nanoseconds since epoch)
        build: u64,
        reserved: u64,
        /// Minor component of the firmware version
        version_minor: u16,
        /// Major component of the firmware version
        version_major: u16,
    },

    /// GetWifiInfo - 16
    ///
    /// Get Wifi subsystem information.  Causes the device to transmit a [Message::StateWifiInfo]
    /// message.
    GetWifiInfo,

    /// StateWifiInfo - 17
    ///
    /// Response to [Message::GetWifiInfo] message.
    StateWifiInfo {
        /// Radio receive signal strength
        signal: f32,
        /// bytes transmitted since power on
        tx: u32,
        /// bytes received since power on
        rx: u32,
        reserved: i16,
    },

    /// GetWifiFirmware - 18
    ///
    /// Get Wifi subsystem firmware.  Causes the device to transmit a
    /// [Message::StateWifiFirmware] message.
    GetWifiFirmware,

    /// StateWifiFirmware - 19
    ///
    /// Response to [Message::GetWifiFirmware] message.
    StateWifiFirmware {
        /// firmware build time (absolute time in nanoseconds since epoch)
        build: u64,
        reserved: u64,
        version_minor: u16,
        version_major: u16,
    },

    /// GetPower - 20
    ///
    /// Get device power level.  Causes the device to transmit a [Message::StatePower] message.
    GetPower,

    /// SetPower - 21
    ///
    /// Set device power level.
    SetPower {
        /// normally a u16, but only 0 and 65535 are supported.
        ///
        /// Zero implies standby and non-zero sets a corresponding power draw level.
        level: u16,
    },

    /// StatePower - 22
    ///
    /// Response to [Message::GetPower] message.
    StatePower { level: u16 },

    /// GetLabel - 23
    ///
    /// Get device label.  Causes the device to transmit a [Message::StateLabel] message.
    GetLabel,

    /// SetLabel - 24
    ///
    /// Set the device label text.
    SetLabel { label: LifxString },

    /// StateLabel - 25
    ///
    /// Response to [Message::GetLabel] message.
    StateLabel { label: LifxString },

    /// GetVersion - 32
    ///
    /// Get the hardware version.  Causes the device to transmit a [Message::StateVersion]
    /// message.
    GetVersion,

    /// StateVersion - 33
    ///
    /// Response to [Message::GetVersion] message.
    StateVersion {
        /// vendor ID
        vendor: u32,
        /// product ID
        product: u32,
        /// hardware version
        version: u32,
    },

    /// GetInfo - 34
    ///
    /// Get run-time information.  Causes the device to transmit a [Message::StateInfo] message.
    GetInfo,

    /// StateInfo - 35
    ///
    /// Response to [Message::GetInfo] message.
    StateInfo {
        /// current time (absolute time in nanoseconds since epoch)
        time: u64,
        /// time since last power on (relative time in nanoseconds)
        uptime: u64,
        /// last power off period (5 second accuracy, in nanoseconds)
        downtime: u64,
    },

    /// Acknowledgement - 45
    ///
    /// Response to any message sent with ack_required set to 1.  See message header frame
    /// address.
    ///
    /// (Note that technically this message has no payload, but the frame sequence number is
    /// stored here for convenience).
    Acknowledgement { seq: u8 },

    /// GetLocation - 48
    ///
    /// Causes the device to transmit a [Message::StateLocation] message.
    GetLocation,

    /// SetLocation - 49
    ///
    /// Set the device location
    SetLocation {
        /// GUID byte array
        location: LifxIdent,
        /// text label for location
        label: LifxString,
        /// UTC timestamp of last label update in nanoseconds
        updated_at: u64,
    },

    /// StateLocation - 50
    ///
    /// Device location.
    StateLocation {
        location: LifxIdent,
        label: LifxString,
        updated_at: u64,
    },

    /// GetGroup - 51
    ///
    /// Causes the device to transmit a [Message::StateGroup] message.
    GetGroup,

    /// SetGroup - 52
    ///
    /// Set the device group
    SetGroup {
        group: LifxIdent,
        label: LifxString,
        updated_at: u64,
    },

    /// StateGroup - 53
    ///
    /// Device group.
    StateGroup {
        group: LifxIdent,
        label: LifxString,
        updated_at: u64,
    },

    /// EchoRequest - 58
    ///
    /// Request an arbitrary payload be echoed back.  Causes the device to transmit an
    /// [Message::EchoResponse] message.
    EchoRequest { payload: EchoPayload },

    /// EchoResponse - 59
    ///
    /// Response to [Message::EchoRequest] message.
    EchoResponse { payload: EchoPayload },

    /// StateUnhandled - 223
    ///
    /// Sent in place of a State reply when the device does not implement the requested
    /// operation.  Carries the rejected packet type.
    StateUnhandled { unhandled_type: u16 },

    /// Get - 101
    ///
    /// Sent by a client to obtain the light state.  Causes the device to transmit a
    /// [Message::LightState] message.
    LightGet,

    /// SetColor - 102
    ///
    /// Sent by a client to change the light state.
    ///
    /// If the Frame Address res_required field is set to one (1) then the device will transmit a
    /// State message.
    LightSetColor {
        reserved: u8,
        /// Color in HSBK
        color: HSBK,
        /// Color transition time in milliseconds
        duration: u32,
    },

    /// SetWaveform - 103
    ///
    /// Apply an effect to the bulb.
    SetWaveform {
        reserved: u8,
        transient: bool,
        color: HSBK,
        /// Duration of a cycle in milliseconds
        period: u32,
        /// Number of cycles
        cycles: f32,
        /// Waveform Skew, [-32768, 32767] scaled to [0, 1].
        skew_ratio: i16,
        /// Waveform to use for transition.
        waveform: Waveform,
    },

    /// State - 107
    ///
    /// Sent by a device to provide the current light state.
    LightState {
        color: HSBK,
        reserved: i16,
        power: u16,
        label: LifxString,
        reserved2: u64,
    },

    /// GetPower - 116
    ///
    /// Sent by a client to obtain the light power level.  Causes the device to transmit a
    /// [Message::LightStatePower] message.
    LightGetPower,

    /// SetPower - 117
    ///
    /// Sent by a client to change the light power level.  The power level must be either 0 or
    /// 65535; the duration is the transition time in milliseconds.
    LightSetPower { level: u16, duration: u32 },

    /// StatePower - 118
    ///
    /// Sent by a device to provide the current power level.
    LightStatePower { level: u16 },

    /// SetWaveformOptional - 119
    ///
    /// Apply an effect to the bulb, with per-component opt-outs.
    SetWaveformOptional {
        reserved: u8,
        transient: bool,
        color: HSBK,
        period: u32,
        cycles: f32,
        skew_ratio: i16,
        waveform: Waveform,
        set_hue: bool,
        set_saturation: bool,
        set_brightness: bool,
        set_kelvin: bool,
    },

    /// GetInfrared - 120
    ///
    /// Gets the current maximum power level of the Infrared channel
    LightGetInfrared,

    /// StateInfrared - 121
    ///
    /// Indicates the current maximum setting for the infrared channel.
    LightStateInfrared { brightness: u16 },

    /// SetInfrared - 122
    ///
    /// Set the current maximum brightness for the infrared channel.
    LightSetInfrared { brightness: u16 },

    /// GetHevCycle - 142
    GetHevCycle,

    /// SetHevCycle - 143
    ///
    /// Start or abort a HEV cleaning cycle.
    SetHevCycle {
        /// Start (true) or halt (false) the cycle
        enable: bool,
        /// Duration in seconds; zero means the default cycle duration
        duration_s: u32,
    },

    /// StateHevCycle - 144
    StateHevCycle {
        duration_s: u32,
        remaining_s: u32,
        last_power: u8,
    },

    /// GetHevCycleConfiguration - 145
    GetHevCycleConfiguration,

    /// SetHevCycleConfiguration - 146
    SetHevCycleConfiguration { indication: bool, duration_s: u32 },

    /// StateHevCycleConfiguration - 147
    StateHevCycleConfiguration { indication: bool, duration_s: u32 },

    /// GetLastHevCycleResult - 148
    GetLastHevCycleResult,

    /// StateLastHevCycleResult - 149
    StateLastHevCycleResult { result: LastHevCycleResult },

    /// SetColorZones - 501
    ///
    /// This message is used for changing the color of either a single or multiple zones.
    /// The changes are stored in a buffer and are only applied once a message with either
    /// [ApplicationRequest::Apply] or [ApplicationRequest::ApplyOnly] set.
    SetColorZones {
        start_index: u8,
        end_index: u8,
        color: HSBK,
        duration: u32,
        apply: ApplicationRequest,
    },

    /// GetColorZones - 502
    ///
    /// GetColorZones is used to request the zone colors for a range of zones.  The bulb will
    /// respond with either [Message::StateZone] or [Message::StateMultiZone] messages as
    /// required to cover the requested range.
    GetColorZones { start_index: u8, end_index: u8 },

    /// StateZone - 503
    ///
    /// The state of a single zone, with the `index` field indicating which zone is represented.
    /// The `count` field contains the count of the total number of zones available on the
    /// device.
    StateZone { count: u8, index: u8, color: HSBK },

    /// StateMultiZone - 506
    ///
    /// The state of eight consecutive zones in a single message.  As in [Message::StateZone] the
    /// `count` field represents the total number of zones on the device.  The `index` field is
    /// the zone of the first color; subsequent colors are the consecutive zones.
    StateMultiZone {
        count: u8,
        index: u8,
        /// always eight entries
        colors: Vec<HSBK>,
    },

    /// GetMultiZoneEffect - 507
    GetMultiZoneEffect,

    /// SetMultiZoneEffect - 508
    SetMultiZoneEffect { settings: MultiZoneEffectSettings },

    /// StateMultiZoneEffect - 509
    StateMultiZoneEffect { settings: MultiZoneEffectSettings },

    /// SetExtendedColorZones - 510
    ///
    /// Sets up to 82 zones in one message, starting at `zone_index`.
    SetExtendedColorZones {
        duration: u32,
        apply: ApplicationRequest,
        zone_index: u16,
        colors_count: u8,
        colors: Vec<HSBK>,
    },

    /// GetExtendedColorZones - 511
    GetExtendedColorZones,

    /// StateExtendedColorZones - 512
    ///
    /// Up to 82 zones of state, starting at `zone_index`.  `zones_count` is the total number of
    /// zones on the device.
    StateExtendedColorZones {
        zones_count: u16,
        zone_index: u16,
        colors_count: u8,
        colors: Vec<HSBK>,
    },

    /// GetDeviceChain - 701
    GetDeviceChain,

    /// StateDeviceChain - 702
    ///
    /// Describes the chain of tiles connected to this device.  Sixteen slots are always present
    /// on the wire; only `tile_devices_count` of them are meaningful.
    StateDeviceChain {
        start_index: u8,
        tile_devices: Vec<TileStateDevice>,
        tile_devices_count: u8,
    },

    /// SetUserPosition - 703
    ///
    /// Record where a tile sits in the user's arrangement.
    SetUserPosition {
        tile_index: u8,
        reserved: u16,
        user_x: f32,
        user_y: f32,
    },

    /// Get64 - 707
    ///
    /// Request up to 64 pixels from `length` tiles starting at `tile_index`.
    Get64 {
        tile_index: u8,
        length: u8,
        rect: TileBufferRect,
    },

    /// State64 - 711
    ///
    /// Up to 64 pixels from one tile's framebuffer.
    State64 {
        tile_index: u8,
        rect: TileBufferRect,
        /// always 64 entries
        colors: Vec<HSBK>,
    },

    /// Set64 - 715
    ///
    /// Write up to 64 pixels into a framebuffer rect on `length` tiles starting at
    /// `tile_index`.
    Set64 {
        tile_index: u8,
        length: u8,
        rect: TileBufferRect,
        duration: u32,
        colors: Vec<HSBK>,
    },

    /// CopyFrameBuffer - 716
    ///
    /// Copy a rect of pixels between two framebuffers on the same tiles.
    CopyFrameBuffer {
        tile_index: u8,
        length: u8,
        src_fb_index: u8,
        dst_fb_index: u8,
        x: u8,
        y: u8,
        width: u8,
    },

    /// GetTileEffect - 718
    GetTileEffect { reserved0: u8, reserved1: u8 },

    /// SetTileEffect - 719
    SetTileEffect {
        reserved0: u8,
        reserved1: u8,
        settings: TileEffectSettings,
    },

    /// StateTileEffect - 720
    StateTileEffect {
        reserved0: u8,
        settings: TileEffectSettings,
    },
}

impl Message {
    pub fn get_num(&self) -> u16 {
        match *self {
            Message::GetService => 2,
            Message::StateService { .. } => 3,
            Message::GetHostInfo => 12,
            Message::StateHostInfo { .. } => 13,
            Message::GetHostFirmware => 14,
            Message::StateHostFirmware { .. } => 15,
            Message::GetWifiInfo => 16,
            Message::StateWifiInfo { .. } => 17,
            Message::GetWifiFirmware => 18,
            Message::StateWifiFirmware { .. } => 19,
            Message::GetPower => 20,
            Message::SetPower { .. } => 21,
            Message::StatePower { .. } => 22,
            Message::GetLabel => 23,
            Message::SetLabel { .. } => 24,
            Message::StateLabel { .. } => 25,
            Message::GetVersion => 32,
            Message::StateVersion { .. } => 33,
            Message::GetInfo => 34,
            Message::StateInfo { .. } => 35,
            Message::Acknowledgement { .. } => 45,
            Message::GetLocation => 48,
            Message::SetLocation { .. } => 49,
            Message::StateLocation { .. } => 50,
            Message::GetGroup => 51,
            Message::SetGroup { .. } => 52,
            Message::StateGroup { .. } => 53,
            Message::EchoRequest { .. } => 58,
            Message::EchoResponse { .. } => 59,
            Message::StateUnhandled { .. } => 223,
            Message::LightGet => 101,
            Message::LightSetColor { .. } => 102,
            Message::SetWaveform { .. } => 103,
            Message::LightState { .. } => 107,
            Message::LightGetPower => 116,
            Message::LightSetPower { .. } => 117,
            Message::LightStatePower { .. } => 118,
            Message::SetWaveformOptional { .. } => 119,
            Message::LightGetInfrared => 120,
            Message::LightStateInfrared { .. } => 121,
            Message::LightSetInfrared { .. } => 122,
            Message::GetHevCycle => 142,
            Message::SetHevCycle { .. } => 143,
            Message::StateHevCycle { .. } => 144,
            Message::GetHevCycleConfiguration => 145,
            Message::SetHevCycleConfiguration { .. } => 146,
            Message::StateHevCycleConfiguration { .. } => 147,
            Message::GetLastHevCycleResult => 148,
            Message::StateLastHevCycleResult { .. } => 149,
            Message::SetColorZones { .. } => 501,
            Message::GetColorZones { .. } => 502,
            Message::StateZone { .. } => 503,
            Message::StateMultiZone { .. } => 506,
            Message::GetMultiZoneEffect => 507,
            Message::SetMultiZoneEffect { .. } => 508,
            Message::StateMultiZoneEffect { .. } => 509,
            Message::SetExtendedColorZones { .. } => 510,
            Message::GetExtendedColorZones => 511,
            Message::StateExtendedColorZones { .. } => 512,
            Message::GetDeviceChain => 701,
            Message::StateDeviceChain { .. } => 702,
            Message::SetUserPosition { .. } => 703,
            Message::Get64 { .. } => 707,
            Message::State64 { .. } => 711,
            Message::Set64 { .. } => 715,
            Message::CopyFrameBuffer { .. } => 716,
            Message::GetTileEffect { .. } => 718,
            Message::SetTileEffect { .. } => 719,
            Message::StateTileEffect { .. } => 720,
        }
    }

    /// Tries to parse the payload in a [RawMessage], based on its message type.
    pub fn from_raw(msg: &RawMessage) -> Result<Message, Error> {
        match msg.protocol_header.typ {
            2 => Ok(Message::GetService),
            3 => Ok(unpack!(msg, StateService, service: u8, port: u32)),
            12 => Ok(Message::GetHostInfo),
            13 => Ok(unpack!(
                msg,
                StateHostInfo,
                signal: f32,
                tx: u32,
                rx: u32,
                reserved: i16
            )),
            14 => Ok(Message::GetHostFirmware),
            15 => Ok(unpack!(
                msg,
                StateHostFirmware,
                build: u64,
                reserved: u64,
                version_minor: u16,
                version_major: u16
            )),
            16 => Ok(Message::GetWifiInfo),
            17 => Ok(unpack!(
                msg,
                StateWifiInfo,
                signal: f32,
                tx: u32,
                rx: u32,
                reserved: i16
            )),
            18 => Ok(Message::GetWifiFirmware),
            19 => Ok(unpack!(
                msg,
                StateWifiFirmware,
                build: u64,
                reserved: u64,
                version_minor: u16,
                version_major: u16
            )),
            20 => Ok(Message::GetPower),
            21 => Ok(unpack!(msg, SetPower, level: u16)),
            22 => Ok(unpack!(msg, StatePower, level: u16)),
            23 => Ok(Message::GetLabel),
            24 => Ok(unpack!(msg, SetLabel, label: LifxString)),
            25 => Ok(unpack!(msg, StateLabel, label: LifxString)),
            32 => Ok(Message::GetVersion),
            33 => Ok(unpack!(
                msg,
                StateVersion,
                vendor: u32,
                product: u32,
                version: u32
            )),
            34 => Ok(Message::GetInfo),
            35 => Ok(unpack!(
                msg,
                StateInfo,
                time: u64,
                uptime: u64,
                downtime: u64
            )),
            45 => Ok(Message::Acknowledgement {
                seq: msg.frame_addr.sequence,
            }),
            48 => Ok(Message::GetLocation),
            49 => Ok(unpack!(
                msg,
                SetLocation,
                location: LifxIdent,
                label: LifxString,
                updated_at: u64
            )),
            50 => Ok(unpack!(
                msg,
                StateLocation,
                location: LifxIdent,
                label: LifxString,
                updated_at: u64
            )),
            51 => Ok(Message::GetGroup),
            52 => Ok(unpack!(
                msg,
                SetGroup,
                group: LifxIdent,
                label: LifxString,
                updated_at: u64
            )),
            53 => Ok(unpack!(
                msg,
                StateGroup,
                group: LifxIdent,
                label: LifxString,
                updated_at: u64
            )),
            58 => Ok(unpack!(msg, EchoRequest, payload: EchoPayload)),
            59 => Ok(unpack!(msg, EchoResponse, payload: EchoPayload)),
            223 => Ok(unpack!(msg, StateUnhandled, unhandled_type: u16)),
            101 => Ok(Message::LightGet),
            102 => Ok(unpack!(
                msg,
                LightSetColor,
                reserved: u8,
                color: HSBK,
                duration: u32
            )),
            103 => Ok(unpack!(
                msg,
                SetWaveform,
                reserved: u8,
                transient: u8,
                color: HSBK,
                period: u32,
                cycles: f32,
                skew_ratio: i16,
                waveform: u8
            )),
            107 => Ok(unpack!(
                msg,
                LightState,
                color: HSBK,
                reserved: i16,
                power: u16,
                label: LifxString,
                reserved2: u64
            )),
            116 => Ok(Message::LightGetPower),
            117 => Ok(unpack!(msg, LightSetPower, level: u16, duration: u32)),
            118 => Ok(unpack!(msg, LightStatePower, level: u16)),
            119 => Ok(unpack!(
                msg,
                SetWaveformOptional,
                reserved: u8,
                transient: u8,
                color: HSBK,
                period: u32,
                cycles: f32,
                skew_ratio: i16,
                waveform: u8,
                set_hue: u8,
                set_saturation: u8,
                set_brightness: u8,
                set_kelvin: u8
            )),
            120 => Ok(Message::LightGetInfrared),
            121 => Ok(unpack!(msg, LightStateInfrared, brightness: u16)),
            122 => Ok(unpack!(msg, LightSetInfrared, brightness: u16)),
            142 => Ok(Message::GetHevCycle),
            143 => Ok(unpack!(msg, SetHevCycle, enable: u8, duration_s: u32)),
            144 => Ok(unpack!(
                msg,
                StateHevCycle,
                duration_s: u32,
                remaining_s: u32,
                last_power: u8
            )),
            145 => Ok(Message::GetHevCycleConfiguration),
            146 => Ok(unpack!(
                msg,
                SetHevCycleConfiguration,
                indication: u8,
                duration_s: u32
            )),
            147 => Ok(unpack!(
                msg,
                StateHevCycleConfiguration,
                indication: u8,
                duration_s: u32
            )),
            148 => Ok(Message::GetLastHevCycleResult),
            149 => Ok(unpack!(msg, StateLastHevCycleResult, result: u8)),
            501 => Ok(unpack!(
                msg,
                SetColorZones,
                start_index: u8,
                end_index: u8,
                color: HSBK,
                duration: u32,
                apply: u8
            )),
            502 => Ok(unpack!(msg, GetColorZones, start_index: u8, end_index: u8)),
            503 => Ok(unpack!(msg, StateZone, count: u8, index: u8, color: HSBK)),
            506 => {
                let mut c = Cursor::new(&msg.payload);
                let count: u8 = c.read_val()?;
                let index: u8 = c.read_val()?;
                let colors = read_colors(&mut c, 8)?;
                Ok(Message::StateMultiZone {
                    count,
                    index,
                    colors,
                })
            }
            507 => Ok(Message::GetMultiZoneEffect),
            508 => Ok(unpack!(
                msg,
                SetMultiZoneEffect,
                settings: MultiZoneEffectSettings
            )),
            509 => Ok(unpack!(
                msg,
                StateMultiZoneEffect,
                settings: MultiZoneEffectSettings
            )),
            510 => {
                let mut c = Cursor::new(&msg.payload);
                let duration: u32 = c.read_val()?;
                let apply = ApplicationRequest::from_u8(c.read_val()?);
                let zone_index: u16 = c.read_val()?;
                let colors_count: u8 = c.read_val()?;
                let mut colors = read_colors(&mut c, 82)?;
                colors.truncate(usize::from(colors_count).min(82));
                Ok(Message::SetExtendedColorZones {
                    duration,
                    apply,
                    zone_index,
                    colors_count,
                    colors,
                })
            }
            511 => Ok(Message::GetExtendedColorZones),
            512 => {
                let mut c = Cursor::new(&msg.payload);
                let zones_count: u16 = c.read_val()?;
                let zone_index: u16 = c.read_val()?;
                let colors_count: u8 = c.read_val()?;
                let mut colors = read_colors(&mut c, 82)?;
                colors.truncate(usize::from(colors_count).min(82));
                Ok(Message::StateExtendedColorZones {
                    zones_count,
                    zone_index,
                    colors_count,
                    colors,
                })
            }
            701 => Ok(Message::GetDeviceChain),
            702 => {
                let mut c = Cursor::new(&msg.payload);
                let start_index: u8 = c.read_val()?;
                let mut tile_devices = Vec::with_capacity(16);
                for _ in 0..16 {
                    tile_devices.push(c.read_val()?);
                }
                let tile_devices_count: u8 = c.read_val()?;
                tile_devices.truncate(usize::from(tile_devices_count).min(16));
                Ok(Message::StateDeviceChain {
                    start_index,
                    tile_devices,
                    tile_devices_count,
                })
            }
            703 => Ok(unpack!(
                msg,
                SetUserPosition,
                tile_index: u8,
                reserved: u16,
                user_x: f32,
                user_y: f32
            )),
            707 => Ok(unpack!(
                msg,
                Get64,
                tile_index: u8,
                length: u8,
                rect: TileBufferRect
            )),
            711 => {
                let mut c = Cursor::new(&msg.payload);
                let tile_index: u8 = c.read_val()?;
                let rect: TileBufferRect = c.read_val()?;
                let colors = read_colors(&mut c, 64)?;
                Ok(Message::State64 {
                    tile_index,
                    rect,
                    colors,
                })
            }
            715 => {
                let mut c = Cursor::new(&msg.payload);
                let tile_index: u8 = c.read_val()?;
                let length: u8 = c.read_val()?;
                let rect: TileBufferRect = c.read_val()?;
                let duration: u32 = c.read_val()?;
                let colors = read_colors(&mut c, 64)?;
                Ok(Message::Set64 {
                    tile_index,
                    length,
                    rect,
                    duration,
                    colors,
                })
            }
            716 => Ok(unpack!(
                msg,
                CopyFrameBuffer,
                tile_index: u8,
                length: u8,
                src_fb_index: u8,
                dst_fb_index: u8,
                x: u8,
                y: u8,
                width: u8
            )),
            718 => Ok(unpack!(msg, GetTileEffect, reserved0: u8, reserved1: u8)),
            719 => Ok(unpack!(
                msg,
                SetTileEffect,
                reserved0: u8,
                reserved1: u8,
                settings: TileEffectSettings
            )),
            720 => Ok(unpack!(
                msg,
                StateTileEffect,
                reserved0: u8,
                settings: TileEffectSettings
            )),
            _ => Err(Error::UnknownMessageType(msg.protocol_header.typ)),
        }
    }
}

/// The packet name for a type number, if it's one this library knows.
pub fn type_name(pkt_type: u16) -> Option<&'static str> {
    Some(match pkt_type {
        2 => "GetService",
        3 => "StateService",
        12 => "GetHostInfo",
        13 => "StateHostInfo",
        14 => "GetHostFirmware",
        15 => "StateHostFirmware",
        16 => "GetWifiInfo",
        17 => "StateWifiInfo",
        18 => "GetWifiFirmware",
        19 => "StateWifiFirmware",
        20 => "GetPower",
        21 => "SetPower",
        22 => "StatePower",
        23 => "GetLabel",
        24 => "SetLabel",
        25 => "StateLabel",
        32 => "GetVersion",
        33 => "StateVersion",
        34 => "GetInfo",
        35 => "StateInfo",
        45 => "Acknowledgement",
        48 => "GetLocation",
        49 => "SetLocation",
        50 => "StateLocation",
        51 => "GetGroup",
        52 => "SetGroup",
        53 => "StateGroup",
        58 => "EchoRequest",
        59 => "EchoResponse",
        223 => "StateUnhandled",
        101 => "LightGet",
        102 => "LightSetColor",
        103 => "SetWaveform",
        107 => "LightState",
        116 => "LightGetPower",
        117 => "LightSetPower",
        118 => "LightStatePower",
        119 => "SetWaveformOptional",
        120 => "LightGetInfrared",
        121 => "LightStateInfrared",
        122 => "LightSetInfrared",
        142 => "GetHevCycle",
        143 => "SetHevCycle",
        144 => "StateHevCycle",
        145 => "GetHevCycleConfiguration",
        146 => "SetHevCycleConfiguration",
        147 => "StateHevCycleConfiguration",
        148 => "GetLastHevCycleResult",
        149 => "StateLastHevCycleResult",
        501 => "SetColorZones",
        502 => "GetColorZones",
        503 => "StateZone",
        506 => "StateMultiZone",
        507 => "GetMultiZoneEffect",
        508 => "SetMultiZoneEffect",
        509 => "StateMultiZoneEffect",
        510 => "SetExtendedColorZones",
        511 => "GetExtendedColorZones",
        512 => "StateExtendedColorZones",
        701 => "GetDeviceChain",
        702 => "StateDeviceChain",
        703 => "SetUserPosition",
        707 => "Get64",
        711 => "State64",
        715 => "Set64",
        716 => "CopyFrameBuffer",
        718 => "GetTileEffect",
        719 => "SetTileEffect",
        720 => "StateTileEffect",
        _ => return None,
    })
}

impl RawMessage {
    /// Build a RawMessage (which is suitable for sending on the network) from a given Message
    /// type.
    ///
    /// If [BuildOptions::target] is None, then the message is addressed to all devices.  Else it
    /// should be a device serial (see [crate::Serial::as_target]).
    pub fn build(options: &BuildOptions, typ: Message) -> Result<RawMessage, Error> {
        let frame = Frame {
            size: 0,
            origin: 0,
            tagged: options.target.is_none(),
            addressable: true,
            protocol: PROTOCOL_NUMBER,
            source: options.source,
        };
        let addr = FrameAddress {
            target: options.target.unwrap_or(0),
            reserved: [0; 6],
            reserved2: 0,
            ack_required: options.ack_required,
            res_required: options.res_required,
            sequence: options.sequence,
        };
        let phead = ProtocolHeader {
            reserved: 0,
            reserved2: 0,
            typ: typ.get_num(),
        };

        let mut v = Vec::new();
        match typ {
            Message::GetService
            | Message::GetHostInfo
            | Message::GetHostFirmware
            | Message::GetWifiFirmware
            | Message::GetWifiInfo
            | Message::GetPower
            | Message::GetLabel
            | Message::GetVersion
            | Message::GetInfo
            | Message::Acknowledgement { .. }
            | Message::GetLocation
            | Message::GetGroup
            | Message::LightGet
            | Message::LightGetPower
            | Message::LightGetInfrared
            | Message::GetHevCycle
            | Message::GetHevCycleConfiguration
            | Message::GetLastHevCycleResult
            | Message::GetMultiZoneEffect
            | Message::GetExtendedColorZones
            | Message::GetDeviceChain => {
                // these types have no payload
            }
            Message::StateService { service, port } => {
                v.write_val(service)?;
                v.write_val(port)?;
            }
            Message::StateHostInfo {
                signal,
                tx,
                rx,
                reserved,
            }
            | Message::StateWifiInfo {
                signal,
                tx,
                rx,
                reserved,
            } => {
                v.write_val(signal)?;
                v.write_val(tx)?;
                v.write_val(rx)?;
                v.write_val(reserved)?;
            }
            Message::StateHostFirmware {
                build,
                reserved,
                version_minor,
                version_major,
            }
            | Message::StateWifiFirmware {
                build,
                reserved,
                version_minor,
                version_major,
            } => {
                v.write_val(build)?;
                v.write_val(reserved)?;
                v.write_val(version_minor)?;
                v.write_val(version_major)?;
            }
            Message::SetPower { level } => {
                v.write_val(level)?;
            }
            Message::StatePower { level } => {
                v.write_val(level)?;
            }
            Message::SetLabel { label } => {
                v.write_val(label)?;
            }
            Message::StateLabel { label } => {
                v.write_val(label)?;
            }
            Message::StateVersion {
                vendor,
                product,
                version,
            } => {
                v.write_val(vendor)?;
                v.write_val(product)?;
                v.write_val(version)?;
            }
            Message::StateInfo {
                time,
                uptime,
                downtime,
            } => {
                v.write_val(time)?;
                v.write_val(uptime)?;
                v.write_val(downtime)?;
            }
            Message::SetLocation {
                location,
                label,
                updated_at,
            }
            | Message::StateLocation {
                location,
                label,
                updated_at,
            } => {
                v.write_val(location)?;
                v.write_val(label)?;
                v.write_val(updated_at)?;
            }
            Message::SetGroup {
                group,
                label,
                updated_at,
            }
            | Message::StateGroup {
                group,
                label,
                updated_at,
            } => {
                v.write_val(group)?;
                v.write_val(label)?;
                v.write_val(updated_at)?;
            }
            Message::EchoRequest { payload } => {
                v.write_val(payload)?;
            }
            Message::EchoResponse { payload } => {
                v.write_val(payload)?;
            }
            Message::StateUnhandled { unhandled_type } => {
                v.write_val(unhandled_type)?;
            }
            Message::LightSetColor {
                reserved,
                color,
                duration,
            } => {
                v.write_val(reserved)?;
                v.write_val(color)?;
                v.write_val(duration)?;
            }
            Message::SetWaveform {
                reserved,
                transient,
                color,
                period,
                cycles,
                skew_ratio,
                waveform,
            } => {
                v.write_val(reserved)?;
                v.write_val(transient)?;
                v.write_val(color)?;
                v.write_val(period)?;
                v.write_val(cycles)?;
                v.write_val(skew_ratio)?;
                v.write_val(waveform)?;
            }
            Message::LightState {
                color,
                reserved,
                power,
                label,
                reserved2,
            } => {
                v.write_val(color)?;
                v.write_val(reserved)?;
                v.write_val(power)?;
                v.write_val(label)?;
                v.write_val(reserved2)?;
            }
            Message::LightSetPower { level, duration } => {
                v.write_val(if level > 0 { 65535u16 } else { 0u16 })?;
                v.write_val(duration)?;
            }
            Message::LightStatePower { level } => {
                v.write_val(level)?;
            }
            Message::SetWaveformOptional {
                reserved,
                transient,
                color,
                period,
                cycles,
                skew_ratio,
                waveform,
                set_hue,
                set_saturation,
                set_brightness,
                set_kelvin,
            } => {
                v.write_val(reserved)?;
                v.write_val(transient)?;
                v.write_val(color)?;
                v.write_val(period)?;
                v.write_val(cycles)?;
                v.write_val(skew_ratio)?;
                v.write_val(waveform)?;
                v.write_val(set_hue)?;
                v.write_val(set_saturation)?;
                v.write_val(set_brightness)?;
                v.write_val(set_kelvin)?;
            }
            Message::LightStateInfrared { brightness } => v.write_val(brightness)?,
            Message::LightSetInfrared { brightness } => v.write_val(brightness)?,
            Message::SetHevCycle { enable, duration_s } => {
                v.write_val(enable)?;
                v.write_val(duration_s)?;
            }
            Message::StateHevCycle {
                duration_s,
                remaining_s,
                last_power,
            } => {
                v.write_val(duration_s)?;
                v.write_val(remaining_s)?;
                v.write_val(last_power)?;
            }
            Message::SetHevCycleConfiguration {
                indication,
                duration_s,
            }
            | Message::StateHevCycleConfiguration {
                indication,
                duration_s,
            } => {
                v.write_val(indication)?;
                v.write_val(duration_s)?;
            }
            Message::StateLastHevCycleResult { result } => {
                v.write_val(result)?;
            }
            Message::SetColorZones {
                start_index,
                end_index,
                color,
                duration,
                apply,
            } => {
                v.write_val(start_index)?;
                v.write_val(end_index)?;
                v.write_val(color)?;
                v.write_val(duration)?;
                v.write_val(apply)?;
            }
            Message::GetColorZones {
                start_index,
                end_index,
            } => {
                v.write_val(start_index)?;
                v.write_val(end_index)?;
            }
            Message::StateZone {
                count,
                index,
                color,
            } => {
                v.write_val(count)?;
                v.write_val(index)?;
                v.write_val(color)?;
            }
            Message::StateMultiZone {
                count,
                index,
                colors,
            } => {
                v.write_val(count)?;
                v.write_val(index)?;
                write_colors(&mut v, &colors, 8)?;
            }
            Message::SetMultiZoneEffect { settings } => {
                v.write_val(settings)?;
            }
            Message::StateMultiZoneEffect { settings } => {
                v.write_val(settings)?;
            }
            Message::SetExtendedColorZones {
                duration,
                apply,
                zone_index,
                colors_count,
                colors,
            } => {
                v.write_val(duration)?;
                v.write_val(apply)?;
                v.write_val(zone_index)?;
                v.write_val(colors_count)?;
                write_colors(&mut v, &colors, 82)?;
            }
            Message::StateExtendedColorZones {
                zones_count,
                zone_index,
                colors_count,
                colors,
            } => {
                v.write_val(zones_count)?;
                v.write_val(zone_index)?;
                v.write_val(colors_count)?;
                write_colors(&mut v, &colors, 82)?;
            }
            Message::StateDeviceChain {
                start_index,
                tile_devices,
                tile_devices_count,
            } => {
                v.write_val(start_index)?;
                for idx in 0..16 {
                    v.write_val(tile_devices.get(idx).copied().unwrap_or_default())?;
                }
                v.write_val(tile_devices_count)?;
            }
            Message::SetUserPosition {
                tile_index,
                reserved,
                user_x,
                user_y,
            } => {
                v.write_val(tile_index)?;
                v.write_val(reserved)?;
                v.write_val(user_x)?;
                v.write_val(user_y)?;
            }
            Message::Get64 {
                tile_index,
                length,
                rect,
            } => {
                v.write_val(tile_index)?;
                v.write_val(length)?;
                v.write_val(rect)?;
            }
            Message::State64 {
                tile_index,
                rect,
                colors,
            } => {
                v.write_val(tile_index)?;
                v.write_val(rect)?;
                write_colors(&mut v, &colors, 64)?;
            }
            Message::Set64 {
                tile_index,
                length,
                rect,
                duration,
                colors,
            } => {
                v.write_val(tile_index)?;
                v.write_val(length)?;
                v.write_val(rect)?;
                v.write_val(duration)?;
                write_colors(&mut v, &colors, 64)?;
            }
            Message::CopyFrameBuffer {
                tile_index,
                length,
                src_fb_index,
                dst_fb_index,
                x,
                y,
                width,
            } => {
                v.write_val(tile_index)?;
                v.write_val(length)?;
                v.write_val(src_fb_index)?;
                v.write_val(dst_fb_index)?;
                v.write_val(x)?;
                v.write_val(y)?;
                v.write_val(width)?;
            }
            Message::GetTileEffect {
                reserved0,
                reserved1,
            } => {
                v.write_val(reserved0)?;
                v.write_val(reserved1)?;
            }
            Message::SetTileEffect {
                reserved0,
                reserved1,
                settings,
            } => {
                v.write_val(reserved0)?;
                v.write_val(reserved1)?;
                v.write_val(settings)?;
            }
            Message::StateTileEffect {
                reserved0,
                settings,
            } => {
                v.write_val(reserved0)?;
                v.write_val(settings)?;
            }
        }

        let mut msg = RawMessage {
            frame,
            frame_addr: addr,
            protocol_header: phead,
            payload: v,
        };

        msg.frame.size = msg.packed_size() as u16;

        Ok(msg)
    }
}
