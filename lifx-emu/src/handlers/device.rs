//! Device-namespace handlers (packet types 2-59).  Every device implements these.

use super::{unhandled, HandlerCtx};
use crate::state::DeviceState;
use lifx_proto::{Message, Service};

pub(super) fn handle(state: &mut DeviceState, req: &Message, ctx: &HandlerCtx) -> Vec<Message> {
    match req {
        Message::GetService => vec![Message::StateService {
            service: Service::Udp,
            port: state.port,
        }],

        Message::GetHostInfo => vec![Message::StateHostInfo {
            signal: state.wifi_signal_dbm,
            tx: 0,
            rx: 0,
            reserved: 0,
        }],

        Message::GetHostFirmware => vec![state_firmware(state, ctx, false)],

        Message::GetWifiInfo => vec![Message::StateWifiInfo {
            signal: state.wifi_signal_dbm,
            tx: 0,
            rx: 0,
            reserved: 0,
        }],

        Message::GetWifiFirmware => vec![state_firmware(state, ctx, true)],

        Message::GetPower => vec![Message::StatePower {
            level: state.power_level,
        }],

        Message::SetPower { level } => {
            state.set_power(*level);
            if ctx.res_required {
                vec![Message::StatePower {
                    level: state.power_level,
                }]
            } else {
                Vec::new()
            }
        }

        Message::GetLabel => vec![Message::StateLabel {
            label: state.label.clone(),
        }],

        Message::SetLabel { label } => {
            state.set_label(label.clone());
            if ctx.res_required {
                vec![Message::StateLabel {
                    label: state.label.clone(),
                }]
            } else {
                Vec::new()
            }
        }

        Message::GetVersion => vec![Message::StateVersion {
            vendor: state.vendor,
            product: state.product,
            version: state.hw_version,
        }],

        Message::GetInfo => vec![Message::StateInfo {
            time: state.now_nanos(),
            uptime: state.uptime_nanos(),
            downtime: 0,
        }],

        Message::GetLocation => vec![Message::StateLocation {
            location: state.location.id,
            label: state.location.label.clone(),
            updated_at: state.location.updated_at,
        }],

        Message::SetLocation {
            location,
            label,
            updated_at,
        } => {
            state.set_location(*location, label.clone(), *updated_at);
            if ctx.res_required {
                vec![Message::StateLocation {
                    location: state.location.id,
                    label: state.location.label.clone(),
                    updated_at: state.location.updated_at,
                }]
            } else {
                Vec::new()
            }
        }

        Message::GetGroup => vec![Message::StateGroup {
            group: state.group.id,
            label: state.group.label.clone(),
            updated_at: state.group.updated_at,
        }],

        Message::SetGroup {
            group,
            label,
            updated_at,
        } => {
            state.set_group(*group, label.clone(), *updated_at);
            if ctx.res_required {
                vec![Message::StateGroup {
                    group: state.group.id,
                    label: state.group.label.clone(),
                    updated_at: state.group.updated_at,
                }]
            } else {
                Vec::new()
            }
        }

        Message::EchoRequest { payload } => vec![Message::EchoResponse {
            payload: payload.clone(),
        }],

        other => unhandled(other.get_num()),
    }
}

/// StateHostFirmware and StateWifiFirmware share a shape; the scenario's firmware override
/// applies to both.
fn state_firmware(state: &DeviceState, ctx: &HandlerCtx, wifi: bool) -> Message {
    let (version_major, version_minor) = ctx
        .rules
        .firmware_version
        .unwrap_or((state.firmware_major, state.firmware_minor));
    if wifi {
        Message::StateWifiFirmware {
            build: state.build_timestamp,
            reserved: 0,
            version_minor,
            version_major,
        }
    } else {
        Message::StateHostFirmware {
            build: state.build_timestamp,
            reserved: 0,
            version_minor,
            version_major,
        }
    }
}
