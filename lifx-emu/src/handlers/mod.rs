//! Packet-type to behavior dispatch.
//!
//! One module per protocol namespace; [dispatch] routes a decoded request to the right one.
//! Handlers are plain functions over `&mut DeviceState` returning the reply payloads (no
//! headers; the transport frames them).  Capability gating happens here: a switch answers
//! StateUnhandled for every non-Device packet, and per-feature requests (infrared, HEV,
//! multizone, matrix) answer StateUnhandled when the capability is absent.

mod device;
mod light;
mod multizone;
mod tile;

use crate::scenarios::MergedRules;
use crate::state::DeviceState;
use lifx_proto::Message;

/// The protocol namespaces, by packet-type range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Device,
    Light,
    MultiZone,
    Tile,
}

pub fn namespace_of(pkt_type: u16) -> Option<Namespace> {
    match pkt_type {
        2..=59 => Some(Namespace::Device),
        101..=149 => Some(Namespace::Light),
        501..=512 => Some(Namespace::MultiZone),
        701..=720 => Some(Namespace::Tile),
        _ => None,
    }
}

/// Whether a handler is registered for this packet type.  Requests outside this set follow the
/// scenario's `send_unhandled` policy instead of being dispatched.
pub fn is_registered(pkt_type: u16) -> bool {
    matches!(
        pkt_type,
        2 | 12
            | 14
            | 16
            | 18
            | 20
            | 21
            | 23
            | 24
            | 32
            | 34
            | 48
            | 49
            | 51
            | 52
            | 58
            | 101
            | 102
            | 103
            | 116
            | 117
            | 119
            | 120
            | 122
            | 142
            | 143
            | 145
            | 146
            | 148
            | 501
            | 502
            | 507
            | 508
            | 510
            | 511
            | 701
            | 703
            | 707
            | 715
            | 716
            | 718
            | 719
    )
}

/// Context a handler may consult beyond the device state.
pub struct HandlerCtx<'a> {
    /// The request header's res_required bit.  Get-style requests reply regardless; setters
    /// only reply when this is set.
    pub res_required: bool,
    pub rules: &'a MergedRules,
}

pub(crate) fn unhandled(pkt_type: u16) -> Vec<Message> {
    vec![Message::StateUnhandled {
        unhandled_type: pkt_type,
    }]
}

/// Run the handler for `req` against `state`, returning reply payloads in send order.
pub fn dispatch(state: &mut DeviceState, req: &Message, ctx: &HandlerCtx) -> Vec<Message> {
    let pkt_type = req.get_num();
    let ns = match namespace_of(pkt_type) {
        Some(ns) => ns,
        None => return unhandled(pkt_type),
    };

    // Relay switches only implement the Device namespace.
    if state.caps.is_switch() && ns != Namespace::Device {
        return unhandled(pkt_type);
    }

    match ns {
        Namespace::Device => device::handle(state, req, ctx),
        Namespace::Light => light::handle(state, req, ctx),
        Namespace::MultiZone => multizone::handle(state, req, ctx),
        Namespace::Tile => tile::handle(state, req, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory;
    use crate::scenarios::MergedRules;
    use lifx_proto::{ApplicationRequest, Message, TileBufferRect, HSBK};

    fn ctx(rules: &MergedRules) -> HandlerCtx {
        HandlerCtx {
            res_required: true,
            rules,
        }
    }

    #[test]
    fn switch_rejects_every_non_device_namespace() {
        let mut st = factory::create_switch("d073d5ff0070".parse().unwrap());
        let rules = MergedRules::default();

        let requests: Vec<Message> = vec![
            Message::LightGet,
            Message::LightSetColor {
                reserved: 0,
                color: HSBK::default(),
                duration: 0,
            },
            Message::LightGetPower,
            Message::GetColorZones {
                start_index: 0,
                end_index: 7,
            },
            Message::SetColorZones {
                start_index: 0,
                end_index: 7,
                color: HSBK::default(),
                duration: 0,
                apply: ApplicationRequest::Apply,
            },
            Message::GetExtendedColorZones,
            Message::GetDeviceChain,
            Message::Get64 {
                tile_index: 0,
                length: 1,
                rect: TileBufferRect::default(),
            },
        ];

        for req in requests {
            let typ = req.get_num();
            let responses = dispatch(&mut st, &req, &ctx(&rules));
            assert_eq!(responses.len(), 1, "packet {}", typ);
            assert_eq!(
                responses[0],
                Message::StateUnhandled {
                    unhandled_type: typ
                }
            );
        }
    }

    #[test]
    fn switch_handles_device_namespace_normally() {
        let mut st = factory::create_switch("d073d5ff0070".parse().unwrap());
        let rules = MergedRules::default();

        let responses = dispatch(&mut st, &Message::GetLabel, &ctx(&rules));
        assert!(matches!(responses[0], Message::StateLabel { .. }));

        let responses = dispatch(&mut st, &Message::GetVersion, &ctx(&rules));
        assert!(matches!(
            responses[0],
            Message::StateVersion { product: 70, .. }
        ));
    }

    #[test]
    fn namespaces_cover_the_documented_ranges() {
        assert_eq!(namespace_of(2), Some(Namespace::Device));
        assert_eq!(namespace_of(59), Some(Namespace::Device));
        assert_eq!(namespace_of(101), Some(Namespace::Light));
        assert_eq!(namespace_of(149), Some(Namespace::Light));
        assert_eq!(namespace_of(501), Some(Namespace::MultiZone));
        assert_eq!(namespace_of(512), Some(Namespace::MultiZone));
        assert_eq!(namespace_of(701), Some(Namespace::Tile));
        assert_eq!(namespace_of(720), Some(Namespace::Tile));
        assert_eq!(namespace_of(223), None);
        assert_eq!(namespace_of(1), None);
    }
}
