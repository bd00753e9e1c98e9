//! MultiZone-namespace handlers (packet types 501-512).
//!
//! Standard replies carry 8 zones per packet; extended replies carry 82.  The extended encoding
//! is additionally gated on `has_extended_multizone`.

use super::{unhandled, HandlerCtx};
use crate::state::{clamp_kelvin, DeviceState};
use lifx_proto::{ApplicationRequest, Message, HSBK};

/// Zones per StateMultiZone packet.
const ZONES_PER_PACKET: usize = 8;
/// Zones per StateExtendedColorZones packet.
const ZONES_PER_EXTENDED_PACKET: usize = 82;

pub(super) fn handle(state: &mut DeviceState, req: &Message, ctx: &HandlerCtx) -> Vec<Message> {
    if !state.caps.has_multizone {
        return unhandled(req.get_num());
    }

    match req {
        Message::GetColorZones {
            start_index,
            end_index,
        } => {
            let count = state.zone_count();
            let last = count.saturating_sub(1).min(255) as u8;
            let start = (*start_index).min(last);
            let end = (*end_index).min(last).max(start);
            let mz = state.multizone.as_ref().expect("gated on has_multizone");

            let mut responses = Vec::new();
            let mut index = start;
            while index <= end {
                responses.push(state_multi_zone(count, index, &mz.zone_colors));
                match index.checked_add(ZONES_PER_PACKET as u8) {
                    Some(next) => index = next,
                    None => break,
                }
            }
            responses
        }

        Message::SetColorZones {
            start_index,
            end_index,
            color,
            apply,
            ..
        } => {
            let count = state.zone_count();
            let last = count.saturating_sub(1).min(255) as u8;
            let start = usize::from((*start_index).min(last));
            let end = usize::from((*end_index).min(last)).max(start);
            let color = clamp_kelvin(*color);
            let mz = state.multizone.as_mut().expect("gated on has_multizone");

            match apply {
                ApplicationRequest::NoApply => {
                    if mz.pending.is_none() {
                        mz.pending = Some(mz.zone_colors.clone());
                    }
                    let pending = mz.pending.as_mut().unwrap();
                    for zone in &mut pending[start..=end] {
                        *zone = color;
                    }
                }
                ApplicationRequest::ApplyOnly => {
                    if let Some(pending) = mz.pending.take() {
                        mz.zone_colors = pending;
                    }
                }
                _ => {
                    if let Some(pending) = mz.pending.take() {
                        mz.zone_colors = pending;
                    }
                    for zone in &mut mz.zone_colors[start..=end] {
                        *zone = color;
                    }
                }
            }

            let applied = !matches!(apply, ApplicationRequest::NoApply);
            if applied {
                state.touch();
            }
            if ctx.res_required && applied {
                let mz = state.multizone.as_ref().unwrap();
                vec![state_multi_zone(count, start as u8, &mz.zone_colors)]
            } else {
                Vec::new()
            }
        }

        Message::GetMultiZoneEffect => {
            let mz = state.multizone.as_ref().expect("gated on has_multizone");
            vec![Message::StateMultiZoneEffect {
                settings: mz.effect,
            }]
        }

        Message::SetMultiZoneEffect { settings } => {
            let mz = state.multizone.as_mut().expect("gated on has_multizone");
            mz.effect = *settings;
            state.touch();
            if ctx.res_required {
                vec![Message::StateMultiZoneEffect {
                    settings: *settings,
                }]
            } else {
                Vec::new()
            }
        }

        Message::SetExtendedColorZones {
            apply,
            zone_index,
            colors_count,
            colors,
            ..
        } => {
            if !state.caps.has_extended_multizone {
                return unhandled(req.get_num());
            }
            let count = state.zone_count();
            let mz = state.multizone.as_mut().expect("gated on has_multizone");

            let start = usize::from(*zone_index).min(usize::from(count));
            let writable = usize::from(count) - start;
            let n = usize::from(*colors_count)
                .min(colors.len())
                .min(writable);

            match apply {
                ApplicationRequest::NoApply => {
                    if mz.pending.is_none() {
                        mz.pending = Some(mz.zone_colors.clone());
                    }
                    let pending = mz.pending.as_mut().unwrap();
                    for (slot, color) in pending[start..start + n].iter_mut().zip(colors) {
                        *slot = clamp_kelvin(*color);
                    }
                }
                ApplicationRequest::ApplyOnly => {
                    if let Some(pending) = mz.pending.take() {
                        mz.zone_colors = pending;
                    }
                }
                _ => {
                    if let Some(pending) = mz.pending.take() {
                        mz.zone_colors = pending;
                    }
                    for (slot, color) in mz.zone_colors[start..start + n].iter_mut().zip(colors) {
                        *slot = clamp_kelvin(*color);
                    }
                }
            }

            let applied = !matches!(apply, ApplicationRequest::NoApply);
            if applied {
                state.touch();
            }
            if ctx.res_required && applied {
                let mz = state.multizone.as_ref().unwrap();
                vec![state_extended(count, 0, &mz.zone_colors)]
            } else {
                Vec::new()
            }
        }

        Message::GetExtendedColorZones => {
            if !state.caps.has_extended_multizone {
                return unhandled(req.get_num());
            }
            let count = state.zone_count();
            let mz = state.multizone.as_ref().expect("gated on has_multizone");

            let mut responses = Vec::new();
            let mut index = 0usize;
            while index < usize::from(count) {
                responses.push(state_extended(count, index as u16, &mz.zone_colors));
                index += ZONES_PER_EXTENDED_PACKET;
            }
            responses
        }

        other => unhandled(other.get_num()),
    }
}

/// One StateMultiZone packet: 8 zones starting at `index`, zero-padded past the end.
fn state_multi_zone(count: u16, index: u8, zones: &[HSBK]) -> Message {
    let start = usize::from(index);
    let colors = (start..start + ZONES_PER_PACKET)
        .map(|i| zones.get(i).copied().unwrap_or_default())
        .collect();
    Message::StateMultiZone {
        count: count.min(255) as u8,
        index,
        colors,
    }
}

/// One StateExtendedColorZones packet: up to 82 zones starting at `zone_index`.
fn state_extended(count: u16, zone_index: u16, zones: &[HSBK]) -> Message {
    let start = usize::from(zone_index);
    let n = zones.len().saturating_sub(start).min(ZONES_PER_EXTENDED_PACKET);
    let colors: Vec<HSBK> = zones[start..start + n].to_vec();
    Message::StateExtendedColorZones {
        zones_count: count,
        zone_index,
        colors_count: n as u8,
        colors,
    }
}
