//! Tile/Matrix-namespace handlers (packet types 701-720).
//!
//! Matrix devices carry up to 8 framebuffers per tile; buffer 0 is the visible one, the others
//! are scratch space allocated on first write.  Pixel rects are row-major within a tile.

use super::{unhandled, HandlerCtx};
use crate::state::{clamp_kelvin, DeviceState, MatrixState, TILE_PIXELS};
use lifx_proto::{Message, TileBufferRect, HSBK};

pub(super) fn handle(state: &mut DeviceState, req: &Message, ctx: &HandlerCtx) -> Vec<Message> {
    if !state.caps.has_matrix {
        return unhandled(req.get_num());
    }

    match req {
        Message::GetDeviceChain => {
            let m = state.matrix.as_ref().expect("gated on has_matrix");
            vec![Message::StateDeviceChain {
                start_index: 0,
                tile_devices: m.tiles.clone(),
                tile_devices_count: m.tile_count,
            }]
        }

        Message::SetUserPosition {
            tile_index,
            user_x,
            user_y,
            ..
        } => {
            let m = state.matrix.as_mut().expect("gated on has_matrix");
            let mut moved = false;
            if let Some(tile) = m.tiles.get_mut(usize::from(*tile_index)) {
                tile.user_x = *user_x;
                tile.user_y = *user_y;
                moved = true;
            }
            if moved {
                state.touch();
            }
            Vec::new()
        }

        Message::Get64 {
            tile_index,
            length,
            rect,
        } => {
            let m = state.matrix.as_ref().expect("gated on has_matrix");
            tile_range(m, *tile_index, *length)
                .map(|t| state64(m, t, rect))
                .collect()
        }

        Message::Set64 {
            tile_index,
            length,
            rect,
            colors,
            ..
        } => {
            let m = state.matrix.as_mut().expect("gated on has_matrix");
            let width = effective_width(m, rect);
            let tile_width = m.tile_width;
            let tiles: Vec<usize> = tile_range(m, *tile_index, *length).collect();
            let colors: Vec<HSBK> = colors.iter().copied().map(clamp_kelvin).collect();
            if let Some(buffers) = m.framebuffer_mut(rect.fb_index) {
                for &t in &tiles {
                    if let Some(pixels) = buffers.get_mut(t) {
                        write_rect(pixels, rect.x, rect.y, width, tile_width, &colors);
                    }
                }
            }
            if !tiles.is_empty() {
                state.touch();
            }
            if ctx.res_required {
                let m = state.matrix.as_ref().unwrap();
                tiles
                    .first()
                    .map(|&t| state64(m, t, rect))
                    .into_iter()
                    .collect()
            } else {
                Vec::new()
            }
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
            let m = state.matrix.as_mut().expect("gated on has_matrix");
            let tiles: Vec<usize> = tile_range(m, *tile_index, *length).collect();
            let src: Vec<Vec<HSBK>> = m
                .framebuffers
                .get(src_fb_index)
                .cloned()
                .unwrap_or_else(|| {
                    vec![vec![HSBK::default(); TILE_PIXELS]; usize::from(m.tile_count)]
                });
            let tile_width = m.tile_width;
            let width = if *width == 0 { tile_width } else { *width };
            let mut copied = false;
            if let Some(buffers) = m.framebuffer_mut(*dst_fb_index) {
                for &t in &tiles {
                    let (Some(dst_pixels), Some(src_pixels)) = (buffers.get_mut(t), src.get(t))
                    else {
                        continue;
                    };
                    copy_rect(dst_pixels, src_pixels, *x, *y, width, tile_width);
                    copied = true;
                }
            }
            if copied {
                state.touch();
            }
            Vec::new()
        }

        Message::GetTileEffect { .. } => {
            let m = state.matrix.as_ref().expect("gated on has_matrix");
            vec![Message::StateTileEffect {
                reserved0: 0,
                settings: m.effect.clone(),
            }]
        }

        Message::SetTileEffect { settings, .. } => {
            let m = state.matrix.as_mut().expect("gated on has_matrix");
            m.effect = settings.clone();
            state.touch();
            if ctx.res_required {
                vec![Message::StateTileEffect {
                    reserved0: 0,
                    settings: settings.clone(),
                }]
            } else {
                Vec::new()
            }
        }

        other => unhandled(other.get_num()),
    }
}

/// The tiles covered by a (tile_index, length) pair, clamped to the chain.
fn tile_range(m: &MatrixState, tile_index: u8, length: u8) -> std::ops::Range<usize> {
    let start = usize::from(tile_index).min(usize::from(m.tile_count));
    let end = start
        .saturating_add(usize::from(length))
        .min(usize::from(m.tile_count));
    start..end
}

fn effective_width(m: &MatrixState, rect: &TileBufferRect) -> u8 {
    if rect.width == 0 {
        m.tile_width
    } else {
        rect.width
    }
}

/// One State64 reply: up to 64 pixels read from the rect, zero-padded to 64.
fn state64(m: &MatrixState, tile: usize, rect: &TileBufferRect) -> Message {
    let width = effective_width(m, rect);
    let pixels = m
        .framebuffers
        .get(&rect.fb_index)
        .and_then(|tiles| tiles.get(tile))
        .map(|px| px.as_slice())
        .unwrap_or(&[]);

    let mut colors = Vec::with_capacity(TILE_PIXELS);
    'rows: for row in rect.y..m.tile_height {
        for col in rect.x..rect.x.saturating_add(width).min(m.tile_width) {
            if colors.len() == TILE_PIXELS {
                break 'rows;
            }
            let idx = usize::from(row) * usize::from(m.tile_width) + usize::from(col);
            colors.push(pixels.get(idx).copied().unwrap_or_default());
        }
    }
    colors.resize(TILE_PIXELS, HSBK::default());

    Message::State64 {
        tile_index: tile as u8,
        rect: *rect,
        colors,
    }
}

/// Writes `colors` into a rect row-major, clamped to the tile bounds.  A color is consumed per
/// rect cell even when the cell falls outside the tile.
fn write_rect(pixels: &mut [HSBK], x: u8, y: u8, width: u8, tile_width: u8, colors: &[HSBK]) {
    let tile_width = usize::from(tile_width.max(1));
    let mut src = colors.iter();
    for row in usize::from(y).. {
        let base = row * tile_width;
        if base >= pixels.len() {
            break;
        }
        for col in usize::from(x)..usize::from(x).saturating_add(usize::from(width)) {
            let Some(color) = src.next() else {
                return;
            };
            if col < tile_width {
                if let Some(slot) = pixels.get_mut(base + col) {
                    *slot = *color;
                }
            }
        }
    }
}

fn copy_rect(dst: &mut [HSBK], src: &[HSBK], x: u8, y: u8, width: u8, tile_width: u8) {
    let tile_width = usize::from(tile_width.max(1));
    for row in usize::from(y).. {
        let base = row * tile_width;
        if base >= dst.len() {
            break;
        }
        for col in usize::from(x)..usize::from(x).saturating_add(usize::from(width)).min(tile_width)
        {
            let idx = base + col;
            if let (Some(slot), Some(color)) = (dst.get_mut(idx), src.get(idx)) {
                *slot = *color;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory;
    use crate::scenarios::MergedRules;

    fn ctx(rules: &MergedRules) -> HandlerCtx {
        HandlerCtx {
            res_required: true,
            rules,
        }
    }

    fn full_rect() -> TileBufferRect {
        TileBufferRect {
            fb_index: 0,
            x: 0,
            y: 0,
            width: 8,
        }
    }

    #[test]
    fn device_chain_reports_every_tile() {
        let mut st = factory::create_tile_device("d073d5000001".parse().unwrap(), 5);
        let rules = MergedRules::default();
        let responses = handle(&mut st, &Message::GetDeviceChain, &ctx(&rules));
        match &responses[0] {
            Message::StateDeviceChain {
                start_index,
                tile_devices,
                tile_devices_count,
            } => {
                assert_eq!(*start_index, 0);
                assert_eq!(*tile_devices_count, 5);
                assert_eq!(tile_devices.len(), 5);
                assert!(tile_devices.iter().all(|t| t.width == 8 && t.height == 8));
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn get64_honors_length() {
        let mut st = factory::create_tile_device("d073d5000002".parse().unwrap(), 5);
        let rules = MergedRules::default();

        for (start, length, expect) in [(0u8, 1u8, vec![0u8]), (0, 3, vec![0, 1, 2]), (0, 5, vec![0, 1, 2, 3, 4]), (3, 5, vec![3, 4])] {
            let responses = handle(
                &mut st,
                &Message::Get64 {
                    tile_index: start,
                    length,
                    rect: full_rect(),
                },
                &ctx(&rules),
            );
            let indices: Vec<u8> = responses
                .iter()
                .map(|r| match r {
                    Message::State64 { tile_index, .. } => *tile_index,
                    other => panic!("unexpected response {:?}", other),
                })
                .collect();
            assert_eq!(indices, expect, "start={} length={}", start, length);
        }
    }

    #[test]
    fn set64_writes_visible_pixels() {
        let mut st = factory::create_tile_device("d073d5000003".parse().unwrap(), 2);
        let rules = MergedRules::default();
        let red = HSBK {
            hue: 0,
            saturation: 65535,
            brightness: 65535,
            kelvin: 3500,
        };

        let responses = handle(
            &mut st,
            &Message::Set64 {
                tile_index: 0,
                length: 1,
                rect: full_rect(),
                duration: 0,
                colors: vec![red; 64],
            },
            &ctx(&rules),
        );
        assert_eq!(responses.len(), 1);

        let m = st.matrix.as_ref().unwrap();
        assert!(m.visible_tile(0).iter().all(|c| *c == red));
        // The second tile was outside the length
        assert!(m.visible_tile(1).iter().all(|c| *c != red));
    }

    #[test]
    fn set64_to_scratch_buffer_allocates_it() {
        let mut st = factory::create_tile_device("d073d5000004".parse().unwrap(), 1);
        let rules = MergedRules::default();
        let rect = TileBufferRect {
            fb_index: 3,
            ..full_rect()
        };

        handle(
            &mut st,
            &Message::Set64 {
                tile_index: 0,
                length: 1,
                rect,
                duration: 0,
                colors: vec![HSBK::default(); 64],
            },
            &ctx(&rules),
        );
        assert!(st.matrix.as_ref().unwrap().framebuffers.contains_key(&3));
    }

    #[test]
    fn copy_framebuffer_moves_pixels_between_buffers() {
        let mut st = factory::create_tile_device("d073d5000005".parse().unwrap(), 1);
        let rules = MergedRules::default();
        let green = HSBK {
            hue: 21845,
            saturation: 65535,
            brightness: 65535,
            kelvin: 3500,
        };

        // Paint scratch buffer 1, then copy it onto the visible buffer.
        handle(
            &mut st,
            &Message::Set64 {
                tile_index: 0,
                length: 1,
                rect: TileBufferRect {
                    fb_index: 1,
                    ..full_rect()
                },
                duration: 0,
                colors: vec![green; 64],
            },
            &ctx(&rules),
        );
        handle(
            &mut st,
            &Message::CopyFrameBuffer {
                tile_index: 0,
                length: 1,
                src_fb_index: 1,
                dst_fb_index: 0,
                x: 0,
                y: 0,
                width: 8,
            },
            &ctx(&rules),
        );

        assert!(st
            .matrix
            .as_ref()
            .unwrap()
            .visible_tile(0)
            .iter()
            .all(|c| *c == green));
    }

    #[test]
    fn set_user_position_updates_tile_metadata() {
        let mut st = factory::create_tile_device("d073d5000006".parse().unwrap(), 2);
        let rules = MergedRules::default();
        handle(
            &mut st,
            &Message::SetUserPosition {
                tile_index: 1,
                reserved: 0,
                user_x: 2.5,
                user_y: -1.0,
            },
            &ctx(&rules),
        );
        let tile = &st.matrix.as_ref().unwrap().tiles[1];
        assert_eq!(tile.user_x, 2.5);
        assert_eq!(tile.user_y, -1.0);
    }

    #[test]
    fn tile_effect_round_trips() {
        let mut st = factory::create_tile_device("d073d5000007".parse().unwrap(), 1);
        let rules = MergedRules::default();
        let settings = lifx_proto::TileEffectSettings {
            instanceid: 42,
            typ: lifx_proto::TileEffectType::Flame,
            speed: 2500,
            ..Default::default()
        };

        handle(
            &mut st,
            &Message::SetTileEffect {
                reserved0: 0,
                reserved1: 0,
                settings: settings.clone(),
            },
            &ctx(&rules),
        );
        let responses = handle(
            &mut st,
            &Message::GetTileEffect {
                reserved0: 0,
                reserved1: 0,
            },
            &ctx(&rules),
        );
        assert_eq!(
            responses,
            vec![Message::StateTileEffect {
                reserved0: 0,
                settings
            }]
        );
    }

    #[test]
    fn tile_request_to_plain_bulb_is_unhandled() {
        let mut st = factory::create_color_light("d073d5000008".parse().unwrap());
        let rules = MergedRules::default();
        let responses = handle(&mut st, &Message::GetDeviceChain, &ctx(&rules));
        assert_eq!(
            responses,
            vec![Message::StateUnhandled {
                unhandled_type: 701
            }]
        );
    }
}
