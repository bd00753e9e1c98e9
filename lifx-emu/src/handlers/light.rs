//! Light-namespace handlers (packet types 101-149): color, waveforms, light power, infrared
//! and HEV.  Infrared and HEV requests are capability-gated.

use super::{unhandled, HandlerCtx};
use crate::state::{clamp_kelvin, DeviceState, WaveformState};
use lifx_proto::Message;
use std::time::Instant;

pub(super) fn handle(state: &mut DeviceState, req: &Message, ctx: &HandlerCtx) -> Vec<Message> {
    match req {
        Message::LightGet => vec![light_state(state)],

        Message::LightSetColor { color, .. } => {
            state.set_color(*color);
            respond_if(ctx, || light_state(state))
        }

        Message::SetWaveform {
            transient,
            color,
            period,
            cycles,
            skew_ratio,
            waveform,
            ..
        } => {
            let color = clamp_kelvin(*color);
            state.waveform = WaveformState {
                transient: *transient,
                color,
                period: *period,
                cycles: *cycles,
                skew_ratio: *skew_ratio,
                waveform: *waveform,
            };
            state.set_color(color);
            respond_if(ctx, || light_state(state))
        }

        Message::SetWaveformOptional {
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
            ..
        } => {
            let mut target = state.color;
            if *set_hue {
                target.hue = color.hue;
            }
            if *set_saturation {
                target.saturation = color.saturation;
            }
            if *set_brightness {
                target.brightness = color.brightness;
            }
            if *set_kelvin {
                target.kelvin = color.kelvin;
            }
            let target = clamp_kelvin(target);
            state.waveform = WaveformState {
                transient: *transient,
                color: target,
                period: *period,
                cycles: *cycles,
                skew_ratio: *skew_ratio,
                waveform: *waveform,
            };
            state.set_color(target);
            respond_if(ctx, || light_state(state))
        }

        Message::LightGetPower => vec![Message::LightStatePower {
            level: state.power_level,
        }],

        Message::LightSetPower { level, .. } => {
            state.set_power(*level);
            respond_if(ctx, || Message::LightStatePower {
                level: state.power_level,
            })
        }

        Message::LightGetInfrared => {
            if !state.caps.has_infrared {
                return unhandled(req.get_num());
            }
            vec![Message::LightStateInfrared {
                brightness: state.infrared_brightness(),
            }]
        }

        Message::LightSetInfrared { brightness } => {
            if !state.caps.has_infrared {
                return unhandled(req.get_num());
            }
            state.set_infrared_brightness(*brightness);
            respond_if(ctx, || Message::LightStateInfrared {
                brightness: state.infrared_brightness(),
            })
        }

        Message::GetHevCycle => {
            if !state.caps.has_hev {
                return unhandled(req.get_num());
            }
            vec![state_hev_cycle(state)]
        }

        Message::SetHevCycle { enable, duration_s } => {
            if !state.caps.has_hev {
                return unhandled(req.get_num());
            }
            let power = state.power_level;
            // Settle any finished cycle before changing anything.
            state.hev_remaining();
            if let Some(hev) = state.hev.as_mut() {
                if *enable {
                    if *duration_s > 0 {
                        hev.cycle_duration_s = *duration_s;
                    }
                    hev.cycle_remaining_s = hev.cycle_duration_s;
                    hev.cycle_started = Some(Instant::now());
                    hev.last_power = u8::from(power > 0);
                    hev.last_result = lifx_proto::LastHevCycleResult::Busy;
                } else if hev.cycle_started.take().is_some() {
                    hev.cycle_remaining_s = 0;
                    hev.last_result = lifx_proto::LastHevCycleResult::InterruptedByLan;
                }
            }
            state.touch();
            respond_if(ctx, || state_hev_cycle(state))
        }

        Message::GetHevCycleConfiguration => {
            if !state.caps.has_hev {
                return unhandled(req.get_num());
            }
            vec![state_hev_config(state)]
        }

        Message::SetHevCycleConfiguration {
            indication,
            duration_s,
        } => {
            if !state.caps.has_hev {
                return unhandled(req.get_num());
            }
            if let Some(hev) = state.hev.as_mut() {
                hev.indication = *indication;
                if *duration_s > 0 {
                    hev.cycle_duration_s = *duration_s;
                }
            }
            state.touch();
            respond_if(ctx, || state_hev_config(state))
        }

        Message::GetLastHevCycleResult => {
            if !state.caps.has_hev {
                return unhandled(req.get_num());
            }
            state.hev_remaining();
            let result = state
                .hev
                .as_ref()
                .map(|h| h.last_result)
                .unwrap_or(lifx_proto::LastHevCycleResult::None);
            vec![Message::StateLastHevCycleResult { result }]
        }

        other => unhandled(other.get_num()),
    }
}

fn respond_if(ctx: &HandlerCtx, response: impl FnOnce() -> Message) -> Vec<Message> {
    if ctx.res_required {
        vec![response()]
    } else {
        Vec::new()
    }
}

fn light_state(state: &DeviceState) -> Message {
    Message::LightState {
        color: state.color,
        reserved: 0,
        power: state.power_level,
        label: state.label.clone(),
        reserved2: 0,
    }
}

fn state_hev_cycle(state: &mut DeviceState) -> Message {
    let remaining_s = state.hev_remaining();
    let hev = state.hev.as_ref().expect("gated on has_hev");
    Message::StateHevCycle {
        duration_s: hev.cycle_duration_s,
        remaining_s,
        last_power: hev.last_power,
    }
}

fn state_hev_config(state: &DeviceState) -> Message {
    let hev = state.hev.as_ref().expect("gated on has_hev");
    Message::StateHevCycleConfiguration {
        indication: hev.indication,
        duration_s: hev.cycle_duration_s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory;
    use crate::scenarios::MergedRules;
    use lifx_proto::{LastHevCycleResult, HSBK};

    fn ctx(rules: &MergedRules) -> HandlerCtx {
        HandlerCtx {
            res_required: true,
            rules,
        }
    }

    #[test]
    fn set_color_then_get_returns_it() {
        let mut st = factory::create_color_light("d073d5000001".parse().unwrap());
        let rules = MergedRules::default();
        let color = HSBK {
            hue: 21845,
            saturation: 65535,
            brightness: 32768,
            kelvin: 3500,
        };

        let responses = handle(
            &mut st,
            &Message::LightSetColor {
                reserved: 0,
                color,
                duration: 0,
            },
            &ctx(&rules),
        );
        assert_eq!(responses.len(), 1);
        match &responses[0] {
            Message::LightState {
                color: c, power, ..
            } => {
                assert_eq!(*c, color);
                assert_eq!(*power, st.power_level);
            }
            other => panic!("unexpected response {:?}", other),
        }

        let responses = handle(&mut st, &Message::LightGet, &ctx(&rules));
        assert!(matches!(&responses[0], Message::LightState { color: c, .. } if *c == color));
    }

    #[test]
    fn infrared_gated_on_capability() {
        let rules = MergedRules::default();

        let mut plain = factory::create_color_light("d073d5000001".parse().unwrap());
        let responses = handle(&mut plain, &Message::LightGetInfrared, &ctx(&rules));
        assert_eq!(
            responses,
            vec![Message::StateUnhandled {
                unhandled_type: 120
            }]
        );

        let mut ir = factory::create_infrared_light("d073d5000002".parse().unwrap());
        handle(
            &mut ir,
            &Message::LightSetInfrared { brightness: 30000 },
            &ctx(&rules),
        );
        let responses = handle(&mut ir, &Message::LightGetInfrared, &ctx(&rules));
        assert_eq!(
            responses,
            vec![Message::LightStateInfrared { brightness: 30000 }]
        );
    }

    #[test]
    fn waveform_optional_only_touches_selected_components() {
        let mut st = factory::create_color_light("d073d5000001".parse().unwrap());
        let rules = MergedRules::default();
        st.set_color(HSBK {
            hue: 100,
            saturation: 200,
            brightness: 300,
            kelvin: 3500,
        });

        handle(
            &mut st,
            &Message::SetWaveformOptional {
                reserved: 0,
                transient: false,
                color: HSBK {
                    hue: 999,
                    saturation: 888,
                    brightness: 777,
                    kelvin: 6500,
                },
                period: 1000,
                cycles: 1.0,
                skew_ratio: 0,
                waveform: lifx_proto::Waveform::Pulse,
                set_hue: true,
                set_saturation: false,
                set_brightness: false,
                set_kelvin: true,
            },
            &ctx(&rules),
        );

        assert_eq!(st.color.hue, 999);
        assert_eq!(st.color.saturation, 200);
        assert_eq!(st.color.brightness, 300);
        assert_eq!(st.color.kelvin, 6500);
        assert_eq!(st.waveform.waveform, lifx_proto::Waveform::Pulse);
    }

    #[test]
    fn hev_cycle_starts_and_aborts() {
        let mut st = factory::create_hev_light("d073d5000003".parse().unwrap());
        let rules = MergedRules::default();

        let responses = handle(
            &mut st,
            &Message::SetHevCycle {
                enable: true,
                duration_s: 600,
            },
            &ctx(&rules),
        );
        match &responses[0] {
            Message::StateHevCycle {
                duration_s,
                remaining_s,
                ..
            } => {
                assert_eq!(*duration_s, 600);
                assert!(*remaining_s > 0 && *remaining_s <= 600);
            }
            other => panic!("unexpected response {:?}", other),
        }

        let responses = handle(
            &mut st,
            &Message::SetHevCycle {
                enable: false,
                duration_s: 0,
            },
            &ctx(&rules),
        );
        assert!(
            matches!(&responses[0], Message::StateHevCycle { remaining_s: 0, .. }),
            "cycle should be stopped: {:?}",
            responses[0]
        );

        let responses = handle(&mut st, &Message::GetLastHevCycleResult, &ctx(&rules));
        assert_eq!(
            responses,
            vec![Message::StateLastHevCycleResult {
                result: LastHevCycleResult::InterruptedByLan
            }]
        );
    }

    #[test]
    fn hev_gated_on_capability() {
        let mut st = factory::create_color_light("d073d5000001".parse().unwrap());
        let rules = MergedRules::default();
        let responses = handle(&mut st, &Message::GetHevCycle, &ctx(&rules));
        assert_eq!(
            responses,
            vec![Message::StateUnhandled {
                unhandled_type: 142
            }]
        );
    }
}
