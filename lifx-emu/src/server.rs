//! The UDP server and request pipeline.
//!
//! One task owns the socket receive loop; each datagram is handled on its own task, and a
//! broadcast fans out to one task per target device.  Handler execution runs under the device's
//! lock (serializing requests per device); scenario delays happen after the lock is released so
//! a delayed device doesn't stall its neighbors.
//!
//! Pipeline per (request, device): resolve merged rules -> drop roll -> dispatch -> early ack ->
//! response delay -> partial truncation -> encode -> payload faults -> send.  A drop suppresses
//! the ack too, and a StateUnhandled reply carries its ack inside the (fault-transformable)
//! response list instead of an early one.

use crate::events::{bump, EmulatorEvent, EventBus, StatsSnapshot, ServerStats};
use crate::handlers::{self, HandlerCtx};
use crate::manager::{Device, DeviceManager};
use crate::persist::{PersistenceEngine, SCENARIOS_KEY};
use crate::scenarios::{MergedRules, ScenarioConfig, ScenarioEngine, Scope};
use lifx_proto::{type_name, BuildOptions, Message, RawMessage, Serial, HEADER_SIZE};
use rand::Rng;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Packet types for SetLocation / SetGroup; these change scenario scope resolution.
const SET_LOCATION: u16 = 49;
const SET_GROUP: u16 = 52;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1".into(),
            port: lifx_proto::DEFAULT_PORT,
        }
    }
}

/// The emulated LIFX server.
#[derive(Clone)]
pub struct EmulatedServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    socket: UdpSocket,
    devices: Arc<DeviceManager>,
    scenarios: Arc<ScenarioEngine>,
    events: EventBus,
    stats: ServerStats,
    persistence: Option<Arc<PersistenceEngine>>,
    shutdown: watch::Sender<bool>,
}

impl EmulatedServer {
    /// Binds the UDP socket and stamps the bound port onto every device, so StateService
    /// advertises the right one even on an ephemeral port.
    pub async fn bind(
        config: &ServerConfig,
        devices: Arc<DeviceManager>,
        scenarios: Arc<ScenarioEngine>,
        events: EventBus,
        persistence: Option<Arc<PersistenceEngine>>,
    ) -> io::Result<EmulatedServer> {
        let socket = UdpSocket::bind((config.bind.as_str(), config.port)).await?;
        let port = socket.local_addr()?.port();
        devices.set_port(port);
        info!(bind = %config.bind, port, "listening");

        let (shutdown, _) = watch::channel(false);
        Ok(EmulatedServer {
            inner: Arc::new(ServerInner {
                socket,
                devices,
                scenarios,
                events,
                stats: ServerStats::new(),
                persistence,
                shutdown,
            }),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.socket.local_addr()
    }

    pub fn devices(&self) -> &DeviceManager {
        &self.inner.devices
    }

    pub fn scenarios(&self) -> &ScenarioEngine {
        &self.inner.scenarios
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot(self.inner.devices.len())
    }

    /// Sets a scenario, with cache invalidation, change event and persistence.
    pub fn set_scenario(&self, scope: &Scope, config: ScenarioConfig) {
        self.inner.scenarios.set(scope, config);
        self.inner.events.publish(EmulatorEvent::ScenarioChanged {
            scope: scope.describe(),
        });
        self.persist_scenarios();
    }

    /// Clears a scenario.  Returns false when nothing was set at that scope.
    pub fn clear_scenario(&self, scope: &Scope) -> bool {
        let removed = self.inner.scenarios.clear(scope);
        if removed {
            self.inner.events.publish(EmulatorEvent::ScenarioChanged {
                scope: scope.describe(),
            });
            self.persist_scenarios();
        }
        removed
    }

    fn persist_scenarios(&self) {
        if let Some(engine) = &self.inner.persistence {
            match serde_json::to_string(&self.inner.scenarios.snapshot()) {
                Ok(json) => engine.save(SCENARIOS_KEY, json),
                Err(e) => warn!(error = %e, "failed to serialize scenario store"),
            }
        }
    }

    /// Receive loop.  Returns once [EmulatedServer::shutdown] is called; in-flight delayed
    /// responses are discarded at that point.
    pub async fn run(&self) {
        let ticker = tokio::spawn(stats_ticker(Arc::clone(&self.inner)));
        let mut shutdown = self.inner.shutdown.subscribe();
        let mut buf = vec![0u8; 2048];

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                received = self.inner.socket.recv_from(&mut buf) => match received {
                    Ok((len, addr)) => {
                        let data = buf[..len].to_vec();
                        let inner = Arc::clone(&self.inner);
                        tokio::spawn(async move { inner.handle_datagram(data, addr).await });
                    }
                    Err(e) => {
                        warn!(error = %e, "udp receive failed");
                    }
                },
            }
        }

        ticker.abort();
        info!("server stopped");
    }

    /// Signals the receive loop to stop and delayed responses to be discarded.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
    }
}

impl ServerInner {
    async fn handle_datagram(self: Arc<Self>, data: Vec<u8>, addr: SocketAddr) {
        if data.len() < HEADER_SIZE {
            bump(&self.stats.malformed_dropped);
            trace!(len = data.len(), %addr, "dropping short datagram");
            return;
        }
        let raw = match RawMessage::unpack(&data) {
            Ok(raw) => raw,
            Err(e) => {
                bump(&self.stats.malformed_dropped);
                debug!(%addr, error = %e, "dropping malformed header");
                return;
            }
        };

        bump(&self.stats.packets_received);
        let pkt_type = raw.protocol_header.typ;
        let broadcast = raw.frame.tagged || raw.frame_addr.target == 0;
        self.events.publish(EmulatorEvent::PacketRx {
            pkt_type,
            name: type_name(pkt_type),
            target: (!broadcast).then(|| Serial::from_target(raw.frame_addr.target)),
            addr,
        });

        let request = match Message::from_raw(&raw) {
            Ok(msg) => Some(msg),
            Err(lifx_proto::Error::UnknownMessageType(t)) => {
                bump(&self.stats.unknown_type);
                debug!(pkt_type = t, %addr, "unknown packet type");
                None
            }
            Err(e) => {
                // Undecodable payload: same silent drop as a real device.
                bump(&self.stats.malformed_dropped);
                debug!(pkt_type, %addr, error = %e, "dropping undecodable payload");
                return;
            }
        };

        let targets = self
            .devices
            .resolve_targets(raw.frame.tagged, raw.frame_addr.target);
        if targets.is_empty() {
            trace!(pkt_type, %addr, "no matching device");
            return;
        }

        for device in targets {
            let inner = Arc::clone(&self);
            let raw = raw.clone();
            let request = request.clone();
            tokio::spawn(async move {
                inner.process_for_device(device, raw, request, addr).await;
            });
        }
    }

    async fn process_for_device(
        self: Arc<Self>,
        device: Arc<Device>,
        raw: RawMessage,
        request: Option<Message>,
        addr: SocketAddr,
    ) {
        let rules = self.scenarios.resolve(&device.scope_keys());
        let pkt_type = raw.protocol_header.typ;

        // A drop kills the whole exchange: no response AND no acknowledgment.
        if let Some(probability) = rules.drop_packets.get(&pkt_type) {
            if rand::thread_rng().gen::<f64>() < *probability {
                bump(&self.stats.scenario_dropped);
                debug!(pkt_type, "request dropped by scenario");
                return;
            }
        }

        let registered = request.is_some() && handlers::is_registered(pkt_type);
        if !registered && !rules.send_unhandled {
            return;
        }

        let ctx = HandlerCtx {
            res_required: raw.frame_addr.res_required,
            rules: rules.as_ref(),
        };
        let (serial, mut responses, changed) = device.with_state(|st| {
            let responses = if registered {
                handlers::dispatch(st, request.as_ref().unwrap(), &ctx)
            } else {
                vec![Message::StateUnhandled {
                    unhandled_type: pkt_type,
                }]
            };
            (st.serial, responses, st.take_dirty())
        });

        if changed {
            self.events.publish(EmulatorEvent::DeviceUpdated { serial });
            if let Some(engine) = &self.persistence {
                match serde_json::to_string(&device.snapshot()) {
                    Ok(json) => engine.save(&serial.to_string(), json),
                    Err(e) => warn!(%serial, error = %e, "failed to serialize device state"),
                }
            }
            if pkt_type == SET_LOCATION || pkt_type == SET_GROUP {
                self.scenarios.invalidate();
            }
        }

        let produced_unhandled = responses
            .iter()
            .any(|m| matches!(m, Message::StateUnhandled { .. }));

        // Early ack, sent before any response delay so clients polling for acks aren't starved.
        // A StateUnhandled reply instead carries its ack in the response list below.
        if raw.frame_addr.ack_required && !produced_unhandled {
            self.send_response(
                serial,
                &raw,
                addr,
                Message::Acknowledgement {
                    seq: raw.frame_addr.sequence,
                },
                &rules,
            )
            .await;
        }

        if let Some(delay) = rules.response_delays.get(&pkt_type).copied() {
            if delay > 0.0 {
                let mut shutdown = self.shutdown.subscribe();
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs_f64(delay)) => {}
                    _ = shutdown.changed() => {
                        debug!(pkt_type, "delayed response discarded at shutdown");
                        return;
                    }
                }
            }
        }

        if raw.frame_addr.ack_required && produced_unhandled {
            responses.insert(
                0,
                Message::Acknowledgement {
                    seq: raw.frame_addr.sequence,
                },
            );
        }

        apply_partial(&mut responses, &rules, &mut rand::thread_rng());

        for response in responses {
            self.send_response(serial, &raw, addr, response, &rules).await;
        }
    }

    /// Frames, fault-transforms and sends one response payload.
    async fn send_response(
        &self,
        serial: Serial,
        request: &RawMessage,
        addr: SocketAddr,
        response: Message,
        rules: &MergedRules,
    ) {
        let pkt_type = response.get_num();
        let options = BuildOptions {
            target: Some(serial.as_target()),
            ack_required: false,
            res_required: false,
            sequence: request.frame_addr.sequence,
            source: request.frame.source,
        };
        let mut bytes = match RawMessage::build(&options, response).and_then(|raw| raw.pack()) {
            Ok(bytes) => bytes,
            Err(e) => {
                // Unreachable for well-formed state; encode failures would be a bug here.
                warn!(pkt_type, error = %e, "failed to encode response");
                return;
            }
        };

        apply_payload_faults(&mut bytes, pkt_type, rules, &mut rand::thread_rng());

        match self.socket.send_to(&bytes, addr).await {
            Ok(_) => {
                bump(&self.stats.packets_sent);
                self.events.publish(EmulatorEvent::PacketTx {
                    pkt_type,
                    name: type_name(pkt_type),
                    serial,
                    addr,
                });
            }
            Err(e) => warn!(pkt_type, %addr, error = %e, "udp send failed"),
        }
    }
}

/// Randomly truncates a multi-packet response list: of the packets whose type is listed in
/// `partial_responses`, at least one is kept and at least one is dropped.
fn apply_partial(responses: &mut Vec<Message>, rules: &MergedRules, rng: &mut impl Rng) {
    if rules.partial_responses.is_empty() || responses.len() < 2 {
        return;
    }
    let subset: Vec<usize> = responses
        .iter()
        .enumerate()
        .filter(|(_, m)| rules.partial_responses.contains(&m.get_num()))
        .map(|(i, _)| i)
        .collect();
    if subset.len() < 2 {
        return;
    }
    let keep = rng.gen_range(1..subset.len());
    let dropped: std::collections::HashSet<usize> = subset[keep..].iter().copied().collect();
    let mut index = 0;
    responses.retain(|_| {
        let drop = dropped.contains(&index);
        index += 1;
        !drop
    });
}

/// Byte-level response faults, keyed on the response packet's own type: `invalid_field_values`
/// replaces the payload with 0xFF, `malformed_packets` truncates it to a strictly shorter
/// length (patching the header's size field so the datagram stays self-consistent).
fn apply_payload_faults(bytes: &mut Vec<u8>, pkt_type: u16, rules: &MergedRules, rng: &mut impl Rng) {
    if rules.invalid_field_values.contains(&pkt_type) {
        for b in &mut bytes[HEADER_SIZE..] {
            *b = 0xff;
        }
    }
    if rules.malformed_packets.contains(&pkt_type) {
        let payload_len = bytes.len() - HEADER_SIZE;
        if payload_len > 0 {
            let keep = rng.gen_range(0..payload_len);
            bytes.truncate(HEADER_SIZE + keep);
            let size = bytes.len() as u16;
            bytes[0..2].copy_from_slice(&size.to_le_bytes());
        }
    }
}

async fn stats_ticker(inner: Arc<ServerInner>) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        inner.events.publish(EmulatorEvent::StatsTick(
            inner.stats.snapshot(inner.devices.len()),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifx_proto::HSBK;
    use rand::rngs::mock::StepRng;

    fn multizone_list(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| Message::StateMultiZone {
                count: (n * 8) as u8,
                index: (i * 8) as u8,
                colors: vec![HSBK::default(); 8],
            })
            .collect()
    }

    fn partial_rules(types: &[u16]) -> MergedRules {
        MergedRules {
            partial_responses: types.iter().copied().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn partial_keeps_between_one_and_len_minus_one() {
        let rules = partial_rules(&[506]);
        for _ in 0..50 {
            let mut responses = multizone_list(15);
            apply_partial(&mut responses, &rules, &mut rand::thread_rng());
            assert!(!responses.is_empty() && responses.len() < 15);
        }
    }

    #[test]
    fn partial_ignores_unlisted_types() {
        let rules = partial_rules(&[506]);
        let mut responses = vec![
            Message::StateExtendedColorZones {
                zones_count: 120,
                zone_index: 0,
                colors_count: 82,
                colors: vec![HSBK::default(); 82],
            },
            Message::StateExtendedColorZones {
                zones_count: 120,
                zone_index: 82,
                colors_count: 38,
                colors: vec![HSBK::default(); 38],
            },
        ];
        apply_partial(&mut responses, &rules, &mut rand::thread_rng());
        assert_eq!(responses.len(), 2);
    }

    #[test]
    fn partial_leaves_singletons_alone() {
        let rules = partial_rules(&[506]);
        let mut responses = multizone_list(1);
        apply_partial(&mut responses, &rules, &mut rand::thread_rng());
        assert_eq!(responses.len(), 1);
    }

    #[test]
    fn partial_spares_other_packets_in_a_mixed_list() {
        let rules = partial_rules(&[506]);
        let mut responses = multizone_list(4);
        responses.insert(
            0,
            Message::Acknowledgement { seq: 1 },
        );
        apply_partial(&mut responses, &rules, &mut rand::thread_rng());
        assert!(matches!(responses[0], Message::Acknowledgement { .. }));
        assert!(responses.len() >= 2);
    }

    #[test]
    fn invalid_field_values_flood_payload_with_ff() {
        let raw = RawMessage::build(
            &BuildOptions::default(),
            Message::StateLabel {
                label: lifx_proto::LifxString::new("Kitchen"),
            },
        )
        .unwrap();
        let mut bytes = raw.pack().unwrap();
        let rules = MergedRules {
            invalid_field_values: [25].into_iter().collect(),
            ..Default::default()
        };
        apply_payload_faults(&mut bytes, 25, &rules, &mut StepRng::new(0, 1));
        assert!(bytes[HEADER_SIZE..].iter().all(|b| *b == 0xff));
        assert_eq!(bytes.len(), HEADER_SIZE + 32);
    }

    #[test]
    fn malformed_truncates_strictly_and_patches_size() {
        let raw = RawMessage::build(
            &BuildOptions::default(),
            Message::StateLabel {
                label: lifx_proto::LifxString::new("Kitchen"),
            },
        )
        .unwrap();
        let full = raw.pack().unwrap();
        let rules = MergedRules {
            malformed_packets: [25].into_iter().collect(),
            ..Default::default()
        };
        for _ in 0..20 {
            let mut bytes = full.clone();
            apply_payload_faults(&mut bytes, 25, &rules, &mut rand::thread_rng());
            assert!(bytes.len() < full.len());
            assert!(bytes.len() >= HEADER_SIZE);
            let size = u16::from_le_bytes([bytes[0], bytes[1]]);
            assert_eq!(usize::from(size), bytes.len());
        }
    }

    #[test]
    fn faults_skip_unlisted_types() {
        let raw = RawMessage::build(
            &BuildOptions::default(),
            Message::StateLabel {
                label: lifx_proto::LifxString::new("Kitchen"),
            },
        )
        .unwrap();
        let mut bytes = raw.pack().unwrap();
        let before = bytes.clone();
        let rules = MergedRules {
            malformed_packets: [107].into_iter().collect(),
            invalid_field_values: [107].into_iter().collect(),
            ..Default::default()
        };
        apply_payload_faults(&mut bytes, 25, &rules, &mut rand::thread_rng());
        assert_eq!(bytes, before);
    }
}
