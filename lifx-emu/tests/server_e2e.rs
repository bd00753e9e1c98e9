//! End-to-end tests against a live server on an ephemeral UDP port.

use lifx_emu::events::EventBus;
use lifx_emu::factory;
use lifx_emu::manager::DeviceManager;
use lifx_emu::persist::PersistenceEngine;
use lifx_emu::scenarios::{ScenarioConfig, ScenarioEngine, Scope};
use lifx_emu::server::{EmulatedServer, ServerConfig};
use lifx_emu::state::DeviceState;
use lifx_proto::{BuildOptions, Message, RawMessage, Serial, Service, HSBK};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

struct TestServer {
    server: EmulatedServer,
    addr: SocketAddr,
}

async fn start_server(states: Vec<DeviceState>) -> TestServer {
    start_server_with(states, None).await
}

async fn start_server_with(
    states: Vec<DeviceState>,
    persistence: Option<Arc<PersistenceEngine>>,
) -> TestServer {
    let events = EventBus::default();
    let devices = Arc::new(DeviceManager::new(events.clone()));
    for st in states {
        devices.add(st);
    }
    let server = EmulatedServer::bind(
        &ServerConfig {
            bind: "127.0.0.1".into(),
            port: 0,
        },
        devices,
        Arc::new(ScenarioEngine::new()),
        events,
        persistence,
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    let runner = server.clone();
    tokio::spawn(async move { runner.run().await });
    TestServer { server, addr }
}

async fn client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

fn request(
    target: Option<Serial>,
    msg: Message,
    source: u32,
    sequence: u8,
    res_required: bool,
    ack_required: bool,
) -> Vec<u8> {
    RawMessage::build(
        &BuildOptions {
            target: target.map(|s| s.as_target()),
            ack_required,
            res_required,
            sequence,
            source,
        },
        msg,
    )
    .unwrap()
    .pack()
    .unwrap()
}

/// Collects responses until the line has been quiet for `quiet`.
async fn recv_all(socket: &UdpSocket, quiet: Duration) -> Vec<RawMessage> {
    let mut out = Vec::new();
    let mut buf = [0u8; 2048];
    while let Ok(Ok((len, _))) = tokio::time::timeout(quiet, socket.recv_from(&mut buf)).await {
        out.push(RawMessage::unpack(&buf[..len]).unwrap());
    }
    out
}

fn serial(tail: u8) -> Serial {
    Serial([0xd0, 0x73, 0xd5, 0x00, 0x00, tail])
}

// E1: broadcast discovery answers once per device, echoing source and sequence and carrying
// each responder's own serial in target.
#[tokio::test]
async fn discovery_broadcast() {
    let ts = start_server(vec![
        factory::create_color_light(serial(1)),
        factory::create_color_light(serial(2)),
    ])
    .await;
    let sock = client().await;

    sock.send_to(
        &request(None, Message::GetService, 0xcafe, 7, true, false),
        ts.addr,
    )
    .await
    .unwrap();

    let responses = recv_all(&sock, Duration::from_millis(300)).await;
    assert_eq!(responses.len(), 2);

    let mut seen = HashSet::new();
    for raw in &responses {
        assert_eq!(raw.frame.source, 0xcafe);
        assert_eq!(raw.frame_addr.sequence, 7);
        assert!(!raw.frame.tagged);
        match Message::from_raw(raw).unwrap() {
            Message::StateService { service, port } => {
                assert_eq!(service, Service::Udp);
                assert_eq!(port, u32::from(ts.addr.port()));
            }
            other => panic!("unexpected response {:?}", other),
        }
        seen.insert(Serial::from_target(raw.frame_addr.target));
    }
    assert_eq!(seen, [serial(1), serial(2)].into_iter().collect());
}

// E2: SetColor echoes the stored HSBK and current power in its LightState reply.
#[tokio::test]
async fn set_color_and_read_back() {
    let ts = start_server(vec![factory::create_color_light(serial(1))]).await;
    let sock = client().await;

    let color = HSBK {
        hue: 21845,
        saturation: 65535,
        brightness: 32768,
        kelvin: 3500,
    };
    sock.send_to(
        &request(
            Some(serial(1)),
            Message::LightSetColor {
                reserved: 0,
                color,
                duration: 0,
            },
            0x1111,
            1,
            true,
            false,
        ),
        ts.addr,
    )
    .await
    .unwrap();

    let responses = recv_all(&sock, Duration::from_millis(300)).await;
    assert_eq!(responses.len(), 1);
    match Message::from_raw(&responses[0]).unwrap() {
        Message::LightState {
            color: c, power, ..
        } => {
            assert_eq!(c, color);
            assert_eq!(power, 0);
        }
        other => panic!("unexpected response {:?}", other),
    }
}

// E3: a 20-zone strip partitions GetColorZones(0, 19) into packets at indexes 0, 8, 16, and
// the concatenated colors reconstruct the zone array.
#[tokio::test]
async fn multizone_partition() {
    let mut st = factory::create_multizone_light(serial(1), 20, false);
    {
        let mz = st.multizone.as_mut().unwrap();
        for (i, zone) in mz.zone_colors.iter_mut().enumerate() {
            *zone = HSBK {
                hue: (i as u16) * 100,
                saturation: 65535,
                brightness: 65535,
                kelvin: 3500,
            };
        }
    }
    let ts = start_server(vec![st]).await;
    let sock = client().await;

    sock.send_to(
        &request(
            Some(serial(1)),
            Message::GetColorZones {
                start_index: 0,
                end_index: 19,
            },
            1,
            1,
            true,
            false,
        ),
        ts.addr,
    )
    .await
    .unwrap();

    let mut responses = recv_all(&sock, Duration::from_millis(300)).await;
    assert_eq!(responses.len(), 3);
    responses.sort_by_key(|raw| match Message::from_raw(raw).unwrap() {
        Message::StateMultiZone { index, .. } => index,
        _ => 255,
    });

    let mut zones = Vec::new();
    for (raw, expected_index) in responses.iter().zip([0u8, 8, 16]) {
        match Message::from_raw(raw).unwrap() {
            Message::StateMultiZone {
                count,
                index,
                colors,
            } => {
                assert_eq!(count, 20);
                assert_eq!(index, expected_index);
                zones.extend(colors);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }
    assert_eq!(zones.len(), 24);
    for (i, color) in zones.iter().take(20).enumerate() {
        assert_eq!(color.hue, (i as u16) * 100);
    }
}

// E4: a 1.0 drop rule kills the exchange entirely; not even the requested ack comes back.
#[tokio::test]
async fn drop_suppresses_ack_and_response() {
    let ts = start_server(vec![factory::create_color_light(serial(1))]).await;
    ts.server.set_scenario(
        &Scope::Device(serial(1)),
        ScenarioConfig {
            drop_packets: Some([(101u16, 1.0f64)].into_iter().collect()),
            ..Default::default()
        },
    );
    let sock = client().await;

    sock.send_to(
        &request(Some(serial(1)), Message::LightGet, 1, 1, true, true),
        ts.addr,
    )
    .await
    .unwrap();

    let responses = recv_all(&sock, Duration::from_millis(300)).await;
    assert!(responses.is_empty(), "expected silence, got {:?}", responses);
}

// E5: a response delay holds back the state reply but not the ack.
#[tokio::test]
async fn response_delay_spares_the_ack() {
    let ts = start_server(vec![factory::create_color_light(serial(1))]).await;
    ts.server.set_scenario(
        &Scope::Global,
        ScenarioConfig {
            response_delays: Some([(101u16, 0.2f64)].into_iter().collect()),
            ..Default::default()
        },
    );
    let sock = client().await;
    let started = Instant::now();

    sock.send_to(
        &request(Some(serial(1)), Message::LightGet, 1, 1, true, true),
        ts.addr,
    )
    .await
    .unwrap();

    let mut buf = [0u8; 2048];
    let (len, _) = tokio::time::timeout(Duration::from_millis(150), sock.recv_from(&mut buf))
        .await
        .expect("ack should not be delayed")
        .unwrap();
    let ack = RawMessage::unpack(&buf[..len]).unwrap();
    assert_eq!(ack.protocol_header.typ, 45);

    let (len, _) = tokio::time::timeout(Duration::from_secs(1), sock.recv_from(&mut buf))
        .await
        .expect("state reply should arrive after the delay")
        .unwrap();
    let state = RawMessage::unpack(&buf[..len]).unwrap();
    assert_eq!(state.protocol_header.typ, 107);
    assert!(started.elapsed() >= Duration::from_millis(180));
}

// E6: a switch rejects Light-namespace packets with StateUnhandled but answers the Device
// namespace normally.
#[tokio::test]
async fn switch_rejects_light_but_answers_device() {
    let switch_serial: Serial = "d073d5ff0070".parse().unwrap();
    let ts = start_server(vec![factory::create_switch(switch_serial)]).await;
    let sock = client().await;

    sock.send_to(
        &request(
            Some(switch_serial),
            Message::LightSetColor {
                reserved: 0,
                color: HSBK::default(),
                duration: 0,
            },
            1,
            1,
            true,
            false,
        ),
        ts.addr,
    )
    .await
    .unwrap();

    let responses = recv_all(&sock, Duration::from_millis(300)).await;
    assert_eq!(responses.len(), 1);
    match Message::from_raw(&responses[0]).unwrap() {
        Message::StateUnhandled { unhandled_type } => assert_eq!(unhandled_type, 102),
        other => panic!("unexpected response {:?}", other),
    }

    sock.send_to(
        &request(Some(switch_serial), Message::GetLabel, 1, 2, true, false),
        ts.addr,
    )
    .await
    .unwrap();
    let responses = recv_all(&sock, Duration::from_millis(300)).await;
    assert_eq!(responses.len(), 1);
    assert!(matches!(
        Message::from_raw(&responses[0]).unwrap(),
        Message::StateLabel { .. }
    ));
}

// A StateUnhandled reply carries its ack inside the response list (no early ack), in order.
#[tokio::test]
async fn unhandled_reply_carries_ack_first() {
    let switch_serial: Serial = "d073d5ff0070".parse().unwrap();
    let ts = start_server(vec![factory::create_switch(switch_serial)]).await;
    let sock = client().await;

    sock.send_to(
        &request(Some(switch_serial), Message::LightGet, 1, 3, true, true),
        ts.addr,
    )
    .await
    .unwrap();

    let responses = recv_all(&sock, Duration::from_millis(300)).await;
    let types: Vec<u16> = responses.iter().map(|r| r.protocol_header.typ).collect();
    assert_eq!(types, vec![45, 223]);
}

// Unknown packet types answer StateUnhandled by default, and go silent when a scenario turns
// send_unhandled off.
#[tokio::test]
async fn unknown_type_follows_send_unhandled_policy() {
    let ts = start_server(vec![factory::create_color_light(serial(1))]).await;
    let sock = client().await;

    // 9999 is no known packet type; hand-roll the header.
    let mut raw = RawMessage::build(
        &BuildOptions {
            target: Some(serial(1).as_target()),
            res_required: true,
            ..Default::default()
        },
        Message::GetLabel,
    )
    .unwrap();
    raw.protocol_header.typ = 9999;
    let bytes = raw.pack().unwrap();

    sock.send_to(&bytes, ts.addr).await.unwrap();
    let responses = recv_all(&sock, Duration::from_millis(300)).await;
    assert_eq!(responses.len(), 1);
    match Message::from_raw(&responses[0]).unwrap() {
        Message::StateUnhandled { unhandled_type } => assert_eq!(unhandled_type, 9999),
        other => panic!("unexpected response {:?}", other),
    }

    ts.server.set_scenario(
        &Scope::Global,
        ScenarioConfig {
            send_unhandled: Some(false),
            ..Default::default()
        },
    );
    sock.send_to(&bytes, ts.addr).await.unwrap();
    let responses = recv_all(&sock, Duration::from_millis(300)).await;
    assert!(responses.is_empty());
}

// Requests to a serial nobody owns are silently dropped.
#[tokio::test]
async fn unknown_target_is_ignored() {
    let ts = start_server(vec![factory::create_color_light(serial(1))]).await;
    let sock = client().await;
    sock.send_to(
        &request(Some(serial(0x99)), Message::GetLabel, 1, 1, true, false),
        ts.addr,
    )
    .await
    .unwrap();
    let responses = recv_all(&sock, Duration::from_millis(300)).await;
    assert!(responses.is_empty());
}

// E7: rapid SetLabel writes collapse into a single on-disk snapshot holding the last value.
#[tokio::test]
async fn debounced_persistence_writes_last_state() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        PersistenceEngine::new(dir.path(), Duration::from_millis(100)).unwrap(),
    );
    let ts = start_server_with(
        vec![factory::create_color_light(serial(1))],
        Some(Arc::clone(&engine)),
    )
    .await;
    let sock = client().await;

    for (i, label) in ["A", "B", "C", "D", "E"].into_iter().enumerate() {
        sock.send_to(
            &request(
                Some(serial(1)),
                Message::SetLabel {
                    label: lifx_proto::LifxString::new(label),
                },
                1,
                i as u8,
                false,
                false,
            ),
            ts.addr,
        )
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    tokio::time::sleep(Duration::from_millis(300)).await;

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files, vec![format!("{}.json", serial(1))]);

    let json = std::fs::read_to_string(dir.path().join(&files[0])).unwrap();
    let state: lifx_emu::DeviceState = serde_json::from_str(&json).unwrap();
    assert_eq!(state.label, *"E");

    engine.shutdown(Duration::from_secs(1)).await;
}

// Scenario precedence end to end: a device-scope 0.0 drop beats a global 1.0 drop.
#[tokio::test]
async fn device_scope_overrides_global_drop() {
    let ts = start_server(vec![factory::create_color_light(serial(1))]).await;
    ts.server.set_scenario(
        &Scope::Global,
        ScenarioConfig {
            drop_packets: Some([(101u16, 1.0f64)].into_iter().collect()),
            ..Default::default()
        },
    );
    ts.server.set_scenario(
        &Scope::Device(serial(1)),
        ScenarioConfig {
            drop_packets: Some([(101u16, 0.0f64)].into_iter().collect()),
            ..Default::default()
        },
    );
    let sock = client().await;

    for seq in 0..5 {
        sock.send_to(
            &request(Some(serial(1)), Message::LightGet, 1, seq, true, false),
            ts.addr,
        )
        .await
        .unwrap();
    }
    let responses = recv_all(&sock, Duration::from_millis(300)).await;
    assert_eq!(responses.len(), 5);
}

// Property 6: extended multizone covers the zone array in ceil(Z/82) packets.
#[tokio::test]
async fn extended_multizone_partition() {
    let ts = start_server(vec![factory::create_multizone_light(serial(1), 120, true)]).await;
    let sock = client().await;

    sock.send_to(
        &request(
            Some(serial(1)),
            Message::GetExtendedColorZones,
            1,
            1,
            true,
            false,
        ),
        ts.addr,
    )
    .await
    .unwrap();

    let responses = recv_all(&sock, Duration::from_millis(300)).await;
    assert_eq!(responses.len(), 2);
    let mut covered = 0usize;
    for raw in &responses {
        match Message::from_raw(raw).unwrap() {
            Message::StateExtendedColorZones {
                zones_count,
                colors_count,
                ..
            } => {
                assert_eq!(zones_count, 120);
                covered += usize::from(colors_count);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }
    assert_eq!(covered, 120);
}
