//! Sends a GetService to a server (the emulator by default) and prints each device that
//! answers, along with its label and product.

use lifx_proto::{get_product_info, BuildOptions, Message, RawMessage, Serial};
use std::net::UdpSocket;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:56700".to_string());

    let sock = UdpSocket::bind("0.0.0.0:0")?;
    sock.set_broadcast(true)?;
    sock.set_read_timeout(Some(Duration::from_millis(1500)))?;

    let discovery = RawMessage::build(
        &BuildOptions {
            source: 0x70726f62, // "prob"
            res_required: true,
            ..Default::default()
        },
        Message::GetService,
    )?;
    sock.send_to(&discovery.pack()?, &target)?;

    let mut buf = [0u8; 2048];
    let mut found = 0u32;
    while let Ok((len, addr)) = sock.recv_from(&mut buf) {
        let raw = match RawMessage::unpack(&buf[..len]) {
            Ok(raw) => raw,
            Err(_) => continue,
        };
        let serial = Serial::from_target(raw.frame_addr.target);
        match Message::from_raw(&raw) {
            Ok(Message::StateService { port, .. }) => {
                found += 1;
                println!("{} at {} (port {})", serial, addr.ip(), port);
                if let Some((label, product)) = query_device(&sock, &addr.to_string(), serial)? {
                    let name = get_product_info(1, product)
                        .map(|info| info.name)
                        .unwrap_or("unknown product");
                    println!("    \"{}\" - {} (pid {})", label, name, product);
                }
            }
            Ok(_) | Err(_) => {}
        }
    }

    println!("{} device(s) found", found);
    Ok(())
}

/// Asks one device for its label and version.
fn query_device(
    sock: &UdpSocket,
    addr: &str,
    serial: Serial,
) -> Result<Option<(String, u32)>, Box<dyn std::error::Error>> {
    let options = BuildOptions {
        target: Some(serial.as_target()),
        res_required: true,
        source: 0x70726f62,
        ..Default::default()
    };
    sock.send_to(
        &RawMessage::build(&options, Message::GetLabel)?.pack()?,
        addr,
    )?;
    sock.send_to(
        &RawMessage::build(&options, Message::GetVersion)?.pack()?,
        addr,
    )?;

    let mut label = None;
    let mut product = None;
    let mut buf = [0u8; 2048];
    while label.is_none() || product.is_none() {
        let Ok((len, _)) = sock.recv_from(&mut buf) else {
            return Ok(None);
        };
        let Ok(raw) = RawMessage::unpack(&buf[..len]) else {
            continue;
        };
        match Message::from_raw(&raw) {
            Ok(Message::StateLabel { label: l }) => label = Some(l.0),
            Ok(Message::StateVersion { product: p, .. }) => product = Some(p),
            _ => {}
        }
    }
    Ok(label.zip(product))
}
