// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Shared harness for integration tests: boots a [`broker::Broker`] on a
//! fixed loopback port inside the test's own Tokio runtime and drives it
//! with raw `TcpStream` clients encoding packets through `codec` directly,
//! in place of the external-process harness this crate's tests are modeled
//! on.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;

use broker::auth::AuthManager;
use broker::config::Config;
use broker::Broker;

use codec::Packet;

/// Build a config bound to `127.0.0.1:port`, anonymous access allowed, and
/// `$SYS` publication disabled (tests assert on specific PUBLISHes and don't
/// want the periodic stats noise interleaved).
pub fn test_config(port: u16) -> Config {
    let toml_str = format!(
        r#"
        [general]
        stats_pub_interval = 0

        [listener]
        port = {port}

        [security]
        allow_anonymous = true
        "#
    );
    toml::from_str(&toml_str).expect("valid test config")
}

/// Start a broker on its own task and give the listener a moment to bind
/// before the caller tries to connect.
pub async fn start_broker(config: Config) {
    let auth = AuthManager::from_config(config.security()).expect("auth manager");
    let broker = Broker::new(config, auth);
    tokio::spawn(broker.run());
    sleep(Duration::from_millis(50)).await;
}

pub async fn connect_raw(port: u16) -> TcpStream {
    TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connect to test broker")
}

pub async fn send_packet(stream: &mut TcpStream, packet: &Packet) {
    let mut buf = Vec::new();
    packet.encode(&mut buf).expect("encode packet");
    stream.write_all(&buf).await.expect("write packet");
}

/// Read exactly one packet, accumulating bytes until a full frame is
/// available, mirroring the framing the connection's own read loop does.
pub async fn read_packet(stream: &mut TcpStream) -> Packet {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        if let Some(total_len) = codec::peek_total_len(&buf) {
            if buf.len() >= total_len {
                let (packet, _) = Packet::decode(&buf).expect("decode packet");
                return packet;
            }
        }
        let n = stream.read(&mut chunk).await.expect("read from broker");
        assert!(n > 0, "broker closed the connection while awaiting a packet");
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// `read_packet` with a timeout, for assertions that a client should
/// receive nothing.
pub async fn expect_no_packet(stream: &mut TcpStream, within: Duration) {
    let result = tokio::time::timeout(within, read_packet(stream)).await;
    assert!(
        result.is_err(),
        "expected no packet, but received {:?}",
        result.ok()
    );
}
