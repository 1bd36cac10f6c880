// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Persistent-session resumption: messages published while a
//! `clean_session=false` client is offline are queued and replayed in FIFO
//! order on reconnect, before any new traffic (spec 8 scenario 6).

mod common;

use std::time::Duration;

use codec::{
    ConnectFlags, ConnectPacket, ConnectReturnCode, Packet, PublishPacket, QoS, SubscribePacket,
    SubscribeTopic,
};

fn connect_persistent(client_id: &str) -> Packet {
    Packet::Connect(ConnectPacket {
        protocol_level: 4,
        connect_flags: ConnectFlags {
            clean_session: false,
            ..ConnectFlags::default()
        },
        keep_alive: 60,
        client_id: client_id.to_string(),
        ..ConnectPacket::default()
    })
}

fn connect_clean(client_id: &str) -> Packet {
    Packet::Connect(ConnectPacket {
        protocol_level: 4,
        connect_flags: ConnectFlags {
            clean_session: true,
            ..ConnectFlags::default()
        },
        keep_alive: 60,
        client_id: client_id.to_string(),
        ..ConnectPacket::default()
    })
}

#[tokio::test]
async fn offline_queue_replays_in_order_on_reconnect() {
    let port = 18921;
    common::start_broker(common::test_config(port)).await;

    let mut a = common::connect_raw(port).await;
    common::send_packet(&mut a, &connect_persistent("a")).await;
    match common::read_packet(&mut a).await {
        Packet::ConnectAck(ack) => assert!(!ack.session_present),
        other => panic!("expected CONNACK, got {other:?}"),
    }
    common::send_packet(
        &mut a,
        &Packet::Subscribe(SubscribePacket {
            packet_id: 1,
            topics: vec![SubscribeTopic {
                topic: "q".to_string(),
                qos: QoS::AtLeastOnce,
            }],
        }),
    )
    .await;
    assert!(matches!(
        common::read_packet(&mut a).await,
        Packet::SubscribeAck(_)
    ));

    // Simulate an unclean disconnect: drop the transport without sending
    // DISCONNECT, so the session survives with clean_session=false.
    drop(a);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut b = common::connect_raw(port).await;
    common::send_packet(&mut b, &connect_clean("b")).await;
    common::read_packet(&mut b).await;

    let mut first = PublishPacket::new("q", QoS::AtLeastOnce, b"one".to_vec());
    first.packet_id = 1;
    common::send_packet(&mut b, &Packet::Publish(first)).await;
    common::read_packet(&mut b).await;

    let mut second = PublishPacket::new("q", QoS::AtLeastOnce, b"two".to_vec());
    second.packet_id = 2;
    common::send_packet(&mut b, &Packet::Publish(second)).await;
    common::read_packet(&mut b).await;

    let mut a = common::connect_raw(port).await;
    common::send_packet(&mut a, &connect_persistent("a")).await;
    match common::read_packet(&mut a).await {
        Packet::ConnectAck(ack) => {
            assert!(ack.session_present);
            assert_eq!(ack.return_code, ConnectReturnCode::Accepted);
        }
        other => panic!("expected CONNACK, got {other:?}"),
    }

    match common::read_packet(&mut a).await {
        Packet::Publish(packet) => assert_eq!(packet.payload, b"one"),
        other => panic!("expected queued PUBLISH \"one\" first, got {other:?}"),
    }
    match common::read_packet(&mut a).await {
        Packet::Publish(packet) => assert_eq!(packet.payload, b"two"),
        other => panic!("expected queued PUBLISH \"two\" second, got {other:?}"),
    }
}
