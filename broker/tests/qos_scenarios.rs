// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! PUBLISH fan-out at each QoS level (spec 8 scenarios 1-3).

mod common;

use std::time::Duration;

use codec::{
    ConnectFlags, ConnectPacket, Packet, PublishAckPacket, PublishCompletePacket, PublishPacket,
    PublishReceivedPacket, PublishReleasePacket, QoS, SubscribePacket, SubscribeTopic,
};

fn connect(client_id: &str) -> Packet {
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
async fn qos0_fan_out_delivers_to_subscriber_only() {
    let port = 18901;
    common::start_broker(common::test_config(port)).await;

    let mut a = common::connect_raw(port).await;
    common::send_packet(&mut a, &connect("A")).await;
    assert!(matches!(common::read_packet(&mut a).await, Packet::ConnectAck(_)));
    common::send_packet(
        &mut a,
        &Packet::Subscribe(SubscribePacket {
            packet_id: 1,
            topics: vec![SubscribeTopic {
                topic: "a/b".to_string(),
                qos: QoS::AtMostOnce,
            }],
        }),
    )
    .await;
    assert!(matches!(
        common::read_packet(&mut a).await,
        Packet::SubscribeAck(_)
    ));

    let mut b = common::connect_raw(port).await;
    common::send_packet(&mut b, &connect("B")).await;
    assert!(matches!(common::read_packet(&mut b).await, Packet::ConnectAck(_)));
    common::send_packet(
        &mut b,
        &Packet::Publish(PublishPacket::new("a/b", QoS::AtMostOnce, b"hi".to_vec())),
    )
    .await;

    let received = common::read_packet(&mut a).await;
    match received {
        Packet::Publish(packet) => {
            assert_eq!(packet.payload, b"hi");
            assert_eq!(packet.qos, QoS::AtMostOnce);
            assert_eq!(packet.packet_id, 0);
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    }

    common::expect_no_packet(&mut b, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn qos1_ack_dance_clears_inflight_slot() {
    let port = 18902;
    common::start_broker(common::test_config(port)).await;

    let mut a = common::connect_raw(port).await;
    common::send_packet(&mut a, &connect("A")).await;
    common::read_packet(&mut a).await;
    common::send_packet(
        &mut a,
        &Packet::Subscribe(SubscribePacket {
            packet_id: 1,
            topics: vec![SubscribeTopic {
                topic: "t".to_string(),
                qos: QoS::AtLeastOnce,
            }],
        }),
    )
    .await;
    common::read_packet(&mut a).await;

    let mut b = common::connect_raw(port).await;
    common::send_packet(&mut b, &connect("B")).await;
    common::read_packet(&mut b).await;
    let mut publish = PublishPacket::new("t", QoS::AtLeastOnce, b"x".to_vec());
    publish.packet_id = 17;
    common::send_packet(&mut b, &Packet::Publish(publish)).await;

    match common::read_packet(&mut b).await {
        Packet::PublishAck(ack) => assert_eq!(ack.packet_id, 17),
        other => panic!("expected PUBACK, got {other:?}"),
    }

    let forwarded_id = match common::read_packet(&mut a).await {
        Packet::Publish(packet) => {
            assert_eq!(packet.qos, QoS::AtLeastOnce);
            assert_eq!(packet.payload, b"x");
            packet.packet_id
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    };

    common::send_packet(
        &mut a,
        &Packet::PublishAck(PublishAckPacket::new(forwarded_id)),
    )
    .await;
    // No reply is expected for a PUBACK; a further PUBLISH from B would be
    // enough to prove the slot is free, but this test stops at the
    // acknowledgement surface described in scenario 2.
}

#[tokio::test]
async fn qos2_handshake_completes_on_both_sides() {
    let port = 18903;
    common::start_broker(common::test_config(port)).await;

    let mut a = common::connect_raw(port).await;
    common::send_packet(&mut a, &connect("A")).await;
    common::read_packet(&mut a).await;
    common::send_packet(
        &mut a,
        &Packet::Subscribe(SubscribePacket {
            packet_id: 1,
            topics: vec![SubscribeTopic {
                topic: "t".to_string(),
                qos: QoS::ExactlyOnce,
            }],
        }),
    )
    .await;
    common::read_packet(&mut a).await;

    let mut b = common::connect_raw(port).await;
    common::send_packet(&mut b, &connect("B")).await;
    common::read_packet(&mut b).await;
    let mut publish = PublishPacket::new("t", QoS::ExactlyOnce, b"y".to_vec());
    publish.packet_id = 9;
    common::send_packet(&mut b, &Packet::Publish(publish)).await;

    match common::read_packet(&mut b).await {
        Packet::PublishReceived(packet) => assert_eq!(packet.packet_id, 9),
        other => panic!("expected PUBREC, got {other:?}"),
    }
    common::send_packet(&mut b, &Packet::PublishRelease(PublishReleasePacket::new(9))).await;
    match common::read_packet(&mut b).await {
        Packet::PublishComplete(packet) => assert_eq!(packet.packet_id, 9),
        other => panic!("expected PUBCOMP, got {other:?}"),
    }

    let forwarded_id = match common::read_packet(&mut a).await {
        Packet::Publish(packet) => {
            assert_eq!(packet.qos, QoS::ExactlyOnce);
            assert_eq!(packet.payload, b"y");
            packet.packet_id
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    };
    common::send_packet(
        &mut a,
        &Packet::PublishReceived(PublishReceivedPacket::new(forwarded_id)),
    )
    .await;
    match common::read_packet(&mut a).await {
        Packet::PublishRelease(packet) => assert_eq!(packet.packet_id, forwarded_id),
        other => panic!("expected PUBREL, got {other:?}"),
    }
    common::send_packet(
        &mut a,
        &Packet::PublishComplete(PublishCompletePacket::new(forwarded_id)),
    )
    .await;
}
