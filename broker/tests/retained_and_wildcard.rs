// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Retained-message replay and wildcard subscription matching
//! (spec 8 scenarios 4-5).

mod common;

use codec::{
    ConnectFlags, ConnectPacket, Packet, PublishPacket, QoS, SubscribePacket, SubscribeTopic,
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
async fn retained_message_replays_to_late_subscriber() {
    let port = 18911;
    common::start_broker(common::test_config(port)).await;

    let mut b = common::connect_raw(port).await;
    common::send_packet(&mut b, &connect("B")).await;
    common::read_packet(&mut b).await;

    let mut retained = PublishPacket::new("room/1", QoS::AtMostOnce, b"r".to_vec());
    retained.retain = true;
    common::send_packet(&mut b, &Packet::Publish(retained)).await;

    let mut a = common::connect_raw(port).await;
    common::send_packet(&mut a, &connect("A")).await;
    common::read_packet(&mut a).await;
    common::send_packet(
        &mut a,
        &Packet::Subscribe(SubscribePacket {
            packet_id: 1,
            topics: vec![SubscribeTopic {
                topic: "room/1".to_string(),
                qos: QoS::AtMostOnce,
            }],
        }),
    )
    .await;
    assert!(matches!(
        common::read_packet(&mut a).await,
        Packet::SubscribeAck(_)
    ));

    match common::read_packet(&mut a).await {
        Packet::Publish(packet) => {
            assert_eq!(packet.topic, "room/1");
            assert_eq!(packet.payload, b"r");
            assert!(packet.retain);
        }
        other => panic!("expected retained PUBLISH replay, got {other:?}"),
    }
}

#[tokio::test]
async fn wildcard_subscription_matches_topic_created_afterwards() {
    let port = 18912;
    common::start_broker(common::test_config(port)).await;

    let mut a = common::connect_raw(port).await;
    common::send_packet(&mut a, &connect("A")).await;
    common::read_packet(&mut a).await;
    common::send_packet(
        &mut a,
        &Packet::Subscribe(SubscribePacket {
            packet_id: 1,
            topics: vec![SubscribeTopic {
                topic: "sensors/#".to_string(),
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
    common::read_packet(&mut b).await;
    common::send_packet(
        &mut b,
        &Packet::Publish(PublishPacket::new(
            "sensors/temp/living",
            QoS::AtMostOnce,
            b"21.5".to_vec(),
        )),
    )
    .await;

    match common::read_packet(&mut a).await {
        Packet::Publish(packet) => {
            assert_eq!(packet.topic, "sensors/temp/living");
            assert_eq!(packet.payload, b"21.5");
        }
        other => panic!("expected PUBLISH via wildcard match, got {other:?}"),
    }
}
