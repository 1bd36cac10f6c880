// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! `SUBSCRIBE` handling (spec 4.D).

use std::time::Instant;
use tokio::sync::mpsc;

use codec::{Packet, QoS, SubscribeAck, SubscribeAckPacket, SubscribePacket};

use crate::commands::WriterCmd;
use crate::error::Error;
use crate::handlers::PendingWrite;
use crate::session::InflightEntry;
use crate::state::BrokerState;

pub(super) fn handle(
    state: &mut BrokerState,
    client_id: &str,
    reply_tx: &mpsc::Sender<WriterCmd>,
    packet: SubscribePacket,
    writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    let mut acks = Vec::with_capacity(packet.topics.len());
    let mut retained_deliveries = Vec::new();

    for sub in &packet.topics {
        // Granted QoS always equals the requested QoS: this broker has no
        // configured maximum below QoS 2 (spec 4.D SUBSCRIBE simplification).
        state.topics.subscribe(client_id, &sub.topic, sub.qos);
        acks.push(subscribe_ack(sub.qos));

        for (topic, retained) in state.topics.matching_retained(&sub.topic) {
            let effective_qos = retained.qos.min(sub.qos);
            retained_deliveries.push((topic, retained.payload, effective_qos));
        }
    }

    // SUBACK must reach the client before any retained-message replay, so
    // it is enqueued on the writer channel first.
    let ack = Packet::SubscribeAck(SubscribeAckPacket::new(packet.packet_id, acks));
    writes.push(PendingWrite::write(reply_tx, &ack)?);

    for (topic, payload, qos) in retained_deliveries {
        deliver_retained(state, client_id, reply_tx, &topic, payload, qos, writes)?;
    }
    Ok(())
}

fn subscribe_ack(qos: QoS) -> SubscribeAck {
    match qos {
        QoS::AtMostOnce => SubscribeAck::QoS0,
        QoS::AtLeastOnce => SubscribeAck::QoS1,
        QoS::ExactlyOnce => SubscribeAck::QoS2,
    }
}

fn deliver_retained(
    state: &mut BrokerState,
    client_id: &str,
    reply_tx: &mpsc::Sender<WriterCmd>,
    topic: &str,
    payload: Vec<u8>,
    qos: QoS,
    writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    let mut outgoing = codec::PublishPacket::new(topic, qos, payload);
    outgoing.retain = true;

    if qos != QoS::AtMostOnce {
        let Some(session) = state.sessions.lookup_mut(client_id) else {
            return Ok(());
        };
        let packet_id = session.next_free_mid()?;
        outgoing.packet_id = packet_id;
        session.outbound_inflight.insert(
            packet_id,
            InflightEntry {
                packet: outgoing.clone(),
                qos,
                seen: Instant::now(),
            },
        );
        if qos == QoS::ExactlyOnce {
            session
                .outbound_ack_inflight
                .insert(packet_id, Instant::now());
        }
    }

    writes.push(PendingWrite::write(reply_tx, &Packet::Publish(outgoing))?);
    state.stats.record_message_sent();
    Ok(())
}
