// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! `PUBLISH`/`PUBACK`/`PUBREC`/`PUBREL`/`PUBCOMP` handling (spec 4.D).

use std::time::Instant;
use tokio::sync::mpsc;

use codec::{
    Packet, PublishAckPacket, PublishCompletePacket, PublishPacket, PublishReceivedPacket,
    PublishReleasePacket, QoS,
};

use crate::commands::WriterCmd;
use crate::error::Error;
use crate::handlers::PendingWrite;
use crate::session::{InflightEntry, SessionStore};
use crate::state::BrokerState;
use crate::stats::Stats;
use crate::topic::TopicRegistry;

pub(super) fn handle(
    state: &mut BrokerState,
    client_id: &str,
    reply_tx: &mpsc::Sender<WriterCmd>,
    packet: PublishPacket,
    writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    if packet.retain {
        state
            .topics
            .set_retained(&packet.topic, packet.payload.clone(), packet.qos);
    }

    let incoming_packet_id = packet.packet_id;
    let qos = packet.qos;
    publish_message(
        &mut state.topics,
        &mut state.sessions,
        &state.stats,
        &packet,
        writes,
    )?;
    state.stats.record_message_received();

    match qos {
        QoS::AtMostOnce => {}
        QoS::AtLeastOnce => {
            let ack = Packet::PublishAck(PublishAckPacket::new(incoming_packet_id));
            writes.push(PendingWrite::write(reply_tx, &ack)?);
        }
        QoS::ExactlyOnce => {
            if let Some(session) = state.sessions.lookup_mut(client_id) {
                session
                    .inbound_ack_inflight
                    .insert(incoming_packet_id, ());
            }
            let ack = Packet::PublishReceived(PublishReceivedPacket::new(incoming_packet_id));
            writes.push(PendingWrite::write(reply_tx, &ack)?);
        }
    }
    Ok(())
}

/// Fan a PUBLISH out to every subscriber of its topic (spec 4.D
/// `publish_message`). Shared by the PUBLISH handler, CONNECT's will
/// takeover path, DISCONNECT/teardown's will publication, and the
/// periodic `$SYS` publisher.
pub(crate) fn publish_message(
    topics: &mut TopicRegistry,
    sessions: &mut SessionStore,
    stats: &Stats,
    packet: &PublishPacket,
    writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    for (subscriber_id, granted_qos) in topics.matching_subscribers(&packet.topic) {
        let effective_qos = packet.qos.min(granted_qos);
        let Some(session) = sessions.lookup_mut(&subscriber_id) else {
            continue;
        };

        if !session.online && !session.clean_session {
            let mut queued = packet.clone();
            queued.qos = effective_qos;
            queued.packet_id = 0;
            session.pending.push_back(queued);
            continue;
        }
        if !session.online {
            // clean_session=true and offline: the subscription itself
            // should already be gone, but guard against a stale entry.
            continue;
        }

        let Some(writer) = session.writer.clone() else {
            continue;
        };

        let mut outgoing = packet.clone();
        outgoing.qos = effective_qos;
        outgoing.packet_id = 0;

        if effective_qos != QoS::AtMostOnce {
            let packet_id = match session.next_free_mid() {
                Ok(id) => id,
                Err(err) => {
                    log::warn!(
                        "publish_message: {subscriber_id} has no free packet id, disconnecting: {err}"
                    );
                    writes.push(PendingWrite::close(&writer));
                    session.online = false;
                    session.writer = None;
                    continue;
                }
            };
            outgoing.packet_id = packet_id;
            session.outbound_inflight.insert(
                packet_id,
                InflightEntry {
                    packet: outgoing.clone(),
                    qos: effective_qos,
                    seen: Instant::now(),
                },
            );
            if effective_qos == QoS::ExactlyOnce {
                session
                    .outbound_ack_inflight
                    .insert(packet_id, Instant::now());
            }
        }

        writes.push(PendingWrite::write(&writer, &Packet::Publish(outgoing))?);
        stats.record_message_sent();
    }
    Ok(())
}

pub(super) fn handle_ack(state: &mut BrokerState, client_id: &str, packet_id: u16) {
    if let Some(session) = state.sessions.lookup_mut(client_id) {
        session.outbound_inflight.remove(&packet_id);
        session.outbound_ack_inflight.remove(&packet_id);
    }
}

pub(super) fn handle_received(
    state: &mut BrokerState,
    client_id: &str,
    reply_tx: &mpsc::Sender<WriterCmd>,
    packet: PublishReceivedPacket,
    writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    if let Some(session) = state.sessions.lookup_mut(client_id) {
        session
            .outbound_ack_inflight
            .insert(packet.packet_id, Instant::now());
    }
    let rel = Packet::PublishRelease(PublishReleasePacket::new(packet.packet_id));
    writes.push(PendingWrite::write(reply_tx, &rel)?);
    Ok(())
}

pub(super) fn handle_release(
    state: &mut BrokerState,
    client_id: &str,
    reply_tx: &mpsc::Sender<WriterCmd>,
    packet: PublishReleasePacket,
    writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    if let Some(session) = state.sessions.lookup_mut(client_id) {
        session.inbound_ack_inflight.remove(&packet.packet_id);
    }
    let comp = Packet::PublishComplete(PublishCompletePacket::new(packet.packet_id));
    writes.push(PendingWrite::write(reply_tx, &comp)?);
    Ok(())
}

pub(super) fn handle_complete(state: &mut BrokerState, client_id: &str, packet_id: u16) {
    if let Some(session) = state.sessions.lookup_mut(client_id) {
        session.outbound_inflight.remove(&packet_id);
        session.outbound_ack_inflight.remove(&packet_id);
    }
}
