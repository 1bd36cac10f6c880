// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! `CONNECT` handling (spec 4.D).

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::mpsc;

use codec::{ConnectAckPacket, ConnectPacket, ConnectReturnCode, Packet, QoS};

use crate::commands::WriterCmd;
use crate::config::Config;
use crate::error::Error;
use crate::handlers::{publish_message, PendingWrite};
use crate::state::BrokerState;

const GENERATED_CLIENT_ID_LEN: usize = 16;

pub(super) async fn handle(
    state: &mut BrokerState,
    config: &Config,
    reply_tx: &mpsc::Sender<WriterCmd>,
    packet: ConnectPacket,
    writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    if !packet.is_valid_protocol() {
        log::warn!(
            "connect: unsupported protocol level {}",
            packet.protocol_level
        );
        reject(reply_tx, ConnectReturnCode::UnacceptableProtocolVersion, writes)?;
        return Ok(());
    }

    if !config.security().allow_anonymous() || packet.connect_flags.username {
        let username = packet
            .connect_flags
            .username
            .then_some(packet.username.as_str());
        if !state.auth.authenticate(username, &packet.password) {
            log::warn!("connect: authentication failed for {username:?}");
            reject(reply_tx, ConnectReturnCode::BadUsernameOrPassword, writes)?;
            return Ok(());
        }
    }

    let clean_session = packet.connect_flags.clean_session;
    let client_id = if packet.client_id.is_empty() {
        if !clean_session {
            log::warn!("connect: empty client id with clean_session=false");
            reject(reply_tx, ConnectReturnCode::NotAuthorized, writes)?;
            return Ok(());
        }
        generate_client_id()
    } else {
        packet.client_id.clone()
    };

    // [MQTT-3.1.4-2]: if this id is already connected, disconnect the
    // older client (takeover) before attaching the new one.
    let is_takeover = state
        .sessions
        .lookup(&client_id)
        .is_some_and(|s| s.online);
    if is_takeover {
        log::info!("connect: client id {client_id} taken over by a new connection");
        let takeover_will = state
            .sessions
            .lookup(&client_id)
            .and_then(|s| s.will.clone());
        if let Some(will) = takeover_will {
            publish_message(
                &mut state.topics,
                &mut state.sessions,
                &state.stats,
                &will,
                writes,
            )?;
        }
        let old_writer = state
            .sessions
            .lookup(&client_id)
            .and_then(|s| s.writer.clone());
        if let Some(old_writer) = old_writer {
            writes.push(PendingWrite::close(&old_writer));
        }
    }

    let (session, existed) = state.sessions.open(&client_id, clean_session);
    session.writer = Some(reply_tx.clone());
    session.keep_alive = packet.keep_alive;
    session.last_action = std::time::Instant::now();

    if packet.connect_flags.will {
        let mut will = codec::PublishPacket::new(
            &packet.will_topic,
            packet.connect_flags.will_qos,
            packet.will_message.clone(),
        );
        will.retain = packet.connect_flags.will_retain;
        if will.retain {
            state
                .topics
                .set_retained(&will.topic, will.payload.clone(), will.qos);
        }
        state
            .sessions
            .lookup_mut(&client_id)
            .expect("just opened")
            .will = Some(will);
    }

    state.stats.client_connected();

    // [MQTT-3.2.0-1]: CONNACK must be the first packet the server sends,
    // so it is enqueued on the writer channel before anything else,
    // including the offline-queue flush below.
    writes.push(PendingWrite {
        writer: reply_tx.clone(),
        cmd: WriterCmd::Bind(client_id.clone()),
    });
    let ack = Packet::ConnectAck(ConnectAckPacket::new(existed, ConnectReturnCode::Accepted));
    writes.push(PendingWrite::write(reply_tx, &ack)?);

    // Flush any PUBLISHes queued while this (clean_session=false) session
    // was offline, in FIFO order, after CONNACK but before any new traffic
    // (spec 8 scenario 6).
    let session = state.sessions.lookup_mut(&client_id).expect("just opened");
    while let Some(queued) = session.pending.pop_front() {
        deliver_or_queue(session, &queued, reply_tx, writes)?;
    }

    Ok(())
}

/// Re-deliver a queued PUBLISH to its now-online owner, reusing the same
/// packet-id allocation path a fresh fan-out would (spec 4.D
/// `publish_message` step 4).
fn deliver_or_queue(
    session: &mut crate::session::Session,
    packet: &codec::PublishPacket,
    reply_tx: &mpsc::Sender<WriterCmd>,
    writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    let mut outgoing = packet.clone();
    if outgoing.qos != QoS::AtMostOnce {
        let packet_id = session.next_free_mid()?;
        outgoing.packet_id = packet_id;
        session.outbound_inflight.insert(
            packet_id,
            crate::session::InflightEntry {
                packet: outgoing.clone(),
                qos: outgoing.qos,
                seen: std::time::Instant::now(),
            },
        );
        if outgoing.qos == QoS::ExactlyOnce {
            session
                .outbound_ack_inflight
                .insert(packet_id, std::time::Instant::now());
        }
    }
    writes.push(PendingWrite::write(reply_tx, &Packet::Publish(outgoing))?);
    Ok(())
}

fn reject(
    reply_tx: &mpsc::Sender<WriterCmd>,
    code: ConnectReturnCode,
    writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    let ack = Packet::ConnectAck(ConnectAckPacket::new(false, code));
    writes.push(PendingWrite::write(reply_tx, &ack)?);
    writes.push(PendingWrite::close(reply_tx));
    Ok(())
}

fn generate_client_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_CLIENT_ID_LEN)
        .map(char::from)
        .collect();
    format!("auto-{suffix}")
}
