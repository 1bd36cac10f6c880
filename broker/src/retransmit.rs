// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Periodic inflight retransmitter and keep-alive scan (spec 4.F, 2).

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use codec::Packet;

use crate::commands::WriterCmd;
use crate::handlers::{publish_message, PendingWrite};
use crate::state::BrokerState;

/// Inflight entries older than this are resent with DUP set (spec 4.F).
const RETRANSMIT_AGE: Duration = Duration::from_secs(20);

/// The scan driving both retransmission and keep-alive fires at this period
/// (spec 4.E "inflight retransmission timer fires every 200 ms").
const SCAN_INTERVAL: Duration = Duration::from_millis(200);

/// Run forever, waking every [`SCAN_INTERVAL`] to resend stale QoS>0
/// deliveries and disconnect clients past their keep-alive allowance.
pub async fn run(state: Arc<Mutex<BrokerState>>) {
    let mut ticker = tokio::time::interval(SCAN_INTERVAL);
    loop {
        ticker.tick().await;
        let mut writes = Vec::new();
        {
            let mut state = state.lock().await;
            scan_inflight(&mut state, &mut writes);
            scan_keep_alive(&mut state, &mut writes);
        }
        for pending in writes {
            if let Err(err) = pending.writer.send(pending.cmd).await {
                log::debug!("retransmit: dropping write to a closed connection: {err}");
            }
        }
    }
}

/// Re-send every outbound inflight/ack-inflight entry older than
/// [`RETRANSMIT_AGE`] with its DUP flag set, for online clients only; an
/// offline client's entries are left untouched, to be flushed by its next
/// reconnect (spec 4.F).
fn scan_inflight(state: &mut BrokerState, writes: &mut Vec<PendingWrite>) {
    let now = Instant::now();
    for session in state.sessions.iter_mut() {
        if !session.online {
            continue;
        }
        let Some(writer) = session.writer.clone() else {
            continue;
        };

        for entry in session.outbound_inflight.values_mut() {
            if now.duration_since(entry.seen) > RETRANSMIT_AGE {
                let mut dup = entry.packet.clone();
                dup.dup = true;
                if let Ok(buf) = encode(&Packet::Publish(dup)) {
                    writes.push(PendingWrite {
                        writer: writer.clone(),
                        cmd: WriterCmd::Write(buf),
                    });
                }
                entry.seen = now;
            }
        }

        for (packet_id, seen) in session.outbound_ack_inflight.iter_mut() {
            if now.duration_since(*seen) > RETRANSMIT_AGE {
                let rel = codec::PublishReleasePacket::new(*packet_id);
                if let Ok(buf) = encode(&Packet::PublishRelease(rel)) {
                    writes.push(PendingWrite {
                        writer: writer.clone(),
                        cmd: WriterCmd::Write(buf),
                    });
                }
                *seen = now;
            }
        }
    }
}

/// Disconnect any online session whose keep-alive allowance (1.5 times the
/// interval from its CONNECT, `MQTT-3.1.2-24`) has elapsed since its last
/// processed packet, publishing its Will first.
fn scan_keep_alive(state: &mut BrokerState, writes: &mut Vec<PendingWrite>) {
    let now = Instant::now();
    let mut timed_out = Vec::new();
    for session in state.sessions.iter_mut() {
        if !session.online || session.keep_alive == 0 {
            continue;
        }
        let allowance = Duration::from_millis(u64::from(session.keep_alive) * 1500);
        if now.duration_since(session.last_action) > allowance {
            timed_out.push(session.client_id.clone());
        }
    }

    for client_id in timed_out {
        log::info!("retransmit: {client_id} exceeded its keep-alive allowance, disconnecting");
        let will = state
            .sessions
            .lookup_mut(&client_id)
            .and_then(|s| s.will.take());
        if let Some(will) = will {
            if let Err(err) = publish_message(
                &mut state.topics,
                &mut state.sessions,
                &state.stats,
                &will,
                writes,
            ) {
                log::warn!("retransmit: failed to publish will for {client_id}: {err}");
            }
        }

        if let Some(session) = state.sessions.lookup(&client_id) {
            if let Some(writer) = &session.writer {
                writes.push(PendingWrite {
                    writer: writer.clone(),
                    cmd: WriterCmd::Close,
                });
            }
            if session.clean_session {
                state.topics.remove_client(&client_id);
            }
        }
        state.sessions.close(&client_id);
        state.stats.client_disconnected();
    }
}

fn encode(packet: &Packet) -> Result<Vec<u8>, codec::EncodeError> {
    let mut buf = Vec::new();
    packet.encode(&mut buf)?;
    Ok(buf)
}
