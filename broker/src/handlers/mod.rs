// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Per-opcode packet handlers (spec 4.D): the worker pool's dispatch table.
//!
//! Every handler runs with the broker's single state lock held, mutating
//! the topic registry and session map directly. None of them perform I/O
//! themselves; instead they push `(writer, WriterCmd)` pairs onto a
//! `Vec<PendingWrite>`, which `dispatch` drains only after the lock has
//! been released (spec 9: "the publish fan-out path reads the subscriber
//! set under the topic lock, then releases it before I/O scheduling").

mod connect;
mod disconnect;
mod ping;
mod publish;
mod subscribe;
mod unsubscribe;

use tokio::sync::{mpsc, Mutex};

use codec::Packet;

use crate::commands::{IoEvent, WorkItem, WriterCmd};
use crate::config::Config;
use crate::error::{Error, ErrorKind};
use crate::state::BrokerState;

pub(crate) use publish::publish_message;

/// One encoded (or pre-built) command destined for a connection's writer
/// task, collected while the state lock is held and sent afterwards.
pub struct PendingWrite {
    pub writer: mpsc::Sender<WriterCmd>,
    pub cmd: WriterCmd,
}

impl PendingWrite {
    fn write(writer: &mpsc::Sender<WriterCmd>, packet: &Packet) -> Result<Self, Error> {
        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        Ok(Self {
            writer: writer.clone(),
            cmd: WriterCmd::Write(buf),
        })
    }

    fn close(writer: &mpsc::Sender<WriterCmd>) -> Self {
        Self {
            writer: writer.clone(),
            cmd: WriterCmd::Close,
        }
    }
}

/// Drain the shared worker queue once: take the lock, pull one item, drop
/// the lock, then dispatch. Several worker tasks racing this is the async
/// equivalent of N threads sharing one epoll descriptor (spec 9).
pub async fn run_worker(
    state: std::sync::Arc<Mutex<BrokerState>>,
    config: std::sync::Arc<Config>,
    queue: std::sync::Arc<Mutex<mpsc::Receiver<WorkItem>>>,
) {
    loop {
        let item = {
            let mut receiver = queue.lock().await;
            receiver.recv().await
        };
        let Some(item) = item else {
            log::info!("handlers: worker queue closed, exiting");
            return;
        };
        let writes = dispatch(&state, &config, item).await;
        for pending in writes {
            if let Err(err) = pending.writer.send(pending.cmd).await {
                log::debug!("handlers: dropping write to a closed connection: {err}");
            }
        }
    }
}

/// Route one work item to its handler, holding the broker lock for the
/// whole critical section (spec 4.E "worker loop").
async fn dispatch(
    state: &Mutex<BrokerState>,
    config: &Config,
    item: WorkItem,
) -> Vec<PendingWrite> {
    let mut writes = Vec::new();
    let mut state = state.lock().await;

    let result = match item {
        WorkItem::Packet(event) => dispatch_packet(&mut state, config, event, &mut writes).await,
        WorkItem::Closed {
            client_id,
            involuntary,
            ..
        } => {
            if let Some(client_id) = client_id {
                disconnect::teardown(&mut state, &client_id, involuntary, &mut writes)
            } else {
                Ok(())
            }
        }
    };

    if let Err(err) = result {
        log::warn!("handlers: dispatch failed: {err}");
    }

    writes
}

async fn dispatch_packet(
    state: &mut BrokerState,
    config: &Config,
    event: IoEvent,
    writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    log::debug!(
        "handlers: conn={} client={:?} dispatching {:?}",
        event.conn_id,
        event.client_id,
        std::mem::discriminant(&event.packet)
    );

    if event.client_id.is_none() && !matches!(event.packet, Packet::Connect(_)) {
        log::warn!(
            "handlers: conn={} sent {:?} before CONNECT",
            event.conn_id,
            std::mem::discriminant(&event.packet)
        );
        writes.push(PendingWrite::close(&event.reply_tx));
        return Err(Error::new(
            ErrorKind::ProtocolError,
            "first packet on a connection must be CONNECT",
        ));
    }

    if let Some(client_id) = &event.client_id {
        if let Some(session) = state.sessions.lookup_mut(client_id) {
            session.last_action = std::time::Instant::now();
        }
    }

    match event.packet {
        Packet::Connect(packet) => {
            connect::handle(state, config, &event.reply_tx, packet, writes).await
        }
        Packet::Publish(packet) => {
            let client_id = event.client_id.expect("checked above");
            publish::handle(state, &client_id, &event.reply_tx, packet, writes)
        }
        Packet::PublishAck(packet) => {
            let client_id = event.client_id.expect("checked above");
            publish::handle_ack(state, &client_id, packet.packet_id);
            Ok(())
        }
        Packet::PublishReceived(packet) => {
            let client_id = event.client_id.expect("checked above");
            publish::handle_received(state, &client_id, &event.reply_tx, packet, writes)
        }
        Packet::PublishRelease(packet) => {
            let client_id = event.client_id.expect("checked above");
            publish::handle_release(state, &client_id, &event.reply_tx, packet, writes)
        }
        Packet::PublishComplete(packet) => {
            let client_id = event.client_id.expect("checked above");
            publish::handle_complete(state, &client_id, packet.packet_id);
            Ok(())
        }
        Packet::Subscribe(packet) => {
            let client_id = event.client_id.expect("checked above");
            subscribe::handle(state, &client_id, &event.reply_tx, packet, writes)
        }
        Packet::Unsubscribe(packet) => {
            let client_id = event.client_id.expect("checked above");
            unsubscribe::handle(state, &client_id, &event.reply_tx, packet, writes)
        }
        Packet::PingRequest(_) => ping::handle(&event.reply_tx, writes),
        Packet::Disconnect(_) => {
            let client_id = event.client_id.expect("checked above");
            disconnect::handle(state, &client_id, writes)
        }
        other => {
            log::warn!("handlers: unexpected packet from client at this stage: {other:?}");
            writes.push(PendingWrite::close(&event.reply_tx));
            Err(Error::new(
                ErrorKind::ProtocolError,
                "packet type is not valid from a client",
            ))
        }
    }
}
