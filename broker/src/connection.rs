// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Per-connection I/O task: decodes framed packets off a socket and posts
//! them to the shared worker queue, and drains its own `WriterCmd` channel
//! back onto the socket (spec 4.E "IO stage").

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use codec::Packet;

use crate::commands::{IoEvent, WorkItem, WriterCmd};
use crate::config::Config;
use crate::stats::Stats;

const READ_CHUNK: usize = 4096;
const WRITER_CHANNEL_CAPACITY: usize = 64;

/// Own one accepted socket for its whole lifetime: read and decode packets,
/// handing each to the worker pool, while a paired `WriterCmd` channel lets
/// any worker (this connection's own handler, or another subscriber's
/// fan-out) schedule writes back onto it (spec 9).
pub async fn run(
    conn_id: u64,
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<Config>,
    stats: Arc<Stats>,
    queue_tx: mpsc::Sender<WorkItem>,
) {
    let (mut read_half, mut write_half) = socket.into_split();
    let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCmd>(WRITER_CHANNEL_CAPACITY);

    let mut client_id: Option<String> = None;
    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];
    let max_request_size = config.general().max_request_size();

    let involuntary = loop {
        tokio::select! {
            result = read_half.read(&mut chunk) => {
                match result {
                    Ok(0) => {
                        log::debug!("connection {conn_id}: peer {peer_addr} closed");
                        break true;
                    }
                    Ok(n) => {
                        stats.record_bytes_received(n as u64);
                        buf.extend_from_slice(&chunk[..n]);
                    }
                    Err(err) => {
                        log::warn!("connection {conn_id}: read error from {peer_addr}: {err}");
                        break true;
                    }
                }
            }

            cmd = writer_rx.recv() => {
                match cmd {
                    Some(WriterCmd::Bind(id)) => {
                        client_id = Some(id);
                    }
                    Some(WriterCmd::Write(bytes)) => {
                        if let Err(err) = write_half.write_all(&bytes).await {
                            log::warn!("connection {conn_id}: write error to {peer_addr}: {err}");
                            break true;
                        }
                        stats.record_bytes_sent(bytes.len() as u64);
                    }
                    Some(WriterCmd::Close) | None => {
                        let _ = write_half.shutdown().await;
                        break false;
                    }
                }
            }
        }

        if buf.len() > max_request_size {
            log::warn!(
                "connection {conn_id}: buffered {} bytes exceeds max_request_size {}, closing",
                buf.len(),
                max_request_size
            );
            break true;
        }

        match drain_packets(&buf, conn_id, &client_id, &peer_addr, &writer_tx, &queue_tx).await {
            Ok(consumed) => {
                if consumed > 0 {
                    buf.drain(..consumed);
                }
            }
            Err(()) => break true,
        }
    };

    let _ = queue_tx
        .send(WorkItem::Closed {
            conn_id,
            client_id,
            involuntary,
        })
        .await;
}

/// Decode every complete packet currently buffered, posting each to the
/// worker queue, and return how many bytes were consumed. A malformed
/// packet is treated as a protocol error and reported by returning `Err`.
async fn drain_packets(
    buf: &[u8],
    conn_id: u64,
    client_id: &Option<String>,
    peer_addr: &SocketAddr,
    reply_tx: &mpsc::Sender<WriterCmd>,
    queue_tx: &mpsc::Sender<WorkItem>,
) -> Result<usize, ()> {
    let mut offset = 0;
    loop {
        let Some(total_len) = codec::peek_total_len(&buf[offset..]) else {
            break;
        };
        if buf[offset..].len() < total_len {
            break;
        }
        match Packet::decode(&buf[offset..]) {
            Ok((packet, consumed)) => {
                offset += consumed;
                let event = IoEvent {
                    conn_id,
                    client_id: client_id.clone(),
                    packet,
                    reply_tx: reply_tx.clone(),
                    peer_addr: *peer_addr,
                };
                if queue_tx.send(WorkItem::Packet(event)).await.is_err() {
                    log::warn!("connection {conn_id}: worker queue closed, dropping packet");
                    return Err(());
                }
            }
            Err(err) => {
                log::warn!("connection {conn_id}: decode error from {peer_addr}: {err:?}");
                return Err(());
            }
        }
    }
    Ok(offset)
}
