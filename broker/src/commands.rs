// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::net::SocketAddr;
use tokio::sync::mpsc;

use codec::Packet;

/// Commands sent to a connection's writer task. A connection task owns
/// exactly one `mpsc::Receiver<WriterCmd>` and drains it in order, so this
/// is also the channel used to fan a PUBLISH out to other subscribers
/// (spec 4.D: "release the topic lock before scheduling I/O").
#[derive(Debug)]
pub enum WriterCmd {
    /// Attach a `client_id` to this connection, issued once CONNECT has been
    /// accepted. Lets the writer task report itself under a stable name in
    /// logs and metrics.
    Bind(String),

    /// Write an already-encoded packet to the socket.
    Write(Vec<u8>),

    /// Close the connection after flushing any queued writes.
    Close,
}

/// An inbound packet handed from a connection's read loop to the worker
/// pool, carrying enough context for a handler to reply or to resolve the
/// session (spec 9: IO stage decodes, worker stage dispatches).
#[derive(Debug)]
pub struct IoEvent {
    pub conn_id: u64,
    pub client_id: Option<String>,
    pub packet: Packet,
    pub reply_tx: mpsc::Sender<WriterCmd>,
    pub peer_addr: SocketAddr,
}

/// Work item posted onto the shared queue the worker pool drains (spec 4.E
/// "worker loop"). `Closed` covers teardown paths that never produced a
/// decoded packet: a transport error, a framing/size violation, or the
/// client simply going away, all of which still need to run under the
/// broker's lock to publish a will and release subscriptions.
#[derive(Debug)]
pub enum WorkItem {
    Packet(IoEvent),
    Closed {
        conn_id: u64,
        client_id: Option<String>,
        /// True for anything other than a graceful DISCONNECT: transport
        /// failure, protocol error, or a takeover by a new CONNECT. Drives
        /// the will-publication rule (spec 7).
        involuntary: bool,
    },
}
