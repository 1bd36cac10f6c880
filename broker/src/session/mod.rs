// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Per-client session state: subscriptions, offline queue, inflight tables
//! (spec 3, 4.C).

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use tokio::sync::mpsc;

use codec::{PacketId, PublishPacket, QoS};

use crate::commands::WriterCmd;
use crate::error::{Error, ErrorKind};

/// A sent QoS>0 PUBLISH awaiting acknowledgement, or a PUBREL awaiting
/// PUBCOMP (spec 3: "Inflight message").
#[derive(Debug, Clone)]
pub struct InflightEntry {
    pub packet: PublishPacket,
    pub qos: QoS,
    pub seen: Instant,
}

/// Per-client-id state, created on first CONNECT and reused across
/// reconnects while `clean_session` is false (spec 3, 4.C).
#[derive(Debug)]
pub struct Session {
    pub client_id: String,
    pub clean_session: bool,
    pub online: bool,

    /// Channel to this session's connection writer task, present only
    /// while `online`. Used both to reply directly and to fan a PUBLISH
    /// out from another connection's handler (spec 9: topic lock released
    /// before I/O scheduling).
    pub writer: Option<mpsc::Sender<WriterCmd>>,

    /// Synthesized PUBLISH held from the current connection's CONNECT,
    /// published on an involuntary disconnect (spec 3, 7). Cleared by a
    /// normal DISCONNECT (spec 4.D).
    pub will: Option<PublishPacket>,

    /// Outgoing PUBLISHes accumulated while offline; flushed to the client
    /// on reconnect, in order.
    pub pending: VecDeque<PublishPacket>,

    /// Sent QoS>0 PUBLISHes awaiting PUBACK (QoS 1) or the full PUBREC/
    /// PUBREL/PUBCOMP handshake (QoS 2); cleared at PUBACK or PUBCOMP.
    pub outbound_inflight: HashMap<PacketId, InflightEntry>,

    /// QoS 2 deliveries past PUBLISH: seeded alongside `outbound_inflight`
    /// awaiting this subscriber's PUBREC, then left in place awaiting
    /// PUBCOMP once the broker has replied PUBREL. The PUBREL packet is
    /// reconstructed from the packet-id alone on retransmit, so only a
    /// last-sent timestamp is kept here.
    pub outbound_ack_inflight: HashMap<PacketId, Instant>,

    /// PUBREC sent by this broker for an inbound QoS 2 PUBLISH, awaiting
    /// the peer's PUBREL.
    pub inbound_ack_inflight: HashMap<PacketId, ()>,

    /// Keep-alive interval from the current connection's CONNECT, seconds.
    /// Zero disables the keep-alive timeout (spec 2 "keep-alive timeout...
    /// 1.5 * keep_alive").
    pub keep_alive: u16,

    /// Timestamp of the last packet successfully processed for this
    /// session, updated by every handler dispatch (spec 2).
    pub last_action: Instant,

    next_free_mid: PacketId,
}

impl Session {
    #[must_use]
    fn new(client_id: String, clean_session: bool) -> Self {
        Self {
            client_id,
            clean_session,
            online: true,
            writer: None,
            will: None,
            pending: VecDeque::new(),
            outbound_inflight: HashMap::new(),
            outbound_ack_inflight: HashMap::new(),
            inbound_ack_inflight: HashMap::new(),
            keep_alive: 0,
            last_action: Instant::now(),
            next_free_mid: 1,
        }
    }

    /// Allocate a fresh packet-id by linear scan, skipping the reserved
    /// value 0 and never returning one already occupied in
    /// `outbound_inflight` (spec 4.C, 9 Open Questions).
    ///
    /// # Errors
    /// Returns `NoFreeMid` if every slot in 1..=65535 is occupied.
    pub fn next_free_mid(&mut self) -> Result<PacketId, Error> {
        let start = if self.next_free_mid == 0 {
            1
        } else {
            self.next_free_mid
        };
        let mut candidate = start;
        loop {
            if !self.outbound_inflight.contains_key(&candidate) {
                self.next_free_mid = candidate.wrapping_add(1);
                if self.next_free_mid == 0 {
                    self.next_free_mid = 1;
                }
                return Ok(candidate);
            }
            candidate = candidate.wrapping_add(1);
            if candidate == 0 {
                candidate = 1;
            }
            if candidate == start {
                return Err(Error::new(
                    ErrorKind::NoFreeMid,
                    "no free packet identifiers remain for this session",
                ));
            }
        }
    }
}

/// Hash map client-id → session (spec 4.C).
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for `client_id`. Returns the session and whether a
    /// prior (clean_session=false) session already existed, which feeds
    /// CONNACK's session-present bit (spec 4.D).
    ///
    /// Under `clean_session=true`, any existing session is discarded and
    /// replaced. Under `clean_session=false`, an existing session is
    /// reused (its pending queue and inflight tables carried forward) and
    /// marked online again.
    pub fn open(&mut self, client_id: &str, clean_session: bool) -> (&mut Session, bool) {
        let existed = self.sessions.contains_key(client_id);
        if clean_session || !existed {
            self.sessions.insert(
                client_id.to_string(),
                Session::new(client_id.to_string(), clean_session),
            );
            let session = self
                .sessions
                .get_mut(client_id)
                .expect("just inserted");
            (session, false)
        } else {
            let session = self
                .sessions
                .get_mut(client_id)
                .expect("existed checked above");
            session.online = true;
            session.clean_session = clean_session;
            session.will = None;
            session.last_action = Instant::now();
            (session, true)
        }
    }

    /// Close `client_id`'s session. A clean session is dropped entirely;
    /// otherwise it is marked offline and its queue/inflight tables are
    /// retained for a future reconnect (spec 4.C).
    pub fn close(&mut self, client_id: &str) {
        if let Some(session) = self.sessions.get(client_id) {
            if session.clean_session {
                self.sessions.remove(client_id);
            } else if let Some(session) = self.sessions.get_mut(client_id) {
                session.online = false;
                session.writer = None;
            }
        }
    }

    #[must_use]
    pub fn lookup(&self, client_id: &str) -> Option<&Session> {
        self.sessions.get(client_id)
    }

    #[must_use]
    pub fn lookup_mut(&mut self, client_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(client_id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_session_discards_prior_state() {
        let mut store = SessionStore::new();
        {
            let (session, existed) = store.open("a", false);
            assert!(!existed);
            session
                .pending
                .push_back(PublishPacket::new("q", QoS::AtLeastOnce, b"x".to_vec()));
        }
        store.close("a");
        let (session, existed) = store.open("a", true);
        assert!(!existed);
        assert!(session.pending.is_empty());
    }

    #[test]
    fn persistent_session_survives_disconnect_and_carries_queue() {
        let mut store = SessionStore::new();
        {
            let (session, _) = store.open("a", false);
            session
                .pending
                .push_back(PublishPacket::new("q", QoS::AtLeastOnce, b"x".to_vec()));
        }
        store.close("a");
        assert!(!store.lookup("a").unwrap().online);
        let (session, existed) = store.open("a", false);
        assert!(existed);
        assert_eq!(session.pending.len(), 1);
        assert!(session.online);
    }

    #[test]
    fn next_free_mid_never_returns_zero_or_an_occupied_slot() {
        let mut session = Session::new("a".to_string(), true);
        let first = session.next_free_mid().unwrap();
        assert_ne!(first, 0);
        session.outbound_inflight.insert(
            first,
            InflightEntry {
                packet: PublishPacket::new("t", QoS::AtLeastOnce, Vec::new()),
                qos: QoS::AtLeastOnce,
                seen: Instant::now(),
            },
        );
        let second = session.next_free_mid().unwrap();
        assert_ne!(second, first);
        assert_ne!(second, 0);
    }

    #[test]
    fn next_free_mid_errors_when_table_is_full() {
        let mut session = Session::new("a".to_string(), true);
        for mid in 1..=u16::MAX {
            session.outbound_inflight.insert(
                mid,
                InflightEntry {
                    packet: PublishPacket::new("t", QoS::AtLeastOnce, Vec::new()),
                    qos: QoS::AtLeastOnce,
                    seen: Instant::now(),
                },
            );
        }
        assert!(session.next_free_mid().is_err());
    }
}
