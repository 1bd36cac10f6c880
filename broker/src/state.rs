// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The broker's aggregate mutable state, guarded by a single lock (spec 3
//! "Broker", spec 5, spec 9 "Global spinlock").

use std::sync::Arc;
use std::time::Instant;

use crate::auth::AuthManager;
use crate::session::SessionStore;
use crate::stats::Stats;
use crate::topic::TopicRegistry;

/// Everything a packet handler needs exclusive access to. A single
/// `tokio::sync::Mutex<BrokerState>` stands in for the source's
/// process-wide spinlock (spec 5, 9): every handler call holds the lock
/// for its whole critical section and releases it before any I/O is
/// scheduled.
pub struct BrokerState {
    pub topics: TopicRegistry,
    pub sessions: SessionStore,
    pub auth: AuthManager,
    /// Shared with every connection task so that byte/message counters can
    /// be recorded without taking this struct's own lock (spec 6).
    pub stats: Arc<Stats>,
    pub started_at: Instant,
    next_conn_id: u64,
}

impl BrokerState {
    #[must_use]
    pub fn new(auth: AuthManager, stats: Arc<Stats>) -> Self {
        Self {
            topics: TopicRegistry::new(),
            sessions: SessionStore::new(),
            auth,
            stats,
            started_at: Instant::now(),
            next_conn_id: 1,
        }
    }

    pub fn next_conn_id(&mut self) -> u64 {
        let id = self.next_conn_id;
        self.next_conn_id = self.next_conn_id.wrapping_add(1);
        id
    }
}
