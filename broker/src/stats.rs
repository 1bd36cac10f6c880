// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Broker-wide counters published periodically under `$SYS/...` (spec 6).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use codec::{PublishPacket, QoS};

/// Running counters for the periodic `$SYS` publisher (spec 3 "Broker",
/// spec 6). Atomics let connection tasks record bytes/messages without
/// taking the broker's state lock, which guards the topic registry and
/// session map, not these counters.
#[derive(Debug, Default)]
pub struct Stats {
    connected_clients: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
}

impl Stats {
    pub fn client_connected(&self) {
        self.connected_clients.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_disconnected(&self) {
        self.connected_clients.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_bytes_sent(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_bytes_received(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Render the current counters as the `$SYS/broker/...` PUBLISH set
    /// (spec 6), given the broker's `started_at` instant.
    #[must_use]
    pub fn to_publishes(&self, started_at: Instant) -> Vec<PublishPacket> {
        let uptime = started_at.elapsed().as_secs();
        let memory_used = memory_used_bytes();
        [
            ("$SYS/broker/uptime", uptime.to_string()),
            (
                "$SYS/broker/clients/connected",
                self.connected_clients.load(Ordering::Relaxed).to_string(),
            ),
            (
                "$SYS/broker/bytes/sent",
                self.bytes_sent.load(Ordering::Relaxed).to_string(),
            ),
            (
                "$SYS/broker/bytes/received",
                self.bytes_received.load(Ordering::Relaxed).to_string(),
            ),
            (
                "$SYS/broker/messages/sent",
                self.messages_sent.load(Ordering::Relaxed).to_string(),
            ),
            (
                "$SYS/broker/messages/received",
                self.messages_received.load(Ordering::Relaxed).to_string(),
            ),
            ("$SYS/broker/memory/used", memory_used.to_string()),
        ]
        .into_iter()
        .map(|(topic, payload)| PublishPacket::new(topic, QoS::AtMostOnce, payload.into_bytes()))
        .collect()
    }
}

/// Process resident memory, read from `/proc/self/status`. Returns 0 if
/// unavailable (e.g. non-Linux), matching spec 6's best-effort metric.
fn memory_used_bytes() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| {
            status.lines().find_map(|line| {
                line.strip_prefix("VmRSS:").map(|rest| {
                    rest.trim()
                        .trim_end_matches(" kB")
                        .parse::<u64>()
                        .unwrap_or(0)
                        * 1024
                })
            })
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_publishes_emits_one_packet_per_sys_topic() {
        let stats = Stats::default();
        stats.client_connected();
        stats.client_connected();
        stats.client_connected();
        let packets = stats.to_publishes(Instant::now());
        assert_eq!(packets.len(), 7);
        assert!(packets
            .iter()
            .any(|p| p.topic == "$SYS/broker/clients/connected" && p.payload == b"3"));
    }

    #[test]
    fn counters_accumulate() {
        let stats = Stats::default();
        stats.record_bytes_sent(10);
        stats.record_bytes_sent(5);
        stats.record_message_received();
        let packets = stats.to_publishes(Instant::now());
        assert!(packets
            .iter()
            .any(|p| p.topic == "$SYS/broker/bytes/sent" && p.payload == b"15"));
        assert!(packets
            .iter()
            .any(|p| p.topic == "$SYS/broker/messages/received" && p.payload == b"1"));
    }
}
