// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Topic trie: holds retained messages and resolves concrete PUBLISH topics
//! against subscribed filters (spec 4.B, 4.C).

use std::collections::HashMap;

use codec::QoS;

/// A retained message installed on an exact topic name by a PUBLISH with
/// the RETAIN flag set (spec 4.D).
#[derive(Debug, Clone)]
pub struct RetainedMessage {
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// One client's subscription to a filter, kept alongside the trie rather
/// than inside it: a filter with wildcards does not correspond to a single
/// trie node, so it cannot be indexed by descent alone.
#[derive(Debug, Clone)]
pub struct WildcardSubscription {
    pub filter: String,
    pub client_id: String,
    pub qos: QoS,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    retained: Option<RetainedMessage>,
    /// Subscriptions on the exact topic name this node represents, i.e.
    /// filters with no wildcard characters.
    subscribers: HashMap<String, QoS>,
}

/// Topic registry: a trie of literal topic levels for exact-match lookups
/// and retained-message storage, plus a flat list of wildcard filters
/// tested with [`codec::topic::matches`] (spec 4.B, 4.C).
///
/// Storing wildcard filters as raw strings rather than decomposed into the
/// trie keeps `matches` as the single source of truth for wildcard
/// semantics, at the cost of an O(subscriptions) scan per PUBLISH — an
/// acceptable trade for a broker without sharding.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    root: TrieNode,
    wildcards: Vec<WildcardSubscription>,
}

impl TopicRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `client_id` subscribes to `filter` at `qos`. Wildcard
    /// filters go to the flat list; literal filters go to their trie node
    /// directly, since that node might not exist yet.
    pub fn subscribe(&mut self, client_id: &str, filter: &str, qos: QoS) {
        if filter.contains(['+', '#']) {
            self.wildcards
                .retain(|sub| !(sub.client_id == client_id && sub.filter == filter));
            self.wildcards.push(WildcardSubscription {
                filter: filter.to_string(),
                client_id: client_id.to_string(),
                qos,
            });
        } else {
            let node = Self::get_or_insert_node(&mut self.root, filter);
            node.subscribers.insert(client_id.to_string(), qos);
        }
    }

    /// Remove `client_id`'s subscription to `filter`, if any.
    pub fn unsubscribe(&mut self, client_id: &str, filter: &str) {
        if filter.contains(['+', '#']) {
            self.wildcards
                .retain(|sub| !(sub.client_id == client_id && sub.filter == filter));
        } else if let Some(node) = Self::find_node_mut(&mut self.root, filter) {
            node.subscribers.remove(client_id);
        }
    }

    /// Remove every subscription held by `client_id`, e.g. on a
    /// clean-session disconnect (spec 4.C).
    pub fn remove_client(&mut self, client_id: &str) {
        self.wildcards.retain(|sub| sub.client_id != client_id);
        Self::remove_client_from_node(&mut self.root, client_id);
    }

    fn remove_client_from_node(node: &mut TrieNode, client_id: &str) {
        node.subscribers.remove(client_id);
        for child in node.children.values_mut() {
            Self::remove_client_from_node(child, client_id);
        }
    }

    /// All `(client_id, qos)` pairs whose subscription (literal or
    /// wildcard) matches `topic`, used to fan out a PUBLISH (spec 4.D).
    #[must_use]
    pub fn matching_subscribers(&self, topic: &str) -> Vec<(String, QoS)> {
        let mut out = Vec::new();
        if let Some(node) = Self::find_node(&self.root, topic) {
            out.extend(
                node.subscribers
                    .iter()
                    .map(|(client_id, qos)| (client_id.clone(), *qos)),
            );
        }
        for sub in &self.wildcards {
            if codec::topic::matches(&sub.filter, topic) {
                out.push((sub.client_id.clone(), sub.qos));
            }
        }
        out
    }

    /// Install (or clear, for an empty payload) the retained message on an
    /// exact topic name (spec 4.D: RETAIN flag handling).
    pub fn set_retained(&mut self, topic: &str, payload: Vec<u8>, qos: QoS) {
        if payload.is_empty() {
            if let Some(node) = Self::find_node_mut(&mut self.root, topic) {
                node.retained = None;
            }
        } else {
            let node = Self::get_or_insert_node(&mut self.root, topic);
            node.retained = Some(RetainedMessage { payload, qos });
        }
    }

    /// All retained messages whose topic matches `filter`, for replay on a
    /// fresh SUBSCRIBE (spec 4.D).
    #[must_use]
    pub fn matching_retained(&self, filter: &str) -> Vec<(String, RetainedMessage)> {
        let mut out = Vec::new();
        Self::collect_retained(&self.root, String::new(), filter, &mut out);
        out
    }

    fn collect_retained(
        node: &TrieNode,
        prefix: String,
        filter: &str,
        out: &mut Vec<(String, RetainedMessage)>,
    ) {
        if let Some(retained) = &node.retained {
            if !prefix.is_empty() && codec::topic::matches(filter, &prefix) {
                out.push((prefix.clone(), retained.clone()));
            }
        }
        for (level, child) in &node.children {
            let child_prefix = if prefix.is_empty() {
                level.clone()
            } else {
                format!("{prefix}/{level}")
            };
            Self::collect_retained(child, child_prefix, filter, out);
        }
    }

    fn get_or_insert_node<'a>(root: &'a mut TrieNode, topic: &str) -> &'a mut TrieNode {
        let mut node = root;
        for level in topic.split('/') {
            node = node.children.entry(level.to_string()).or_default();
        }
        node
    }

    fn find_node<'a>(root: &'a TrieNode, topic: &str) -> Option<&'a TrieNode> {
        let mut node = root;
        for level in topic.split('/') {
            node = node.children.get(level)?;
        }
        Some(node)
    }

    fn find_node_mut<'a>(root: &'a mut TrieNode, topic: &str) -> Option<&'a mut TrieNode> {
        let mut node = root;
        for level in topic.split('/') {
            node = node.children.get_mut(level)?;
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_subscription_matches_exact_topic() {
        let mut registry = TopicRegistry::new();
        registry.subscribe("client-a", "sensors/temp", QoS::AtMostOnce);
        let matches = registry.matching_subscribers("sensors/temp");
        assert_eq!(matches, vec![("client-a".to_string(), QoS::AtMostOnce)]);
        assert!(registry.matching_subscribers("sensors/humidity").is_empty());
    }

    #[test]
    fn wildcard_subscription_matches_multiple_levels() {
        let mut registry = TopicRegistry::new();
        registry.subscribe("client-a", "sensors/#", QoS::AtLeastOnce);
        assert_eq!(registry.matching_subscribers("sensors/temp").len(), 1);
        assert_eq!(registry.matching_subscribers("sensors/temp/kitchen").len(), 1);
    }

    #[test]
    fn unsubscribe_removes_only_the_named_filter() {
        let mut registry = TopicRegistry::new();
        registry.subscribe("client-a", "sensors/temp", QoS::AtMostOnce);
        registry.subscribe("client-a", "sensors/#", QoS::AtMostOnce);
        registry.unsubscribe("client-a", "sensors/temp");
        let matches = registry.matching_subscribers("sensors/temp");
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn retained_message_replays_on_matching_filter() {
        let mut registry = TopicRegistry::new();
        registry.set_retained("sensors/temp", b"21C".to_vec(), QoS::AtLeastOnce);
        let retained = registry.matching_retained("sensors/#");
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].0, "sensors/temp");
        assert_eq!(retained[0].1.payload, b"21C");
    }

    #[test]
    fn empty_payload_clears_retained_message() {
        let mut registry = TopicRegistry::new();
        registry.set_retained("sensors/temp", b"21C".to_vec(), QoS::AtLeastOnce);
        registry.set_retained("sensors/temp", Vec::new(), QoS::AtLeastOnce);
        assert!(registry.matching_retained("sensors/temp").is_empty());
    }

    #[test]
    fn remove_client_drops_literal_and_wildcard_subscriptions() {
        let mut registry = TopicRegistry::new();
        registry.subscribe("client-a", "sensors/temp", QoS::AtMostOnce);
        registry.subscribe("client-a", "sensors/#", QoS::AtMostOnce);
        registry.remove_client("client-a");
        assert!(registry.matching_subscribers("sensors/temp").is_empty());
    }
}
