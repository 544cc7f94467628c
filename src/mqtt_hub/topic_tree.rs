// MIT License
//
// Copyright (c) 2025 Takatoshi Kondo
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Hierarchical subscription index.
//!
//! Topic filters are stored as a tree keyed by `/`-split levels. Wildcard
//! levels (`+` for one level, `#` for the rest) are stored as literal node
//! labels but interpreted at lookup time, so a concrete publish topic never
//! matches them by string equality.
//!
//! The tree is owned exclusively by the broker's routing loop and needs no
//! locking; connections refer to their subscriptions through opaque
//! [`SubscriptionId`] handles and request changes over the broker's command
//! channel.

use std::collections::HashMap;

use crate::mqtt_hub::connection::DeliverySink;
use crate::mqtt_hub::message::QoS;

/// Stable handle to a subscription record owned by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A subscription record. Lives in exactly one topic node's list; the path
/// of labels from the root to that node is the subscriber's filter.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    /// QoS granted in the SUBACK; caps outbound delivery for this entry.
    pub qos: QoS,
    /// Outbound channel of the owning connection.
    pub sink: DeliverySink,
}

#[derive(Debug, Default)]
struct TopicNode {
    children: HashMap<String, TopicNode>,
    subscriptions: Vec<Subscription>,
}

/// The broker's subscription index.
#[derive(Debug, Default)]
pub struct TopicTree {
    root: TopicNode,
    /// Filter each live subscription was registered under, for unlinking.
    filters: HashMap<SubscriptionId, String>,
    next_id: u64,
}

impl TopicTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscription under `filter`, creating intermediate nodes as
    /// needed, and return its handle.
    pub fn subscribe(&mut self, filter: &str, qos: QoS, sink: DeliverySink) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let mut node = &mut self.root;
        for level in filter.split('/') {
            node = node.children.entry(level.to_string()).or_default();
        }
        node.subscriptions.push(Subscription { id, qos, sink });
        self.filters.insert(id, filter.to_string());
        id
    }

    /// Remove the subscription behind `id`. Empty nodes are left in place;
    /// filter cardinality is bounded by application design and pruning would
    /// complicate the walk for no measurable gain at this scale.
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        let Some(filter) = self.filters.remove(&id) else {
            return;
        };
        let mut node = &mut self.root;
        for level in filter.split('/') {
            match node.children.get_mut(level) {
                Some(child) => node = child,
                None => return,
            }
        }
        node.subscriptions.retain(|sub| sub.id != id);
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Collect the delivery targets for a concrete publish topic.
    ///
    /// The walk visits every node whose label equals the current topic level
    /// or is `+`; at any visited node, subscriptions under a `#` child also
    /// match (covering the parent level itself and all deeper levels).
    pub fn collect_matches(&self, topic: &str) -> Vec<(DeliverySink, QoS)> {
        let levels: Vec<&str> = topic.split('/').collect();
        let mut out = Vec::new();
        Self::walk(&self.root, &levels, &mut out);
        out
    }

    fn walk(node: &TopicNode, levels: &[&str], out: &mut Vec<(DeliverySink, QoS)>) {
        if let Some(rest) = node.children.get("#") {
            for sub in &rest.subscriptions {
                out.push((sub.sink.clone(), sub.qos));
            }
        }
        let Some((level, remaining)) = levels.split_first() else {
            for sub in &node.subscriptions {
                out.push((sub.sink.clone(), sub.qos));
            }
            return;
        };
        if let Some(child) = node.children.get(*level) {
            Self::walk(child, remaining, out);
        }
        if let Some(child) = node.children.get("+") {
            Self::walk(child, remaining, out);
        }
    }

    /// Subscriptions registered exactly at `path` (no wildcard expansion).
    /// Used for the `$SYS/all` firehose and the shutdown close-out.
    pub fn subscriptions_at(&self, path: &[&str]) -> &[Subscription] {
        let mut node = &self.root;
        for level in path {
            match node.children.get(*level) {
                Some(child) => node = child,
                None => return &[],
            }
        }
        &node.subscriptions
    }
}
