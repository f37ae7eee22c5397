//! Keepalive bookkeeping, keyed by durable node id.
//!
//! Ping state outlives endpoint churn on purpose: a peer that drops and
//! reconnects under a fresh endpoint id keeps its last known round trip.
//! At most one ping per node is outstanding; while one is in flight,
//! further send attempts are suppressed.

use std::collections::HashMap;

use crate::core::task::Task;
use crate::core::NodeId;

/// Round-trip tracking for every node we have ever pinged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PingState {
    /// Latest measured round trip per node, in milliseconds.
    pub rtts: HashMap<NodeId, u64>,
    /// Wall-clock send instant of the ping in flight per node, consumed
    /// when its pong arrives.
    pub sent_at: HashMap<NodeId, u64>,
    /// Lifecycle of the most recent ping per node.
    pub tasks: HashMap<NodeId, Task>,
}

impl PingState {
    /// Whether a ping to `node_id` is in flight.
    pub fn is_outstanding(&self, node_id: &str) -> bool {
        self.tasks
            .get(node_id)
            .map(Task::is_running)
            .unwrap_or(false)
    }

    pub fn rtt(&self, node_id: &str) -> Option<u64> {
        self.rtts.get(node_id).copied()
    }

    /// Record a ping about to be sent. Returns `false`, recording nothing,
    /// if one is already outstanding; the caller must then drop the send.
    pub fn ping_sent(&mut self, node_id: &str, now_millis: u64) -> bool {
        if self.is_outstanding(node_id) {
            return false;
        }
        self.sent_at.insert(node_id.to_string(), now_millis);
        self.tasks.insert(node_id.to_string(), Task::Running);
        true
    }

    /// Record a pong. The round trip is `now - send instant`, or zero if no
    /// send instant was recorded (an unsolicited or duplicate pong).
    ///
    /// The send instant is consumed on receipt, so a second pong for the
    /// same exchange has nothing to measure against and records zero.
    pub fn pong_received(&mut self, node_id: &str, now_millis: u64) {
        let sent = self.sent_at.remove(node_id).unwrap_or(now_millis);
        self.rtts
            .insert(node_id.to_string(), now_millis.saturating_sub(sent));
        self.tasks.insert(node_id.to_string(), Task::done());
    }
}
