//! Peer directory: everything known about nearby endpoints.
//!
//! State is denormalized into per-attribute maps keyed by endpoint id, so a
//! transport callback that touches one attribute rewrites one map entry.
//! Records materialize only through discovery or an incoming connection;
//! every other reducer is a no-op for an unknown endpoint, which keeps late
//! callbacks for vanished endpoints from resurrecting ghosts.

use std::collections::HashMap;

use crate::core::task::Task;
use crate::core::{EndpointId, NodeId};

/// Connection lifecycle of one endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    /// Negotiation in progress, or negotiated but identity not yet resolved.
    Connecting,
    /// Identity resolved; the payload channel is trusted.
    Connected,
    Disconnecting,
}

/// Denormalized peer attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeersState {
    pub names: HashMap<EndpointId, String>,
    pub node_ids: HashMap<EndpointId, NodeId>,
    pub in_sight: HashMap<EndpointId, bool>,
    pub statuses: HashMap<EndpointId, ConnectionStatus>,
}

/// Joined view of one peer, assembled on demand.
#[derive(Clone, Debug, PartialEq)]
pub struct PeerRecord {
    pub endpoint_id: EndpointId,
    pub node_id: Option<NodeId>,
    pub name: String,
    pub in_sight: bool,
    pub status: ConnectionStatus,
    /// Latest measured round trip, if a pong ever came back.
    pub rtt_millis: Option<u64>,
}

impl PeersState {
    /// Whether `endpoint_id` has been materialized.
    pub fn contains(&self, endpoint_id: &str) -> bool {
        self.in_sight.contains_key(endpoint_id) && self.statuses.contains_key(endpoint_id)
    }

    pub fn status(&self, endpoint_id: &str) -> ConnectionStatus {
        self.statuses.get(endpoint_id).copied().unwrap_or_default()
    }

    pub fn node_id(&self, endpoint_id: &str) -> Option<&NodeId> {
        self.node_ids.get(endpoint_id)
    }

    /// Reverse lookup: the endpoint currently bound to `node_id`.
    pub fn endpoint_of(&self, node_id: &str) -> Option<EndpointId> {
        self.node_ids
            .iter()
            .find(|(_, id)| id.as_str() == node_id)
            .map(|(ep, _)| ep.clone())
    }

    /// Endpoints visible right now with no connection underway: everything
    /// a bulk connect should reach for.
    pub fn connectable_endpoints(&self) -> Vec<EndpointId> {
        let mut out: Vec<EndpointId> = self
            .statuses
            .iter()
            .filter(|(ep, s)| {
                **s == ConnectionStatus::Disconnected
                    && self.in_sight.get(ep.as_str()).copied().unwrap_or(false)
            })
            .map(|(ep, _)| ep.clone())
            .collect();
        out.sort();
        out
    }

    /// Endpoints whose payload channel is fully established.
    pub fn connected_endpoints(&self) -> Vec<EndpointId> {
        self.statuses
            .iter()
            .filter(|(_, s)| **s == ConnectionStatus::Connected)
            .map(|(ep, _)| ep.clone())
            .collect()
    }

    /// Assemble the joined view of one endpoint, with the round trip looked
    /// up from the keepalive tracker's table.
    pub fn record_with_rtt(
        &self,
        endpoint_id: &str,
        rtts: &HashMap<NodeId, u64>,
    ) -> PeerRecord {
        let node_id = self.node_ids.get(endpoint_id).cloned();
        let rtt_millis = node_id.as_ref().and_then(|id| rtts.get(id)).copied();
        PeerRecord {
            endpoint_id: endpoint_id.to_string(),
            node_id,
            name: self
                .names
                .get(endpoint_id)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            in_sight: self.in_sight.get(endpoint_id).copied().unwrap_or(false),
            status: self.status(endpoint_id),
            rtt_millis,
        }
    }

    /// Joined views of every materialized endpoint.
    pub fn records(&self, rtts: &HashMap<NodeId, u64>) -> Vec<PeerRecord> {
        let mut out: Vec<PeerRecord> = self
            .statuses
            .keys()
            .map(|ep| self.record_with_rtt(ep, rtts))
            .collect();
        out.sort_by(|a, b| a.endpoint_id.cmp(&b.endpoint_id));
        out
    }

    // ── Reducers ─────────────────────────────────────────────────────────────

    /// A scanner saw `endpoint_id`. Materializes the record; an endpoint
    /// rediscovered mid-negotiation keeps its current status.
    pub fn endpoint_discovered(&mut self, endpoint_id: &str, name: &str) {
        self.names
            .insert(endpoint_id.to_string(), name.to_string());
        self.in_sight.insert(endpoint_id.to_string(), true);
        self.statuses
            .entry(endpoint_id.to_string())
            .or_insert(ConnectionStatus::Disconnected);
    }

    /// `endpoint_id` went out of range. No-op for unknown endpoints.
    pub fn endpoint_lost(&mut self, endpoint_id: &str) {
        if !self.contains(endpoint_id) {
            return;
        }
        self.in_sight.insert(endpoint_id.to_string(), false);
        self.statuses
            .insert(endpoint_id.to_string(), ConnectionStatus::Disconnected);
    }

    /// A remote peer opened a negotiation towards us. Materializes the
    /// record, since the remote may connect without us ever discovering it.
    pub fn connection_initiated(&mut self, endpoint_id: &str, name: &str) {
        self.names
            .insert(endpoint_id.to_string(), name.to_string());
        self.in_sight.insert(endpoint_id.to_string(), true);
        self.statuses
            .entry(endpoint_id.to_string())
            .or_insert(ConnectionStatus::Disconnected);
    }

    /// Progress of our accept call for an incoming negotiation.
    pub fn accept_task(&mut self, endpoint_id: &str, task: &Task) {
        if !self.contains(endpoint_id) {
            return;
        }
        match task {
            Task::Idle | Task::Running => {}
            Task::Success(()) => {
                self.statuses
                    .insert(endpoint_id.to_string(), ConnectionStatus::Connecting);
            }
            Task::Error(_) => {
                self.statuses
                    .insert(endpoint_id.to_string(), ConnectionStatus::Disconnected);
            }
        }
    }

    /// Progress of our outgoing connection request.
    pub fn request_task(&mut self, endpoint_id: &str, task: &Task) {
        if !self.contains(endpoint_id) {
            return;
        }
        let status = match task {
            Task::Error(_) => ConnectionStatus::Disconnected,
            _ => ConnectionStatus::Connecting,
        };
        self.statuses.insert(endpoint_id.to_string(), status);
    }

    /// The transport reported the negotiation outcome. Success keeps the
    /// endpoint at `Connecting`: only a resolved identity promotes it.
    pub fn connection_result(&mut self, endpoint_id: &str, task: &Task) {
        if !self.contains(endpoint_id) {
            return;
        }
        let status = match task {
            Task::Error(_) => ConnectionStatus::Disconnected,
            _ => ConnectionStatus::Connecting,
        };
        self.statuses.insert(endpoint_id.to_string(), status);
    }

    /// The identity handshake arrived: bind the durable node id and promote
    /// the endpoint to `Connected`.
    pub fn identity_resolved(&mut self, endpoint_id: &str, node_id: &str) {
        if !self.contains(endpoint_id) {
            return;
        }
        self.node_ids
            .insert(endpoint_id.to_string(), node_id.to_string());
        self.statuses
            .insert(endpoint_id.to_string(), ConnectionStatus::Connected);
    }

    /// A local disconnect was requested.
    pub fn disconnect_requested(&mut self, endpoint_id: &str) {
        if !self.contains(endpoint_id) {
            return;
        }
        self.statuses
            .insert(endpoint_id.to_string(), ConnectionStatus::Disconnecting);
    }

    /// The transport reported the connection gone.
    pub fn endpoint_disconnected(&mut self, endpoint_id: &str) {
        if !self.contains(endpoint_id) {
            return;
        }
        self.statuses
            .insert(endpoint_id.to_string(), ConnectionStatus::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_endpoint_events_are_noops() {
        let mut peers = PeersState::default();
        peers.endpoint_lost("ghost");
        peers.identity_resolved("ghost", "some-uuid");
        peers.connection_result("ghost", &Task::done());
        peers.endpoint_disconnected("ghost");
        assert_eq!(peers, PeersState::default());
    }

    #[test]
    fn test_discovery_materializes_disconnected() {
        let mut peers = PeersState::default();
        peers.endpoint_discovered("ep1", "alice");
        assert!(peers.contains("ep1"));
        assert_eq!(peers.status("ep1"), ConnectionStatus::Disconnected);
        assert_eq!(peers.in_sight.get("ep1"), Some(&true));
    }

    #[test]
    fn test_rediscovery_keeps_negotiation_status() {
        let mut peers = PeersState::default();
        peers.endpoint_discovered("ep1", "alice");
        peers.request_task("ep1", &Task::Running);
        assert_eq!(peers.status("ep1"), ConnectionStatus::Connecting);
        peers.endpoint_discovered("ep1", "alice");
        assert_eq!(peers.status("ep1"), ConnectionStatus::Connecting);
    }

    #[test]
    fn test_connection_result_success_stays_connecting() {
        let mut peers = PeersState::default();
        peers.endpoint_discovered("ep1", "alice");
        peers.request_task("ep1", &Task::Running);
        peers.connection_result("ep1", &Task::done());
        assert_eq!(peers.status("ep1"), ConnectionStatus::Connecting);
    }

    #[test]
    fn test_identity_promotes_to_connected() {
        let mut peers = PeersState::default();
        peers.endpoint_discovered("ep1", "alice");
        peers.connection_result("ep1", &Task::done());
        peers.identity_resolved("ep1", "uuid-1");
        assert_eq!(peers.status("ep1"), ConnectionStatus::Connected);
        assert_eq!(peers.node_id("ep1"), Some(&"uuid-1".to_string()));
        assert_eq!(peers.endpoint_of("uuid-1"), Some("ep1".to_string()));
    }

    #[test]
    fn test_lost_resets_but_keeps_record() {
        let mut peers = PeersState::default();
        peers.endpoint_discovered("ep1", "alice");
        peers.identity_resolved("ep1", "uuid-1");
        peers.endpoint_lost("ep1");
        assert!(peers.contains("ep1"));
        assert_eq!(peers.status("ep1"), ConnectionStatus::Disconnected);
        assert_eq!(peers.in_sight.get("ep1"), Some(&false));
        // Identity binding survives for a later reconnect.
        assert_eq!(peers.node_id("ep1"), Some(&"uuid-1".to_string()));
    }

    #[test]
    fn test_request_error_resets_to_disconnected() {
        let mut peers = PeersState::default();
        peers.endpoint_discovered("ep1", "alice");
        peers.request_task("ep1", &Task::Running);
        peers.request_task("ep1", &Task::failed("rejected"));
        assert_eq!(peers.status("ep1"), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_connectable_excludes_lost_and_engaged_endpoints() {
        let mut peers = PeersState::default();
        peers.endpoint_discovered("ep1", "alice");
        peers.endpoint_discovered("ep2", "bob");
        peers.endpoint_discovered("ep3", "carol");
        peers.endpoint_discovered("ep4", "dave");

        peers.endpoint_lost("ep2");
        peers.request_task("ep3", &Task::Running);
        peers.identity_resolved("ep4", "uuid-4");

        assert_eq!(peers.connectable_endpoints(), vec!["ep1".to_string()]);
    }

    #[test]
    fn test_record_joins_rtt_through_node_id() {
        let mut peers = PeersState::default();
        peers.endpoint_discovered("ep1", "alice");
        peers.identity_resolved("ep1", "uuid-1");
        let mut rtts = HashMap::new();
        rtts.insert("uuid-1".to_string(), 37u64);
        let rec = peers.record_with_rtt("ep1", &rtts);
        assert_eq!(rec.rtt_millis, Some(37));
        assert_eq!(rec.name, "alice");
        assert_eq!(rec.status, ConnectionStatus::Connected);
    }
}
