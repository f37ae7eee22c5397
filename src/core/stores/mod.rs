//! State containers and the single reduction entry point.
//!
//! `Stores::apply` is the only place state changes. It fans each action out
//! to the containers in a fixed order (peers, session, keepalive, inbox) and
//! returns the transport effects the action implies. Cross-container rules,
//! in particular the one-at-a-time connection discipline and the pong to
//! node-id resolution, live here where every container is visible.

pub mod inbox;
pub mod keepalive;
pub mod peers;
pub mod session;

use tracing::debug;

use crate::core::actions::{Action, Effect};
use crate::core::config::SessionConfig;
use crate::core::protocol;
use crate::core::task::Task;
use crate::core::EndpointId;
use inbox::InboxState;
use keepalive::PingState;
use peers::{ConnectionStatus, PeersState};
use session::SessionState;

/// The whole session state tree.
#[derive(Clone, Debug, PartialEq)]
pub struct Stores {
    pub peers: PeersState,
    pub session: SessionState,
    pub keepalive: PingState,
    pub inbox: InboxState,
}

impl Stores {
    pub fn new(config: &SessionConfig, local_uuid: String) -> Self {
        Self {
            peers: PeersState::default(),
            session: SessionState::new(config, local_uuid),
            keepalive: PingState::default(),
            inbox: InboxState::default(),
        }
    }

    /// Apply one action and return the effects it implies.
    ///
    /// `now_millis` is passed in rather than read here so reductions stay
    /// deterministic under test.
    pub fn apply(&mut self, action: &Action, now_millis: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        match action {
            Action::EndpointDiscovered { endpoint_id, name } => {
                self.peers.endpoint_discovered(endpoint_id, name);
                if self.session.auto_connect_on_discover {
                    self.connect_or_enqueue(endpoint_id, &mut effects);
                }
            }
            Action::EndpointLost { endpoint_id } => {
                self.peers.endpoint_lost(endpoint_id);
            }
            Action::ConnectionInitiated { endpoint_id, name } => {
                self.peers.connection_initiated(endpoint_id, name);
                if self.session.auto_accept_connection {
                    effects.push(Effect::AcceptConnection {
                        endpoint_id: endpoint_id.clone(),
                    });
                }
            }
            Action::AcceptRequested { endpoint_id } => {
                if self.peers.contains(endpoint_id) {
                    effects.push(Effect::AcceptConnection {
                        endpoint_id: endpoint_id.clone(),
                    });
                }
            }
            Action::AcceptConnection { endpoint_id, task } => {
                self.peers.accept_task(endpoint_id, task);
            }
            Action::ConnectTo { endpoint_id } => {
                self.connect_or_enqueue(endpoint_id, &mut effects);
            }
            Action::RequestConnection { endpoint_id, task } => {
                self.peers.request_task(endpoint_id, task);
                if task.is_terminal() {
                    self.session.connecting = false;
                    self.start_next_queued(&mut effects);
                }
            }
            Action::ConnectionResult { endpoint_id, task } => {
                let known = self.peers.contains(endpoint_id);
                self.peers.connection_result(endpoint_id, task);
                if known && task.is_success() {
                    // The channel is open: stop burning the radio on scans
                    // and introduce ourselves so the peer can bind our id.
                    effects.push(Effect::StopDiscovery);
                    effects.push(Effect::SendPayload {
                        endpoint_id: endpoint_id.clone(),
                        bytes: protocol::identity_payload(&self.session.local_uuid),
                    });
                }
            }
            Action::IdentityResolved {
                endpoint_id,
                node_id,
            } => {
                self.peers.identity_resolved(endpoint_id, node_id);
            }
            Action::EndpointDisconnected { endpoint_id } => {
                self.peers.endpoint_disconnected(endpoint_id);
            }
            Action::Disconnect { endpoint_id } => {
                if self.peers.contains(endpoint_id) {
                    self.peers.disconnect_requested(endpoint_id);
                    effects.push(Effect::Disconnect {
                        endpoint_id: endpoint_id.clone(),
                    });
                }
            }
            Action::PongRequested { endpoint_id } => {
                effects.push(Effect::SendPayload {
                    endpoint_id: endpoint_id.clone(),
                    bytes: protocol::PONG_MARKER.as_bytes().to_vec(),
                });
            }
            Action::PongReceived { endpoint_id } => {
                // A pong is only meaningful once the identity handshake has
                // bound a node id; otherwise there is no row to settle.
                match self.peers.node_id(endpoint_id).cloned() {
                    Some(node_id) => self.keepalive.pong_received(&node_id, now_millis),
                    None => debug!(
                        event = "pong_without_identity",
                        endpoint_id = %endpoint_id,
                        "Dropping pong from unbound endpoint"
                    ),
                }
            }
            Action::SendPing {
                endpoint_id,
                node_id,
            } => {
                if self.keepalive.ping_sent(node_id, now_millis) {
                    effects.push(Effect::SendPayload {
                        endpoint_id: endpoint_id.clone(),
                        bytes: protocol::PING_MARKER.as_bytes().to_vec(),
                    });
                }
            }
            Action::PayloadReceived { endpoint_id, bytes } => {
                let from = self
                    .peers
                    .record_with_rtt(endpoint_id, &self.keepalive.rtts);
                self.inbox.push(bytes.clone(), from, now_millis);
            }
            Action::MarkPayloadRead { entry_id } => {
                if !self.inbox.mark_read(*entry_id) {
                    debug!(event = "mark_read_unknown_entry", entry_id = %entry_id);
                }
            }
            Action::StartDiscovering => effects.push(Effect::StartDiscovery),
            Action::StopDiscovering => effects.push(Effect::StopDiscovery),
            Action::StartAdvertising => effects.push(Effect::StartAdvertising),
            Action::StopAdvertising => effects.push(Effect::StopAdvertising),
            Action::DiscoveringChanged(on) => self.session.discovering = *on,
            Action::AdvertisingChanged(on) => self.session.advertising = *on,
            Action::SetAutoDiscover(on) => self.session.auto_discover = *on,
            Action::SetKeepalive(on) => self.session.keepalive_enabled = *on,
        }
        effects
    }

    /// One-at-a-time connection discipline: start a request for
    /// `endpoint_id` now, or queue it behind the one already in flight.
    fn connect_or_enqueue(&mut self, endpoint_id: &str, effects: &mut Vec<Effect>) {
        if !self.peers.contains(endpoint_id)
            || self.peers.status(endpoint_id) != ConnectionStatus::Disconnected
        {
            return;
        }
        if self.session.connecting {
            if !self.session.connect_queue.iter().any(|e| e == endpoint_id) {
                self.session.connect_queue.push_back(endpoint_id.to_string());
            }
            return;
        }
        self.begin_request(endpoint_id.to_string(), effects);
    }

    /// After a request finishes, promote the next still-eligible queued
    /// endpoint. Entries that connected or vanished meanwhile are skipped.
    fn start_next_queued(&mut self, effects: &mut Vec<Effect>) {
        while let Some(next) = self.session.connect_queue.pop_front() {
            if self.peers.contains(&next)
                && self.peers.status(&next) == ConnectionStatus::Disconnected
            {
                self.begin_request(next, effects);
                return;
            }
        }
    }

    fn begin_request(&mut self, endpoint_id: EndpointId, effects: &mut Vec<Effect>) {
        self.session.connecting = true;
        self.peers.request_task(&endpoint_id, &Task::Running);
        effects.push(Effect::RequestConnection { endpoint_id });
    }
}
