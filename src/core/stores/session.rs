//! Local session state: who we are and what the radios are doing.

use std::collections::VecDeque;

use crate::core::config::SessionConfig;
use crate::core::{EndpointId, NodeId};
use crate::transport::Strategy;

/// Everything about the local side of the session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionState {
    /// Whether the transport confirmed advertising is running.
    pub advertising: bool,
    /// Whether the transport confirmed discovery is running.
    pub discovering: bool,
    pub local_name: String,
    /// Our durable node id, sent in the identity handshake.
    pub local_uuid: NodeId,
    pub service_id: String,
    pub strategy: Strategy,
    pub auto_discover: bool,
    pub auto_connect_on_discover: bool,
    pub auto_accept_connection: bool,
    pub keepalive_enabled: bool,
    /// A connection request is currently in flight.
    pub connecting: bool,
    /// Endpoints waiting their turn; at most one request is in flight.
    pub connect_queue: VecDeque<EndpointId>,
}

impl SessionState {
    pub fn new(config: &SessionConfig, local_uuid: NodeId) -> Self {
        Self {
            advertising: false,
            discovering: false,
            local_name: config.name.clone(),
            local_uuid,
            service_id: config.service_id.clone(),
            strategy: config.strategy,
            auto_discover: config.auto_discover,
            auto_connect_on_discover: config.auto_connect_on_discover,
            auto_accept_connection: config.auto_accept_connection,
            keepalive_enabled: config.keepalive,
            connecting: false,
            connect_queue: VecDeque::new(),
        }
    }
}
