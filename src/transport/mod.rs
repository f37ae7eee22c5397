//! Abstract transport boundary.
//!
//! The session core never talks to radio hardware directly. An adapter
//! implements [`Transport`] (commands flowing down) and pushes
//! [`TransportEvent`]s into the session's event channel (callbacks flowing
//! up). Events may arrive in any order and on any task; the dispatcher
//! serializes them before they touch state.
//!
//! Endpoint ids are transport-assigned and ephemeral: the same physical
//! device gets a fresh id on every discovery round. Durable identity is
//! established later by the in-band UUID handshake.

use anyhow::Result;
use async_trait::async_trait;

use crate::core::EndpointId;

/// Topology hint passed through to the underlying mesh transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// M-to-N: every node may hold many connections.
    #[default]
    Cluster,
    /// 1-to-N: a single hub, many spokes.
    Star,
    /// 1-to-1 links only.
    PointToPoint,
}

/// Outcome code of a connection negotiation, as reported by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionCode {
    /// Both sides accepted; a payload channel is open.
    Ok,
    /// The remote side declined.
    Rejected,
    /// The link failed before the negotiation finished.
    Error,
}

/// Asynchronous callbacks from the transport adapter.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// A nearby endpoint advertising the same service id became visible.
    EndpointDiscovered {
        endpoint_id: EndpointId,
        name: String,
    },
    /// A previously visible endpoint went out of range.
    EndpointLost { endpoint_id: EndpointId },
    /// A remote peer initiated a connection towards us.
    ConnectionInitiated {
        endpoint_id: EndpointId,
        remote_name: String,
    },
    /// A negotiation we participated in finished.
    ConnectionResult {
        endpoint_id: EndpointId,
        code: ConnectionCode,
    },
    /// An established connection dropped.
    Disconnected { endpoint_id: EndpointId },
    /// Raw bytes arrived on an established connection.
    PayloadReceived {
        endpoint_id: EndpointId,
        bytes: Vec<u8>,
    },
}

/// Commands the session core issues to the transport adapter.
///
/// Implementations must be safe to call from multiple tasks; the dispatcher
/// spawns one task per effect and never awaits a transport call inline.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin scanning for endpoints advertising `service_id`.
    async fn start_discovery(&self, service_id: &str, strategy: Strategy) -> Result<()>;

    /// Stop scanning.
    async fn stop_discovery(&self) -> Result<()>;

    /// Make this node visible to scanners under `name`.
    async fn start_advertising(&self, name: &str, service_id: &str, strategy: Strategy)
        -> Result<()>;

    /// Stop advertising.
    async fn stop_advertising(&self) -> Result<()>;

    /// Ask `endpoint_id` to open a connection; the outcome arrives later as
    /// a [`TransportEvent::ConnectionResult`].
    async fn request_connection(&self, endpoint_id: &str, local_name: &str) -> Result<()>;

    /// Accept a connection the remote side initiated.
    async fn accept_connection(&self, endpoint_id: &str) -> Result<()>;

    /// Tear down an established connection.
    async fn disconnect(&self, endpoint_id: &str) -> Result<()>;

    /// Send raw bytes to one connected endpoint.
    async fn send_payload(&self, endpoint_id: &str, bytes: Vec<u8>) -> Result<()>;

    /// Send the same bytes to several connected endpoints.
    async fn send_payload_to_many(&self, endpoint_ids: &[EndpointId], bytes: Vec<u8>)
        -> Result<()>;
}
