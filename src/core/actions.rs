//! Actions and effects: the dispatcher's entire vocabulary.
//!
//! An [`Action`] is the only way state changes; an [`Effect`] is the only
//! way state reaches the transport. Reducers compute effects, the
//! dispatcher executes them, and completions re-enter the queue as new
//! actions.

use uuid::Uuid;

use crate::core::task::Task;
use crate::core::{EndpointId, NodeId};

/// One unit of input to the serialized dispatcher.
///
/// Transport callbacks, user commands and effect completions all arrive
/// through this one type; nothing mutates state outside `Stores::apply`.
#[derive(Clone, Debug)]
pub enum Action {
    // Transport callbacks.
    EndpointDiscovered {
        endpoint_id: EndpointId,
        name: String,
    },
    EndpointLost {
        endpoint_id: EndpointId,
    },
    ConnectionInitiated {
        endpoint_id: EndpointId,
        name: String,
    },
    ConnectionResult {
        endpoint_id: EndpointId,
        task: Task,
    },
    EndpointDisconnected {
        endpoint_id: EndpointId,
    },
    PongRequested {
        endpoint_id: EndpointId,
    },
    PongReceived {
        endpoint_id: EndpointId,
    },
    IdentityResolved {
        endpoint_id: EndpointId,
        node_id: NodeId,
    },
    PayloadReceived {
        endpoint_id: EndpointId,
        bytes: Vec<u8>,
    },

    // User commands.
    ConnectTo {
        endpoint_id: EndpointId,
    },
    AcceptRequested {
        endpoint_id: EndpointId,
    },
    Disconnect {
        endpoint_id: EndpointId,
    },
    StartDiscovering,
    StopDiscovering,
    StartAdvertising,
    StopAdvertising,
    SetAutoDiscover(bool),
    SetKeepalive(bool),
    MarkPayloadRead {
        entry_id: Uuid,
    },

    // Scheduler ticks.
    SendPing {
        endpoint_id: EndpointId,
        node_id: NodeId,
    },

    // Effect completions.
    RequestConnection {
        endpoint_id: EndpointId,
        task: Task,
    },
    AcceptConnection {
        endpoint_id: EndpointId,
        task: Task,
    },
    DiscoveringChanged(bool),
    AdvertisingChanged(bool),
}

/// A transport interaction decided by the reducers.
///
/// Effects are returned from `Stores::apply` and executed by the
/// dispatcher after the state change is already visible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    StartDiscovery,
    StopDiscovery,
    StartAdvertising,
    StopAdvertising,
    RequestConnection { endpoint_id: EndpointId },
    AcceptConnection { endpoint_id: EndpointId },
    Disconnect { endpoint_id: EndpointId },
    SendPayload { endpoint_id: EndpointId, bytes: Vec<u8> },
}
