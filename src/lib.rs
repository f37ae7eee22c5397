//! Ephemeral peer-to-peer session coordination over short-range discovery
//! transports.
//!
//! `nearlink` reconciles the asynchronous, partially-ordered callbacks of a
//! discovery/connection transport into a consistent peer model: it tracks
//! nearby endpoints, negotiates bidirectional connections, binds durable
//! UUID identities to transport-ephemeral endpoint ids, measures per-peer
//! round-trip latency, and separates an application payload channel from the
//! internal control messages multiplexed over the same transport.
//!
//! The transport itself is abstract: implement [`transport::Transport`] and
//! feed its events into a [`NearLink`] session. All state lives behind a
//! single serialized dispatcher; consumers observe it through `watch`
//! channels and drive it through commands on the session handle.

mod core;
pub mod transport;
pub mod utils;

pub use crate::core::actions::Action;
pub use crate::core::config::SessionConfig;
pub use crate::core::identity::IdentityStore;
pub use crate::core::node::NearLink;
pub use crate::core::observe;
pub use crate::core::protocol;
pub use crate::core::stores::inbox::{InboxState, PayloadEntry};
pub use crate::core::stores::keepalive::PingState;
pub use crate::core::stores::peers::{ConnectionStatus, PeerRecord, PeersState};
pub use crate::core::stores::session::SessionState;
pub use crate::core::task::Task;
pub use crate::core::{EndpointId, NodeId};
