//! Session core: serialized state, reducers, scheduling.

pub mod actions;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod identity;
pub mod node;
pub mod observe;
pub mod protocol;
pub mod stores;
pub mod task;

/// Transport-assigned, ephemeral endpoint identifier. A physical device gets
/// a fresh one on every discovery round.
pub type EndpointId = String;

/// Durable node identity (a UUID string), stable across sessions and learned
/// through the in-band identity handshake.
pub type NodeId = String;
