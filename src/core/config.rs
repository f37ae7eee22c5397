//! Centralized configuration for a nearlink session.
//!
//! All tunable parameters live here so they can be reviewed and adjusted
//! in a single place. Wire-format constants (control markers, identity
//! grammar) stay in the protocol module.

use std::time::Duration;

use crate::transport::Strategy;

// ── Scheduling ───────────────────────────────────────────────────────────────

/// Interval between auto-discovery checks.
///
/// The scanner only restarts discovery when no peer is connected and no scan
/// is already running, so a generous period keeps radio churn low.
pub const AUTO_DISCOVER_INTERVAL: Duration = Duration::from_secs(10);

/// Delay before the first auto-discovery check after the scheduler starts.
/// Gives an in-flight manual discovery or connection time to settle.
pub const AUTO_DISCOVER_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Interval between keepalive pings to each connected peer.
pub const PING_INTERVAL: Duration = Duration::from_secs(1);

// ── Session configuration ────────────────────────────────────────────────────

/// Per-session settings, fixed at construction.
///
/// Runtime-togglable behaviour (auto-discover, keepalive) seeds the session
/// state and can be flipped later through the session handle.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Human-readable name advertised to nearby scanners.
    pub name: String,
    /// Service identifier; only endpoints advertising the same id are
    /// discovered.
    pub service_id: String,
    /// Topology hint for the transport.
    pub strategy: Strategy,
    /// Request a connection to every endpoint as soon as it is discovered.
    pub auto_connect_on_discover: bool,
    /// Accept every incoming connection without asking.
    pub auto_accept_connection: bool,
    /// Start the auto-discovery scheduler immediately.
    pub auto_discover: bool,
    /// Start the keepalive scheduler immediately.
    pub keepalive: bool,
    /// Period of the auto-discovery scheduler.
    pub discover_interval: Duration,
    /// Delay before the auto-discovery scheduler's first check.
    pub discover_initial_delay: Duration,
    /// Period of the keepalive scheduler.
    pub ping_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "nearlink".to_string(),
            service_id: "nearlink".to_string(),
            strategy: Strategy::Cluster,
            auto_connect_on_discover: true,
            auto_accept_connection: true,
            auto_discover: false,
            keepalive: false,
            discover_interval: AUTO_DISCOVER_INTERVAL,
            discover_initial_delay: AUTO_DISCOVER_INITIAL_DELAY,
            ping_interval: PING_INTERVAL,
        }
    }
}
