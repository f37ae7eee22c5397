//! Background schedulers: auto-discovery and keepalive.
//!
//! One supervisor task watches the session flags and toggles two interval
//! loops, each held as an abortable task handle. The loops only read
//! published state snapshots and dispatch actions; every decision about
//! whether a tick does anything is a pure function over those snapshots,
//! so the policy is testable without timers.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::core::actions::Action;
use crate::core::config::SessionConfig;
use crate::core::dispatcher::Dispatcher;
use crate::core::stores::peers::{ConnectionStatus, PeersState};
use crate::core::stores::session::SessionState;
use crate::core::{EndpointId, NodeId};
use crate::utils::sos::SignalOfStop;

/// A fresh discovery round is due when no scan is running and nothing is
/// connected.
pub(crate) fn discovery_due(peers: &PeersState, session: &SessionState) -> bool {
    !session.discovering
        && !peers
            .statuses
            .values()
            .any(|s| *s == ConnectionStatus::Connected)
}

/// Peers eligible for a keepalive ping: connected, with a bound node id.
pub(crate) fn ping_targets(peers: &PeersState) -> Vec<(EndpointId, NodeId)> {
    let mut targets: Vec<(EndpointId, NodeId)> = peers
        .statuses
        .iter()
        .filter(|(_, s)| **s == ConnectionStatus::Connected)
        .filter_map(|(ep, _)| {
            peers
                .node_id(ep)
                .map(|node| (ep.clone(), node.clone()))
        })
        .collect();
    targets.sort();
    targets
}

pub(crate) struct Controller {
    dispatcher: Dispatcher,
    peers: watch::Receiver<PeersState>,
    session: watch::Receiver<SessionState>,
    discover_interval: Duration,
    discover_initial_delay: Duration,
    ping_interval: Duration,
    discovery_loop: Option<JoinHandle<()>>,
    ping_loop: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn spawn(
        config: &SessionConfig,
        dispatcher: Dispatcher,
        peers: watch::Receiver<PeersState>,
        session: watch::Receiver<SessionState>,
        sos: SignalOfStop,
    ) -> JoinHandle<()> {
        let controller = Self {
            dispatcher,
            peers,
            session,
            discover_interval: config.discover_interval,
            discover_initial_delay: config.discover_initial_delay,
            ping_interval: config.ping_interval,
            discovery_loop: None,
            ping_loop: None,
        };
        tokio::spawn(controller.run(sos))
    }

    async fn run(mut self, sos: SignalOfStop) {
        self.sync_flags();
        let mut session = self.session.clone();
        loop {
            tokio::select! {
                _ = sos.wait() => break,
                changed = session.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.sync_flags();
                }
            }
        }
        self.disable_discovery();
        self.disable_ping();
    }

    fn sync_flags(&mut self) {
        let (auto_discover, keepalive) = {
            let s = self.session.borrow();
            (s.auto_discover, s.keepalive_enabled)
        };
        if auto_discover {
            self.enable_discovery();
        } else {
            self.disable_discovery();
        }
        if keepalive {
            self.enable_ping();
        } else {
            self.disable_ping();
        }
    }

    fn enable_discovery(&mut self) {
        if self.discovery_loop.is_some() {
            return;
        }
        info!(event = "auto_discover_enabled");
        let dispatcher = self.dispatcher.clone();
        let peers = self.peers.clone();
        let session = self.session.clone();
        let delay = self.discover_initial_delay;
        let every = self.discover_interval;
        self.discovery_loop = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let due = {
                    let p = peers.borrow();
                    let s = session.borrow();
                    discovery_due(&p, &s)
                };
                if due {
                    dispatcher.dispatch(Action::StartDiscovering);
                }
            }
        }));
    }

    fn disable_discovery(&mut self) {
        if let Some(handle) = self.discovery_loop.take() {
            handle.abort();
            info!(event = "auto_discover_disabled");
        }
    }

    fn enable_ping(&mut self) {
        if self.ping_loop.is_some() {
            return;
        }
        info!(event = "keepalive_enabled");
        let dispatcher = self.dispatcher.clone();
        let peers = self.peers.clone();
        let every = self.ping_interval;
        self.ping_loop = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let targets = ping_targets(&peers.borrow());
                for (endpoint_id, node_id) in targets {
                    dispatcher.dispatch(Action::SendPing {
                        endpoint_id,
                        node_id,
                    });
                }
            }
        }));
    }

    fn disable_ping(&mut self) {
        if let Some(handle) = self.ping_loop.take() {
            handle.abort();
            info!(event = "keepalive_disabled");
        }
    }
}
