//! The public session handle.
//!
//! `NearLink::new` wires the whole stack: the dispatch loop that owns state,
//! the pump that classifies transport events into actions, and the
//! background schedulers. The handle itself is cheap to share; commands are
//! fire-and-forget dispatches and state comes back through watch channels.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::core::actions::Action;
use crate::core::config::SessionConfig;
use crate::core::controller::Controller;
use crate::core::dispatcher::{self, DispatchLoop, Dispatcher, StateWatches};
use crate::core::protocol::{self, Control};
use crate::core::stores::inbox::InboxState;
use crate::core::stores::keepalive::PingState;
use crate::core::stores::peers::{ConnectionStatus, PeerRecord, PeersState};
use crate::core::stores::session::SessionState;
use crate::core::stores::Stores;
use crate::core::task::Task;
use crate::core::NodeId;
use crate::transport::{ConnectionCode, Transport, TransportEvent};
use crate::utils::sos::SignalOfStop;

/// A running session over one transport.
pub struct NearLink {
    dispatcher: Dispatcher,
    transport: Arc<dyn Transport>,
    peers_rx: watch::Receiver<PeersState>,
    session_rx: watch::Receiver<SessionState>,
    keepalive_rx: watch::Receiver<PingState>,
    inbox_rx: watch::Receiver<InboxState>,
    sos: SignalOfStop,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
}

impl NearLink {
    /// Start a session. `events` is the channel the transport adapter pushes
    /// its callbacks into. Must be called from within a tokio runtime.
    pub fn new(
        config: SessionConfig,
        local_uuid: NodeId,
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        let stores = Stores::new(&config, local_uuid);
        let (peers_tx, peers_rx) = watch::channel(stores.peers.clone());
        let (session_tx, session_rx) = watch::channel(stores.session.clone());
        let (keepalive_tx, keepalive_rx) = watch::channel(stores.keepalive.clone());
        let (inbox_tx, inbox_rx) = watch::channel(stores.inbox.clone());

        let (dispatcher, queue_rx) = dispatcher::channel();
        let sos = SignalOfStop::new();

        let dispatch_handle = tokio::spawn(
            DispatchLoop {
                stores,
                rx: queue_rx,
                dispatcher: dispatcher.clone(),
                transport: Arc::clone(&transport),
                watches: StateWatches {
                    peers: peers_tx,
                    session: session_tx,
                    keepalive: keepalive_tx,
                    inbox: inbox_tx,
                },
                sos: sos.clone(),
            }
            .run(),
        );

        tokio::spawn(pump_events(events, dispatcher.clone(), sos.clone()));

        Controller::spawn(
            &config,
            dispatcher.clone(),
            peers_rx.clone(),
            session_rx.clone(),
            sos.clone(),
        );

        info!(
            event = "session_started",
            name = %config.name,
            service_id = %config.service_id,
        );

        Self {
            dispatcher,
            transport,
            peers_rx,
            session_rx,
            keepalive_rx,
            inbox_rx,
            sos,
            dispatch_handle: Mutex::new(Some(dispatch_handle)),
        }
    }

    // ── Observation ──────────────────────────────────────────────────────────

    pub fn peers(&self) -> watch::Receiver<PeersState> {
        self.peers_rx.clone()
    }

    pub fn session(&self) -> watch::Receiver<SessionState> {
        self.session_rx.clone()
    }

    pub fn keepalive(&self) -> watch::Receiver<PingState> {
        self.keepalive_rx.clone()
    }

    pub fn inbox(&self) -> watch::Receiver<InboxState> {
        self.inbox_rx.clone()
    }

    /// Joined snapshot of one peer, round trip included.
    pub fn peer(&self, endpoint_id: &str) -> Option<PeerRecord> {
        let peers = self.peers_rx.borrow();
        if !peers.contains(endpoint_id) {
            return None;
        }
        Some(peers.record_with_rtt(endpoint_id, &self.keepalive_rx.borrow().rtts))
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    /// Submit a raw action. Commands below are conveniences over this.
    pub fn dispatch(&self, action: Action) {
        self.dispatcher.dispatch(action);
    }

    /// Submit a raw action and wait until it has been applied.
    pub async fn dispatch_sync(&self, action: Action) {
        self.dispatcher.dispatch_sync(action).await;
    }

    pub fn start_discovering(&self) {
        self.dispatch(Action::StartDiscovering);
    }

    pub fn stop_discovering(&self) {
        self.dispatch(Action::StopDiscovering);
    }

    pub fn start_advertising(&self) {
        self.dispatch(Action::StartAdvertising);
    }

    pub fn stop_advertising(&self) {
        self.dispatch(Action::StopAdvertising);
    }

    pub fn connect_to(&self, endpoint_id: &str) {
        self.dispatch(Action::ConnectTo {
            endpoint_id: endpoint_id.to_string(),
        });
    }

    /// Request a connection to every in-sight peer that has none underway.
    /// The one-at-a-time discipline still applies; extras queue up.
    pub fn connect_to_all(&self) {
        for endpoint_id in self.peers_rx.borrow().connectable_endpoints() {
            self.dispatch(Action::ConnectTo { endpoint_id });
        }
    }

    pub fn accept_connection(&self, endpoint_id: &str) {
        self.dispatch(Action::AcceptRequested {
            endpoint_id: endpoint_id.to_string(),
        });
    }

    pub fn disconnect(&self, endpoint_id: &str) {
        self.dispatch(Action::Disconnect {
            endpoint_id: endpoint_id.to_string(),
        });
    }

    pub fn set_auto_discover(&self, enabled: bool) {
        self.dispatch(Action::SetAutoDiscover(enabled));
    }

    pub fn set_keepalive(&self, enabled: bool) {
        self.dispatch(Action::SetKeepalive(enabled));
    }

    pub fn mark_payload_read(&self, entry_id: Uuid) {
        self.dispatch(Action::MarkPayloadRead { entry_id });
    }

    // ── Payload sending ──────────────────────────────────────────────────────

    /// Send bytes to a peer by durable node id.
    pub async fn send_data(&self, node_id: &str, bytes: Vec<u8>) -> Result<()> {
        let endpoint_id = {
            let peers = self.peers_rx.borrow();
            match peers.endpoint_of(node_id) {
                Some(ep) if peers.status(&ep) == ConnectionStatus::Connected => ep,
                Some(_) => bail!("node {node_id} is not connected"),
                None => bail!("unknown node {node_id}"),
            }
        };
        self.transport.send_payload(&endpoint_id, bytes).await
    }

    /// Send the same bytes to every connected peer. A session with no
    /// connected peers is not an error; there is simply no one to send to.
    pub async fn send_to_all(&self, bytes: Vec<u8>) -> Result<()> {
        let endpoints = self.peers_rx.borrow().connected_endpoints();
        if endpoints.is_empty() {
            return Ok(());
        }
        self.transport.send_payload_to_many(&endpoints, bytes).await
    }

    // ── Shutdown ─────────────────────────────────────────────────────────────

    /// Stop every background task and quiesce the radios. Idempotent.
    pub async fn shutdown(&self) {
        self.sos.cancel();
        if let Err(e) = self.transport.stop_discovery().await {
            debug!(event = "shutdown_stop_discovery_failure", error = %e);
        }
        if let Err(e) = self.transport.stop_advertising().await {
            debug!(event = "shutdown_stop_advertising_failure", error = %e);
        }
        let handle = self.dispatch_handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(event = "dispatcher_fault", error = %e, "Dispatcher panicked");
                }
            }
        }
        info!(event = "session_stopped");
    }
}

/// Classify transport callbacks into actions and feed the dispatcher.
///
/// This is where the control channel is demultiplexed: pings, pongs and
/// identity frames never reach the inbox.
async fn pump_events(
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    dispatcher: Dispatcher,
    sos: SignalOfStop,
) {
    loop {
        tokio::select! {
            _ = sos.wait() => break,
            event = events.recv() => match event {
                None => break,
                Some(event) => route_event(event, &dispatcher),
            },
        }
    }
    debug!(event = "event_pump_stopped");
}

fn route_event(event: TransportEvent, dispatcher: &Dispatcher) {
    match event {
        TransportEvent::EndpointDiscovered { endpoint_id, name } => {
            dispatcher.dispatch(Action::EndpointDiscovered { endpoint_id, name });
        }
        TransportEvent::EndpointLost { endpoint_id } => {
            dispatcher.dispatch(Action::EndpointLost { endpoint_id });
        }
        TransportEvent::ConnectionInitiated {
            endpoint_id,
            remote_name,
        } => {
            dispatcher.dispatch(Action::ConnectionInitiated {
                endpoint_id,
                name: remote_name,
            });
        }
        TransportEvent::ConnectionResult { endpoint_id, code } => {
            let task = match code {
                ConnectionCode::Ok => Task::done(),
                ConnectionCode::Rejected => Task::failed("connection rejected"),
                ConnectionCode::Error => Task::failed("connection error"),
            };
            dispatcher.dispatch(Action::ConnectionResult { endpoint_id, task });
        }
        TransportEvent::Disconnected { endpoint_id } => {
            dispatcher.dispatch(Action::EndpointDisconnected { endpoint_id });
        }
        TransportEvent::PayloadReceived { endpoint_id, bytes } => {
            match protocol::classify(&bytes) {
                Control::Ping => dispatcher.dispatch(Action::PongRequested { endpoint_id }),
                Control::Pong => dispatcher.dispatch(Action::PongReceived { endpoint_id }),
                Control::Identity(node_id) => {
                    dispatcher.dispatch(Action::IdentityResolved {
                        endpoint_id,
                        node_id,
                    });
                }
                Control::Malformed => {
                    debug!(
                        event = "malformed_control_dropped",
                        endpoint_id = %endpoint_id,
                        "Dropping malformed control frame"
                    );
                }
                Control::Data => {
                    dispatcher.dispatch(Action::PayloadReceived { endpoint_id, bytes });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Strategy;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        StartDiscovery(String),
        StopDiscovery,
        StartAdvertising(String),
        StopAdvertising,
        RequestConnection(String),
        AcceptConnection(String),
        Disconnect(String),
        Send(String, Vec<u8>),
        SendMany(Vec<String>, Vec<u8>),
    }

    struct MockTransport {
        calls: Mutex<Vec<Call>>,
        /// When gated, `request_connection` blocks until a permit arrives.
        gate_connects: bool,
        gate: tokio::sync::Semaphore,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                gate_connects: false,
                gate: tokio::sync::Semaphore::new(0),
            })
        }

        fn gated() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                gate_connects: true,
                gate: tokio::sync::Semaphore::new(0),
            })
        }

        fn release_one_connect(&self) {
            self.gate.add_permits(1);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn start_discovery(&self, service_id: &str, _strategy: Strategy) -> Result<()> {
            self.record(Call::StartDiscovery(service_id.to_string()));
            Ok(())
        }

        async fn stop_discovery(&self) -> Result<()> {
            self.record(Call::StopDiscovery);
            Ok(())
        }

        async fn start_advertising(
            &self,
            name: &str,
            _service_id: &str,
            _strategy: Strategy,
        ) -> Result<()> {
            self.record(Call::StartAdvertising(name.to_string()));
            Ok(())
        }

        async fn stop_advertising(&self) -> Result<()> {
            self.record(Call::StopAdvertising);
            Ok(())
        }

        async fn request_connection(&self, endpoint_id: &str, _local_name: &str) -> Result<()> {
            self.record(Call::RequestConnection(endpoint_id.to_string()));
            if self.gate_connects {
                self.gate.acquire().await.unwrap().forget();
            }
            Ok(())
        }

        async fn accept_connection(&self, endpoint_id: &str) -> Result<()> {
            self.record(Call::AcceptConnection(endpoint_id.to_string()));
            Ok(())
        }

        async fn disconnect(&self, endpoint_id: &str) -> Result<()> {
            self.record(Call::Disconnect(endpoint_id.to_string()));
            Ok(())
        }

        async fn send_payload(&self, endpoint_id: &str, bytes: Vec<u8>) -> Result<()> {
            self.record(Call::Send(endpoint_id.to_string(), bytes));
            Ok(())
        }

        async fn send_payload_to_many(
            &self,
            endpoint_ids: &[String],
            bytes: Vec<u8>,
        ) -> Result<()> {
            self.record(Call::SendMany(endpoint_ids.to_vec(), bytes));
            Ok(())
        }
    }

    fn manual_config() -> SessionConfig {
        SessionConfig {
            name: "tester".to_string(),
            auto_connect_on_discover: false,
            auto_accept_connection: false,
            ..SessionConfig::default()
        }
    }

    fn start(
        config: SessionConfig,
        transport: Arc<MockTransport>,
    ) -> (NearLink, mpsc::UnboundedSender<TransportEvent>) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link = NearLink::new(config, "local-uuid".to_string(), transport, events_rx);
        (link, events_tx)
    }

    /// Poll until `predicate` holds; effects and the event pump run on their
    /// own tasks, so tests wait for them instead of assuming ordering.
    async fn wait_until(mut predicate: impl FnMut() -> bool) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_negotiation_triggers_stop_discovery_and_identity_handshake() {
        let mock = MockTransport::new();
        let (link, _events) = start(manual_config(), Arc::clone(&mock));

        link.dispatch_sync(Action::EndpointDiscovered {
            endpoint_id: "ep1".into(),
            name: "alice".into(),
        })
        .await;
        link.dispatch_sync(Action::ConnectionResult {
            endpoint_id: "ep1".into(),
            task: Task::done(),
        })
        .await;

        wait_until(|| {
            mock.calls().contains(&Call::Send(
                "ep1".to_string(),
                b"NEARLINK_ID=local-uuid".to_vec(),
            ))
        })
        .await;
        assert!(mock.calls().contains(&Call::StopDiscovery));
        // Negotiated but identity not yet resolved.
        assert_eq!(link.peer("ep1").unwrap().status, ConnectionStatus::Connecting);

        link.shutdown().await;
    }

    #[tokio::test]
    async fn test_control_frames_never_reach_inbox() {
        let mock = MockTransport::new();
        let (link, events) = start(manual_config(), Arc::clone(&mock));

        link.dispatch_sync(Action::EndpointDiscovered {
            endpoint_id: "ep1".into(),
            name: "alice".into(),
        })
        .await;

        for bytes in [
            b"NEARLINK_PING".to_vec(),
            b"NEARLINK_PONG".to_vec(),
            b"NEARLINK_ID=remote-uuid".to_vec(),
            b"NEARLINK_ID=bad id!".to_vec(),
            b"hello".to_vec(),
        ] {
            events
                .send(TransportEvent::PayloadReceived {
                    endpoint_id: "ep1".into(),
                    bytes,
                })
                .unwrap();
        }

        // The ping was answered with a pong on the wire.
        wait_until(|| {
            mock.calls()
                .contains(&Call::Send("ep1".to_string(), b"NEARLINK_PONG".to_vec()))
        })
        .await;
        // The identity frame bound the node id and promoted the peer.
        wait_until(|| {
            link.peer("ep1")
                .map(|p| p.status == ConnectionStatus::Connected)
                .unwrap_or(false)
        })
        .await;
        assert_eq!(
            link.peer("ep1").unwrap().node_id,
            Some("remote-uuid".to_string())
        );

        // Only the application payload landed in the inbox.
        wait_until(|| !link.inbox().borrow().entries.is_empty()).await;
        let inbox = link.inbox().borrow().clone();
        assert_eq!(inbox.entries.len(), 1);
        assert_eq!(inbox.entries[0].body, b"hello");

        link.shutdown().await;
    }

    #[tokio::test]
    async fn test_second_connect_waits_for_first_to_finish() {
        let mock = MockTransport::gated();
        let (link, _events) = start(manual_config(), Arc::clone(&mock));

        for (ep, name) in [("ep1", "alice"), ("ep2", "bob")] {
            link.dispatch_sync(Action::EndpointDiscovered {
                endpoint_id: ep.into(),
                name: name.into(),
            })
            .await;
        }

        link.dispatch_sync(Action::ConnectTo { endpoint_id: "ep1".into() })
            .await;
        link.dispatch_sync(Action::ConnectTo { endpoint_id: "ep2".into() })
            .await;

        wait_until(|| {
            mock.calls()
                .contains(&Call::RequestConnection("ep1".to_string()))
        })
        .await;
        // ep1 still in flight: ep2 is queued, not requested.
        assert!(!mock
            .calls()
            .contains(&Call::RequestConnection("ep2".to_string())));
        {
            let session = link.session().borrow().clone();
            assert!(session.connecting);
            assert_eq!(session.connect_queue.len(), 1);
        }

        mock.release_one_connect();
        wait_until(|| {
            mock.calls()
                .contains(&Call::RequestConnection("ep2".to_string()))
        })
        .await;
        mock.release_one_connect();

        link.shutdown().await;
    }

    #[tokio::test]
    async fn test_connect_to_all_targets_in_sight_disconnected_peers() {
        let mock = MockTransport::gated();
        let (link, _events) = start(manual_config(), Arc::clone(&mock));

        for (ep, name) in [("ep1", "alice"), ("ep2", "bob"), ("ep3", "carol")] {
            link.dispatch_sync(Action::EndpointDiscovered {
                endpoint_id: ep.into(),
                name: name.into(),
            })
            .await;
        }
        // ep2 vanished, ep3 is already fully connected.
        link.dispatch_sync(Action::EndpointLost { endpoint_id: "ep2".into() })
            .await;
        link.dispatch_sync(Action::IdentityResolved {
            endpoint_id: "ep3".into(),
            node_id: "uuid-3".into(),
        })
        .await;

        link.connect_to_all();

        wait_until(|| {
            mock.calls()
                .contains(&Call::RequestConnection("ep1".to_string()))
        })
        .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let requests: Vec<Call> = mock
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::RequestConnection(_)))
            .collect();
        assert_eq!(requests, vec![Call::RequestConnection("ep1".to_string())]);
        assert!(link.session().borrow().connect_queue.is_empty());

        mock.release_one_connect();
        link.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_data_resolves_endpoint_by_node_id() {
        let mock = MockTransport::new();
        let (link, _events) = start(manual_config(), Arc::clone(&mock));

        link.dispatch_sync(Action::EndpointDiscovered {
            endpoint_id: "ep1".into(),
            name: "alice".into(),
        })
        .await;

        // Not connected yet.
        assert!(link.send_data("remote-uuid", b"hi".to_vec()).await.is_err());

        link.dispatch_sync(Action::IdentityResolved {
            endpoint_id: "ep1".into(),
            node_id: "remote-uuid".into(),
        })
        .await;

        link.send_data("remote-uuid", b"hi".to_vec()).await.unwrap();
        assert!(mock
            .calls()
            .contains(&Call::Send("ep1".to_string(), b"hi".to_vec())));

        link.send_to_all(b"all".to_vec()).await.unwrap();
        assert!(mock
            .calls()
            .contains(&Call::SendMany(vec!["ep1".to_string()], b"all".to_vec())));

        link.shutdown().await;
    }

    #[tokio::test]
    async fn test_keepalive_scheduler_pings_connected_peers() {
        let mut config = manual_config();
        config.keepalive = true;
        config.ping_interval = Duration::from_millis(10);
        let mock = MockTransport::new();
        let (link, _events) = start(config, Arc::clone(&mock));

        link.dispatch_sync(Action::EndpointDiscovered {
            endpoint_id: "ep1".into(),
            name: "alice".into(),
        })
        .await;
        link.dispatch_sync(Action::IdentityResolved {
            endpoint_id: "ep1".into(),
            node_id: "remote-uuid".into(),
        })
        .await;

        wait_until(|| {
            mock.calls()
                .contains(&Call::Send("ep1".to_string(), b"NEARLINK_PING".to_vec()))
        })
        .await;
        // One ping outstanding: the scheduler keeps ticking but nothing
        // further hits the wire until a pong settles it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let pings = mock
            .calls()
            .iter()
            .filter(|c| **c == Call::Send("ep1".to_string(), b"NEARLINK_PING".to_vec()))
            .count();
        assert_eq!(pings, 1);

        link.dispatch_sync(Action::PongReceived { endpoint_id: "ep1".into() })
            .await;
        assert!(link.keepalive().borrow().rtt("remote-uuid").is_some());
        wait_until(|| {
            let pings = mock
                .calls()
                .iter()
                .filter(|c| **c == Call::Send("ep1".to_string(), b"NEARLINK_PING".to_vec()))
                .count();
            pings >= 2
        })
        .await;

        link.shutdown().await;
    }

    #[tokio::test]
    async fn test_auto_discovery_restarts_scanning_when_alone() {
        let mut config = manual_config();
        config.auto_discover = true;
        config.discover_initial_delay = Duration::from_millis(5);
        config.discover_interval = Duration::from_millis(10);
        let mock = MockTransport::new();
        let (link, _events) = start(config, Arc::clone(&mock));

        wait_until(|| !mock.calls().is_empty()).await;
        assert!(mock
            .calls()
            .contains(&Call::StartDiscovery("nearlink".to_string())));

        link.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_quiesces_radios() {
        let mock = MockTransport::new();
        let (link, _events) = start(manual_config(), Arc::clone(&mock));
        link.shutdown().await;
        let calls = mock.calls();
        assert!(calls.contains(&Call::StopDiscovery));
        assert!(calls.contains(&Call::StopAdvertising));
    }
}
