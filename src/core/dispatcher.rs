//! Serialized action dispatcher.
//!
//! A single task owns the whole state tree. Actions arrive on an unbounded
//! queue, are reduced one at a time, and the resulting state is published
//! through watch channels before the action's effects run. Effects execute
//! on spawned tasks so a slow transport call never blocks the queue; their
//! completions re-enter as new actions.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::core::actions::{Action, Effect};
use crate::core::stores::inbox::InboxState;
use crate::core::stores::keepalive::PingState;
use crate::core::stores::peers::PeersState;
use crate::core::stores::session::SessionState;
use crate::core::stores::Stores;
use crate::core::task::Task;
use crate::transport::Transport;
use crate::utils::now_millis;
use crate::utils::sos::SignalOfStop;

pub(crate) struct Envelope {
    pub action: Action,
    /// Acked once the action's state change is visible and its effects have
    /// been handed off.
    pub ack: Option<oneshot::Sender<()>>,
}

/// Cheap handle for submitting actions to the dispatch queue.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Dispatcher {
    /// Fire-and-forget submission. A send after shutdown is dropped.
    pub fn dispatch(&self, action: Action) {
        let _ = self.tx.send(Envelope { action, ack: None });
    }

    /// Submit and wait until the action has been applied.
    pub async fn dispatch_sync(&self, action: Action) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .tx
            .send(Envelope {
                action,
                ack: Some(ack_tx),
            })
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }
}

pub(crate) fn channel() -> (Dispatcher, mpsc::UnboundedReceiver<Envelope>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Dispatcher { tx }, rx)
}

/// Watch senders for each state container, published after every reduction.
pub(crate) struct StateWatches {
    pub peers: watch::Sender<PeersState>,
    pub session: watch::Sender<SessionState>,
    pub keepalive: watch::Sender<PingState>,
    pub inbox: watch::Sender<InboxState>,
}

impl StateWatches {
    fn publish(&self, stores: &Stores) {
        publish_one(&self.peers, &stores.peers);
        publish_one(&self.session, &stores.session);
        publish_one(&self.keepalive, &stores.keepalive);
        publish_one(&self.inbox, &stores.inbox);
    }
}

fn publish_one<T: Clone + PartialEq>(tx: &watch::Sender<T>, next: &T) {
    tx.send_if_modified(|current| {
        if current == next {
            false
        } else {
            *current = next.clone();
            true
        }
    });
}

/// The task that owns the state tree.
pub(crate) struct DispatchLoop {
    pub stores: Stores,
    pub rx: mpsc::UnboundedReceiver<Envelope>,
    /// Self-handle; effect completions come back through it.
    pub dispatcher: Dispatcher,
    pub transport: Arc<dyn Transport>,
    pub watches: StateWatches,
    pub sos: SignalOfStop,
}

impl DispatchLoop {
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.sos.wait() => break,
                envelope = self.rx.recv() => match envelope {
                    None => break,
                    Some(envelope) => self.step(envelope),
                },
            }
        }
        debug!(event = "dispatcher_stopped");
    }

    fn step(&mut self, envelope: Envelope) {
        debug!(event = "action_applied", action = ?envelope.action);
        let effects = self.stores.apply(&envelope.action, now_millis());
        self.watches.publish(&self.stores);
        for effect in effects {
            self.execute(effect);
        }
        if let Some(ack) = envelope.ack {
            let _ = ack.send(());
        }
    }

    fn execute(&self, effect: Effect) {
        let transport = Arc::clone(&self.transport);
        let dispatcher = self.dispatcher.clone();
        match effect {
            Effect::StartDiscovery => {
                let service_id = self.stores.session.service_id.clone();
                let strategy = self.stores.session.strategy;
                tokio::spawn(async move {
                    match transport.start_discovery(&service_id, strategy).await {
                        Ok(()) => dispatcher.dispatch(Action::DiscoveringChanged(true)),
                        Err(e) => {
                            warn!(event = "discovery_start_failure", error = %e, "Failed to start discovery");
                            dispatcher.dispatch(Action::DiscoveringChanged(false));
                        }
                    }
                });
            }
            Effect::StopDiscovery => {
                tokio::spawn(async move {
                    if let Err(e) = transport.stop_discovery().await {
                        warn!(event = "discovery_stop_failure", error = %e, "Failed to stop discovery");
                    }
                    dispatcher.dispatch(Action::DiscoveringChanged(false));
                });
            }
            Effect::StartAdvertising => {
                let name = self.stores.session.local_name.clone();
                let service_id = self.stores.session.service_id.clone();
                let strategy = self.stores.session.strategy;
                tokio::spawn(async move {
                    match transport.start_advertising(&name, &service_id, strategy).await {
                        Ok(()) => dispatcher.dispatch(Action::AdvertisingChanged(true)),
                        Err(e) => {
                            warn!(event = "advertising_start_failure", error = %e, "Failed to start advertising");
                            dispatcher.dispatch(Action::AdvertisingChanged(false));
                        }
                    }
                });
            }
            Effect::StopAdvertising => {
                tokio::spawn(async move {
                    if let Err(e) = transport.stop_advertising().await {
                        warn!(event = "advertising_stop_failure", error = %e, "Failed to stop advertising");
                    }
                    dispatcher.dispatch(Action::AdvertisingChanged(false));
                });
            }
            Effect::RequestConnection { endpoint_id } => {
                let local_name = self.stores.session.local_name.clone();
                tokio::spawn(async move {
                    let task = match transport
                        .request_connection(&endpoint_id, &local_name)
                        .await
                    {
                        Ok(()) => Task::done(),
                        Err(e) => Task::failed(e.to_string()),
                    };
                    dispatcher.dispatch(Action::RequestConnection { endpoint_id, task });
                });
            }
            Effect::AcceptConnection { endpoint_id } => {
                tokio::spawn(async move {
                    let task = match transport.accept_connection(&endpoint_id).await {
                        Ok(()) => Task::done(),
                        Err(e) => Task::failed(e.to_string()),
                    };
                    dispatcher.dispatch(Action::AcceptConnection { endpoint_id, task });
                });
            }
            Effect::Disconnect { endpoint_id } => {
                tokio::spawn(async move {
                    if let Err(e) = transport.disconnect(&endpoint_id).await {
                        warn!(event = "disconnect_failure", endpoint_id = %endpoint_id, error = %e, "Failed to disconnect");
                    }
                });
            }
            Effect::SendPayload { endpoint_id, bytes } => {
                tokio::spawn(async move {
                    if let Err(e) = transport.send_payload(&endpoint_id, bytes).await {
                        debug!(event = "payload_send_failure", endpoint_id = %endpoint_id, error = %e, "Failed to send payload");
                    }
                });
            }
        }
    }
}
