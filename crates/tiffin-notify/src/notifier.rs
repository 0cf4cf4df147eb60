//! Composition root for realtime order notifications: one connection
//! manager, one ledger, one bridge, owned together and injected into
//! whatever composes the UI. No ambient globals.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tiffin_wire::{destination_for, OrderEvent, UserIdentity};

use crate::auth::TokenProvider;
use crate::bridge::{CuePlayer, DispatchBridge, NotificationSink};
use crate::config::RealtimeConfig;
use crate::connection::{ClientEvent, ConnectionManager};
use crate::ledger::{NotificationLedger, NotificationRecord};
use crate::registry::{MessageHandler, SubscriptionId};
use crate::state::ConnectionState;
use crate::transport::BrokerConnector;

pub struct OrderNotifier {
    manager: ConnectionManager,
    shared: Arc<Shared>,
    event_task: JoinHandle<()>,
}

struct Shared {
    ledger: Mutex<NotificationLedger>,
    bridge: DispatchBridge,
    identity: Mutex<Option<UserIdentity>>,
    active: Mutex<Option<SubscriptionId>>,
    last_error: Mutex<Option<String>>,
}

impl OrderNotifier {
    /// Build the notifier and start consuming connection events. Must run
    /// inside a tokio runtime.
    pub fn new(
        config: RealtimeConfig,
        connector: Arc<dyn BrokerConnector>,
        tokens: Arc<dyn TokenProvider>,
        sink: Arc<dyn NotificationSink>,
        cue: Arc<dyn CuePlayer>,
    ) -> Self {
        let (manager, events) = ConnectionManager::new(config, connector, tokens);
        let shared = Arc::new(Shared {
            ledger: Mutex::new(NotificationLedger::new()),
            bridge: DispatchBridge::new(sink, cue),
            identity: Mutex::new(None),
            active: Mutex::new(None),
            last_error: Mutex::new(None),
        });
        let event_task = tokio::spawn(event_loop(manager.clone(), shared.clone(), events));
        Self {
            manager,
            shared,
            event_task,
        }
    }

    /// Adopt an identity and bring the connection up. The destination is
    /// (re)declared once the broker confirms the link.
    pub fn login(&self, identity: UserIdentity) {
        self.set_identity(Some(identity));
        self.manager.connect();
    }

    /// Session teardown: pending reconnects are cancelled and subscriptions
    /// released before the transport goes down; the ledger dies with the
    /// session.
    pub fn logout(&self) {
        *self.shared.identity.lock() = None;
        *self.shared.active.lock() = None;
        self.manager.disconnect();
        self.shared.ledger.lock().clear();
        *self.shared.last_error.lock() = None;
        info!(target: "tiffin::notifier", "session closed");
    }

    /// Switch identities (login, logout, role change). The previous
    /// subscription is torn down before the new destination is resolved.
    pub fn set_identity(&self, identity: Option<UserIdentity>) {
        if let Some(previous) = self.shared.active.lock().take() {
            self.manager.unsubscribe(&previous);
        }
        *self.shared.identity.lock() = identity;
        if self.manager.is_connected() {
            resubscribe(&self.manager, &self.shared);
        }
    }

    pub fn connect(&self) {
        self.manager.connect();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Most recent connection error, for the presentation layer.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    /// Ledger snapshot, newest first.
    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.shared.ledger.lock().snapshot()
    }

    pub fn unread_count(&self) -> usize {
        self.shared.ledger.lock().unread_count()
    }

    pub fn mark_read(&self, id: &str) -> bool {
        self.shared.ledger.lock().mark_read(id)
    }

    pub fn mark_all_read(&self) {
        self.shared.ledger.lock().mark_all_read();
    }

    pub fn remove_notification(&self, id: &str) -> bool {
        self.shared.ledger.lock().remove(id)
    }

    pub fn clear_notifications(&self) {
        self.shared.ledger.lock().clear();
    }
}

impl Drop for OrderNotifier {
    fn drop(&mut self) {
        self.event_task.abort();
    }
}

/// Declare the current identity's destination on a live connection.
fn resubscribe(manager: &ConnectionManager, shared: &Arc<Shared>) {
    let identity = *shared.identity.lock();
    let Some(identity) = identity else {
        return;
    };
    let Some(destination) = destination_for(&identity) else {
        debug!(target: "tiffin::notifier", role = ?identity.role, "role has no realtime feed");
        return;
    };

    let handler: MessageHandler = {
        let shared = shared.clone();
        Arc::new(move |event: OrderEvent| {
            // One lock around the mutation; the bridge fires on the
            // settled record and count.
            let (record, unread) = {
                let mut ledger = shared.ledger.lock();
                let record = ledger.insert(event);
                (record, ledger.unread_count())
            };
            shared.bridge.on_insert(&record, unread);
        })
    };

    match manager.subscribe(&destination, handler) {
        Some(id) => {
            info!(target: "tiffin::notifier", %destination, "listening for order notifications");
            *shared.active.lock() = Some(id);
        }
        None => {
            warn!(target: "tiffin::notifier", %destination, "subscribe failed; will retry on next connect");
        }
    }
}

async fn event_loop(
    manager: ConnectionManager,
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<ClientEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Connected => {
                *shared.last_error.lock() = None;
                resubscribe(&manager, &shared);
            }
            ClientEvent::Disconnected => {
                *shared.active.lock() = None;
            }
            ClientEvent::Error(message) => {
                *shared.last_error.lock() = Some(message);
            }
            ClientEvent::ReconnectScheduled { attempt } => {
                debug!(target: "tiffin::notifier", attempt, "reconnect pending");
            }
            ClientEvent::ReconnectExhausted { attempts } => {
                *shared.last_error.lock() = Some(format!(
                    "Failed to reconnect after {attempts} attempts. Please restart the session."
                ));
            }
        }
    }
}
