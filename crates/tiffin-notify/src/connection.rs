//! Connection manager: owns the single logical broker link, executes the
//! lifecycle machine's effects (dialing, retry timers, teardown) and routes
//! inbound frames to the subscription registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tiffin_wire::{ClientFrame, ServerFrame};

use crate::auth::TokenProvider;
use crate::config::RealtimeConfig;
use crate::registry::{MessageHandler, SubscriptionId, SubscriptionRegistry};
use crate::state::{ConnectionState, Effect, Lifecycle, LinkSignal, ReconnectPolicy};
use crate::transport::{BrokerConnector, Inbound, Link};

/// Lifecycle notifications surfaced to the owning context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The link is up and authenticated; re-declare subscriptions now.
    Connected,
    /// The link went away; all subscription handles are invalid.
    Disconnected,
    /// A transport or protocol error, human-readable. Does not imply loss.
    Error(String),
    ReconnectScheduled { attempt: u32 },
    /// The attempt budget is spent; only a fresh `connect()` recovers.
    ReconnectExhausted { attempts: u32 },
}

#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: RealtimeConfig,
    connector: Arc<dyn BrokerConnector>,
    tokens: Arc<dyn TokenProvider>,
    lifecycle: Mutex<Lifecycle>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientFrame>>>,
    registry: SubscriptionRegistry,
    events: mpsc::UnboundedSender<ClientEvent>,
    retry_timer: Mutex<Option<JoinHandle<()>>>,
    pump_task: Mutex<Option<JoinHandle<()>>>,
    /// Bumped on disconnect; tasks spawned under an older generation
    /// become inert instead of racing the teardown.
    generation: AtomicU64,
}

impl ConnectionManager {
    pub fn new(
        config: RealtimeConfig,
        connector: Arc<dyn BrokerConnector>,
        tokens: Arc<dyn TokenProvider>,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy {
            delay: config.reconnect_delay,
            max_attempts: config.max_reconnect_attempts,
        };
        let inner = Arc::new(Inner {
            config,
            connector,
            tokens,
            lifecycle: Mutex::new(Lifecycle::new(policy)),
            outbound: Mutex::new(None),
            registry: SubscriptionRegistry::new(),
            events,
            retry_timer: Mutex::new(None),
            pump_task: Mutex::new(None),
            generation: AtomicU64::new(0),
        });
        (Self { inner }, event_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lifecycle.lock().state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Start connecting. A no-op while already connected or connecting;
    /// restarts the machine from reconnect exhaustion.
    pub fn connect(&self) {
        self.inner.apply(LinkSignal::ConnectRequested);
    }

    /// Always safe: cancels any pending reconnect, releases all
    /// subscriptions, then tears the transport down.
    pub fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.apply(LinkSignal::DisconnectRequested);
    }

    /// Register a handler for a destination. Returns `None` without side
    /// effects unless currently connected.
    pub fn subscribe(&self, destination: &str, handler: MessageHandler) -> Option<SubscriptionId> {
        if self.state() != ConnectionState::Connected {
            warn!(target: "tiffin::connection", %destination, "not connected; subscribe dropped");
            return None;
        }
        let outbound = self.inner.outbound.lock().clone()?;
        let id = self.inner.registry.register(destination, handler);
        let frame = ClientFrame::Subscribe {
            id: id.clone(),
            destination: destination.to_string(),
        };
        if outbound.send(frame).is_err() {
            self.inner.registry.remove(&id);
            return None;
        }
        debug!(target: "tiffin::connection", %destination, %id, "subscribed");
        Some(id)
    }

    /// Remove a subscription. Unknown or already-removed ids are a no-op.
    pub fn unsubscribe(&self, id: &str) {
        let Some(destination) = self.inner.registry.remove(id) else {
            return;
        };
        debug!(target: "tiffin::connection", %destination, %id, "unsubscribed");
        if let Some(outbound) = self.inner.outbound.lock().clone() {
            let _ = outbound.send(ClientFrame::Unsubscribe { id: id.to_string() });
        }
    }

    /// Send a JSON payload to a destination; warns and drops when offline.
    pub fn publish(&self, destination: &str, body: serde_json::Value) {
        if self.state() != ConnectionState::Connected {
            warn!(target: "tiffin::connection", %destination, "not connected; publish dropped");
            return;
        }
        if let Some(outbound) = self.inner.outbound.lock().clone() {
            let _ = outbound.send(ClientFrame::Publish {
                destination: destination.to_string(),
                body,
            });
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.registry.len()
    }
}

impl Inner {
    fn apply(self: &Arc<Self>, signal: LinkSignal) {
        let effect = self.lifecycle.lock().apply(signal);
        self.run_effect(effect);
    }

    /// Apply a signal only if no disconnect happened since `generation` was
    /// captured.
    fn apply_if_current(self: &Arc<Self>, generation: u64, signal: LinkSignal) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        self.apply(signal);
    }

    fn run_effect(self: &Arc<Self>, effect: Effect) {
        match effect {
            Effect::None => {}
            Effect::StartConnect => {
                self.cancel_retry();
                self.spawn_dial();
            }
            Effect::ScheduleRetry { delay, attempt } => {
                self.drop_link();
                warn!(
                    target: "tiffin::connection",
                    attempt,
                    max = self.config.max_reconnect_attempts,
                    ?delay,
                    "connection lost; reconnect scheduled"
                );
                let _ = self.events.send(ClientEvent::ReconnectScheduled { attempt });
                self.spawn_retry(delay);
            }
            Effect::Exhausted => {
                self.drop_link();
                let attempts = self.config.max_reconnect_attempts;
                error!(
                    target: "tiffin::connection",
                    attempts,
                    "reconnect attempts exhausted; staying offline"
                );
                let _ = self.events.send(ClientEvent::ReconnectExhausted { attempts });
            }
            Effect::TearDown => {
                self.cancel_retry();
                let released = self.registry.clear();
                if released > 0 {
                    debug!(target: "tiffin::connection", released, "subscriptions released");
                }
                self.drop_link();
                info!(target: "tiffin::connection", "disconnected");
            }
        }
    }

    fn spawn_dial(self: &Arc<Self>) {
        let generation = self.generation.load(Ordering::SeqCst);
        let inner = self.clone();
        tokio::spawn(async move {
            let token = inner.tokens.bearer_token();
            let url = inner.config.broker_url.clone();
            let result = inner
                .connector
                .connect(&url, token, inner.config.heartbeat_interval)
                .await;
            match result {
                Ok(link) => inner.install_link(generation, link),
                Err(err) => {
                    warn!(target: "tiffin::connection", %url, %err, "broker connect failed");
                    let _ = inner.events.send(ClientEvent::Error(err.to_string()));
                    inner.apply_if_current(generation, LinkSignal::ConnectFailed);
                }
            }
        });
    }

    fn install_link(self: &Arc<Self>, generation: u64, link: Link) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if self.generation.load(Ordering::SeqCst) != generation {
                // Disconnected while dialing; dropping the link aborts it.
                return;
            }
            *self.outbound.lock() = Some(link.sender());
            lifecycle.apply(LinkSignal::Established);
        }
        info!(target: "tiffin::connection", "broker connected");
        let _ = self.events.send(ClientEvent::Connected);

        let inner = self.clone();
        let handle = tokio::spawn(pump(inner, generation, link));
        let mut pump_slot = self.pump_task.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            // A disconnect slipped in; kill the pump we just started.
            handle.abort();
        } else {
            *pump_slot = Some(handle);
        }
    }

    fn spawn_retry(self: &Arc<Self>, delay: std::time::Duration) {
        let generation = self.generation.load(Ordering::SeqCst);
        let inner = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.apply_if_current(generation, LinkSignal::RetryDue);
        });
        *self.retry_timer.lock() = Some(handle);
    }

    fn cancel_retry(&self) {
        if let Some(timer) = self.retry_timer.lock().take() {
            timer.abort();
        }
    }

    /// Invalidate the registry and the outbound half, and stop the pump.
    /// The registry holds only *active* handles, so a lost link empties it.
    fn drop_link(&self) {
        let had_link = self.outbound.lock().take().is_some();
        self.registry.clear();
        if let Some(pump) = self.pump_task.lock().take() {
            pump.abort();
        }
        if had_link {
            let _ = self.events.send(ClientEvent::Disconnected);
        }
    }
}

/// Forward inbound frames to the registry until the link dies, then report
/// the loss. Frames arrive and dispatch strictly in receipt order.
async fn pump(inner: Arc<Inner>, generation: u64, mut link: Link) {
    while let Some(inbound) = link.recv().await {
        match inbound {
            Inbound::Frame(ServerFrame::Message {
                subscription, body, ..
            }) => inner.registry.dispatch(&subscription, body),
            Inbound::Frame(ServerFrame::Error { message }) => {
                // Protocol errors surface to the owner; reconnection is
                // driven only by an actual loss of the link.
                warn!(target: "tiffin::connection", %message, "broker error frame");
                let _ = inner.events.send(ClientEvent::Error(message));
            }
            Inbound::Frame(ServerFrame::Pong) | Inbound::Frame(ServerFrame::Connected) => {}
            Inbound::Failed(message) => {
                let _ = inner.events.send(ClientEvent::Error(message));
                break;
            }
        }
    }
    inner.apply_if_current(generation, LinkSignal::TransportLost);
}
