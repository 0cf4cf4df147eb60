//! End-to-end round trip against an in-process WebSocket broker: handshake,
//! role subscription, message delivery, ledger and bridge effects.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use tiffin_notify::auth::StaticToken;
use tiffin_notify::bridge::{NotificationSink, SilentCue, Toast, ToastKind};
use tiffin_notify::config::RealtimeConfig;
use tiffin_notify::connection::{ClientEvent, ConnectionManager};
use tiffin_notify::notifier::OrderNotifier;
use tiffin_notify::state::ConnectionState;
use tiffin_notify::transport::WebSocketConnector;
use tiffin_wire::{ClientFrame, ServerFrame, UserIdentity, UserRole};

struct ChannelSink(mpsc::UnboundedSender<Toast>);

impl NotificationSink for ChannelSink {
    fn toast(&self, toast: Toast) {
        let _ = self.0.send(toast);
    }
    fn badge(&self, _unread: usize) {}
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_socket)
}

/// Minimal broker: authenticates `valid-token`, answers pings, and pushes a
/// canned NEW_ORDER the moment anything subscribes.
async fn handle_socket(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<ClientFrame>(&text) else {
            continue;
        };
        let reply = match frame {
            ClientFrame::Connect { token } => {
                if token.as_deref() == Some("valid-token") {
                    ServerFrame::Connected
                } else {
                    ServerFrame::Error {
                        message: "bad credentials".into(),
                    }
                }
            }
            ClientFrame::Subscribe { id, destination } => ServerFrame::Message {
                subscription: id,
                destination,
                body: json!({
                    "type": "NEW_ORDER",
                    "orderId": 7,
                    "orderNumber": "A-7",
                    "message": "New order received!",
                    "timestamp": "2026-08-06T12:00:00"
                }),
            },
            ClientFrame::Ping => ServerFrame::Pong,
            ClientFrame::Unsubscribe { .. } | ClientFrame::Publish { .. } => continue,
        };
        let Ok(json) = serde_json::to_string(&reply) else {
            continue;
        };
        if socket.send(Message::Text(json)).await.is_err() {
            break;
        }
    }
}

async fn silent_ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_silent_socket)
}

/// Broker that authenticates and then never speaks again; pings included.
async fn handle_silent_socket(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        if let Ok(ClientFrame::Connect { .. }) = serde_json::from_str::<ClientFrame>(&text) {
            let Ok(json) = serde_json::to_string(&ServerFrame::Connected) else {
                break;
            };
            if socket.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    }
}

async fn spawn_broker() -> Result<SocketAddr> {
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/silent", get(silent_ws_handler));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

fn config_for(addr: SocketAddr) -> RealtimeConfig {
    RealtimeConfig {
        broker_url: format!("ws://{addr}/ws"),
        reconnect_delay: Duration::from_millis(50),
        max_reconnect_attempts: 3,
        heartbeat_interval: Duration::from_millis(500),
    }
}

#[tokio::test]
async fn vendor_roundtrip_over_websocket() -> Result<()> {
    init_tracing();
    let addr = spawn_broker().await?;
    let (toast_tx, mut toasts) = mpsc::unbounded_channel();
    let notifier = OrderNotifier::new(
        config_for(addr),
        Arc::new(WebSocketConnector),
        Arc::new(StaticToken::new("valid-token")),
        Arc::new(ChannelSink(toast_tx)),
        Arc::new(SilentCue),
    );

    notifier.login(UserIdentity::new(7, UserRole::Vendor));

    let toast = timeout(Duration::from_secs(5), toasts.recv())
        .await?
        .expect("toast channel closed");
    assert_eq!(toast.kind, ToastKind::Success);
    assert_eq!(toast.text, "New order received! - Order #A-7");

    assert!(notifier.is_connected());
    assert_eq!(notifier.unread_count(), 1);
    let records = notifier.notifications();
    assert_eq!(records[0].order_id, 7);
    assert_eq!(records[0].timestamp, "2026-08-06T12:00:00");
    assert!(!records[0].read);

    notifier.logout();
    assert_eq!(notifier.connection_state(), ConnectionState::Disconnected);
    assert!(notifier.notifications().is_empty());
    Ok(())
}

#[tokio::test]
async fn silent_broker_is_detected_within_a_missed_heartbeat() -> Result<()> {
    init_tracing();
    let addr = spawn_broker().await?;
    let config = RealtimeConfig {
        broker_url: format!("ws://{addr}/silent"),
        reconnect_delay: Duration::from_millis(30),
        max_reconnect_attempts: 1,
        heartbeat_interval: Duration::from_millis(100),
    };
    let (manager, mut events) = ConnectionManager::new(
        config,
        Arc::new(WebSocketConnector),
        Arc::new(StaticToken::new("valid-token")),
    );
    manager.connect();

    let mut saw_watchdog = false;
    loop {
        match timeout(Duration::from_secs(5), events.recv())
            .await?
            .expect("event channel closed")
        {
            ClientEvent::Connected | ClientEvent::Disconnected => {}
            ClientEvent::Error(message) => {
                if message.contains("no broker traffic") {
                    saw_watchdog = true;
                }
            }
            ClientEvent::ReconnectScheduled { attempt } => {
                assert_eq!(attempt, 1);
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(saw_watchdog, "loss must be detected by the heartbeat watchdog");
    manager.disconnect();
    Ok(())
}

#[tokio::test]
async fn rejected_handshake_follows_the_reconnect_path() -> Result<()> {
    init_tracing();
    let addr = spawn_broker().await?;
    let mut config = config_for(addr);
    config.reconnect_delay = Duration::from_millis(20);
    config.max_reconnect_attempts = 1;
    let (manager, mut events) = ConnectionManager::new(
        config,
        Arc::new(WebSocketConnector),
        Arc::new(StaticToken::new("wrong-token")),
    );
    manager.connect();

    let mut saw_handshake_error = false;
    let mut saw_schedule = false;
    loop {
        match timeout(Duration::from_secs(5), events.recv())
            .await?
            .expect("event channel closed")
        {
            ClientEvent::Error(message) => {
                if message.contains("bad credentials") {
                    saw_handshake_error = true;
                }
            }
            ClientEvent::ReconnectScheduled { .. } => saw_schedule = true,
            ClientEvent::ReconnectExhausted { .. } => break,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(saw_handshake_error);
    assert!(saw_schedule);
    assert_eq!(manager.state(), ConnectionState::ReconnectExhausted);
    Ok(())
}
