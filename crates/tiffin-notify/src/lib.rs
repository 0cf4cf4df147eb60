//! Realtime order-notification client for the tiffin cafeteria platform.
//!
//! A persistent link to the order broker, role-keyed subscriptions, a capped
//! in-session notification ledger, and side-effect dispatch for the UI. The
//! REST API, views and token storage live elsewhere; this crate is embedded
//! in the larger client and handed its collaborators.

pub mod auth;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod ledger;
pub mod notifier;
pub mod registry;
pub mod state;
pub mod transport;

pub use auth::{StaticToken, TokenProvider};
pub use bridge::{CuePlayer, DispatchBridge, NotificationSink, SilentCue, TerminalBell, Toast, ToastKind};
pub use config::RealtimeConfig;
pub use connection::{ClientEvent, ConnectionManager};
pub use error::NotifyError;
pub use ledger::{NotificationLedger, NotificationRecord, LEDGER_CAPACITY};
pub use notifier::OrderNotifier;
pub use registry::{MessageHandler, SubscriptionId, SubscriptionRegistry};
pub use state::{ConnectionState, ReconnectPolicy};
pub use transport::{BrokerConnector, WebSocketConnector};
