//! Transport seam between the connection manager and the broker. The manager
//! only ever sees typed frames flowing over channel halves; what carries them
//! (WebSocket in production, an in-memory pair in tests) is the connector's
//! business.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tiffin_wire::{ClientFrame, ServerFrame};

use crate::error::NotifyError;

pub mod pair;
pub mod websocket;

pub use websocket::WebSocketConnector;

/// Inbound side of a link: frames until the link dies. A fatal transport or
/// protocol failure is reported once, then the stream ends.
#[derive(Debug)]
pub enum Inbound {
    Frame(ServerFrame),
    Failed(String),
}

/// A live, authenticated link to the broker. Dropping the link aborts its
/// pump tasks.
pub struct Link {
    tx: mpsc::UnboundedSender<ClientFrame>,
    rx: mpsc::UnboundedReceiver<Inbound>,
    tasks: Vec<JoinHandle<()>>,
}

impl Link {
    pub fn new(
        tx: mpsc::UnboundedSender<ClientFrame>,
        rx: mpsc::UnboundedReceiver<Inbound>,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self { tx, rx, tasks }
    }

    /// Handle for the outbound direction; stays valid until the link dies.
    pub fn sender(&self) -> mpsc::UnboundedSender<ClientFrame> {
        self.tx.clone()
    }

    pub fn send(&self, frame: ClientFrame) -> Result<(), NotifyError> {
        self.tx
            .send(frame)
            .map_err(|_| NotifyError::Transport("link closed".into()))
    }

    pub async fn recv(&mut self) -> Option<Inbound> {
        self.rx.recv().await
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Dials the broker and completes the authentication handshake, returning a
/// link that is ready for subscriptions.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        token: Option<String>,
        heartbeat: Duration,
    ) -> Result<Link, NotifyError>;
}
