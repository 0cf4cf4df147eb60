//! In-memory link pair and a scriptable connector for tests. No sockets, no
//! handshake; the link is born authenticated.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use tiffin_wire::{ClientFrame, ServerFrame};

use super::{BrokerConnector, Inbound, Link};
use crate::error::NotifyError;

/// Create a connected in-memory link and the broker-side end driving it.
pub fn link_pair() -> (Link, BrokerEnd) {
    let (tx_out, rx_out) = mpsc::unbounded_channel::<ClientFrame>();
    let (tx_in, rx_in) = mpsc::unbounded_channel::<Inbound>();
    (
        Link::new(tx_out, rx_in, Vec::new()),
        BrokerEnd {
            rx: rx_out,
            tx: tx_in,
        },
    )
}

/// The broker side of an in-memory link. Dropping it hangs the link up.
pub struct BrokerEnd {
    rx: mpsc::UnboundedReceiver<ClientFrame>,
    tx: mpsc::UnboundedSender<Inbound>,
}

impl BrokerEnd {
    pub async fn next_frame(&mut self) -> Option<ClientFrame> {
        self.rx.recv().await
    }

    /// Deliver a frame to the client; `false` once the client is gone.
    pub fn push(&self, frame: ServerFrame) -> bool {
        self.tx.send(Inbound::Frame(frame)).is_ok()
    }

    /// Report a fatal link failure to the client.
    pub fn fail(&self, message: &str) {
        let _ = self.tx.send(Inbound::Failed(message.to_string()));
    }
}

/// Connector handing out in-memory links, with scriptable dial refusals.
pub struct ScriptedConnector {
    refusals: Mutex<VecDeque<String>>,
    dials: Mutex<Vec<Option<String>>>,
    ends: mpsc::UnboundedSender<BrokerEnd>,
}

impl ScriptedConnector {
    /// Returns the connector and the stream of broker ends, one per
    /// successful dial.
    pub fn new() -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<BrokerEnd>) {
        let (ends, end_rx) = mpsc::unbounded_channel();
        (
            std::sync::Arc::new(Self {
                refusals: Mutex::new(VecDeque::new()),
                dials: Mutex::new(Vec::new()),
                ends,
            }),
            end_rx,
        )
    }

    /// Queue a refusal for the next dial; call repeatedly to refuse several.
    pub fn refuse_next(&self, message: &str) {
        self.refusals.lock().push_back(message.to_string());
    }

    /// Tokens presented so far, one entry per dial in order.
    pub fn dial_tokens(&self) -> Vec<Option<String>> {
        self.dials.lock().clone()
    }

    pub fn dial_count(&self) -> usize {
        self.dials.lock().len()
    }
}

#[async_trait]
impl BrokerConnector for ScriptedConnector {
    async fn connect(
        &self,
        _url: &str,
        token: Option<String>,
        _heartbeat: Duration,
    ) -> Result<Link, NotifyError> {
        self.dials.lock().push(token);
        if let Some(message) = self.refusals.lock().pop_front() {
            return Err(NotifyError::Transport(message));
        }
        let (link, end) = link_pair();
        let _ = self.ends.send(end);
        Ok(link)
    }
}
