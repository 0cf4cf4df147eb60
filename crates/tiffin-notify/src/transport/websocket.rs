use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use tiffin_wire::{ClientFrame, ServerFrame};

use super::{BrokerConnector, Inbound, Link};
use crate::error::NotifyError;

/// How long the broker gets to answer the `Connect` frame.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Production connector: JSON text frames over WebSocket.
pub struct WebSocketConnector;

#[async_trait]
impl BrokerConnector for WebSocketConnector {
    async fn connect(
        &self,
        url: &str,
        token: Option<String>,
        heartbeat: Duration,
    ) -> Result<Link, NotifyError> {
        let parsed =
            Url::parse(url).map_err(|err| NotifyError::InvalidConfig(format!("broker url: {err}")))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(NotifyError::InvalidConfig(format!(
                "broker url must be ws:// or wss://, got {url}"
            )));
        }

        debug!(target: "tiffin::transport", %url, "dialing broker");
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|err| NotifyError::Transport(err.to_string()))?;

        let (tx_out, rx_out) = mpsc::unbounded_channel::<ClientFrame>();
        let (tx_in, rx_in) = mpsc::unbounded_channel::<Inbound>();

        let io_task = tokio::spawn(run_link(ws_stream, rx_out, tx_in, heartbeat));

        // Keepalive pings ride the same outbound queue as application frames.
        let tx_ping = tx_out.clone();
        let ping_task = tokio::spawn(async move {
            let mut ticker = interval(heartbeat);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                if tx_ping.send(ClientFrame::Ping).is_err() {
                    break;
                }
            }
        });

        let mut link = Link::new(tx_out, rx_in, vec![io_task, ping_task]);

        link.send(ClientFrame::Connect { token })?;
        match timeout(HANDSHAKE_TIMEOUT, link.recv()).await {
            Ok(Some(Inbound::Frame(ServerFrame::Connected))) => Ok(link),
            Ok(Some(Inbound::Frame(ServerFrame::Error { message }))) => {
                Err(NotifyError::Handshake(message))
            }
            Ok(Some(Inbound::Frame(other))) => Err(NotifyError::Handshake(format!(
                "unexpected frame before CONNECTED: {other:?}"
            ))),
            Ok(Some(Inbound::Failed(message))) => Err(NotifyError::Transport(message)),
            Ok(None) => Err(NotifyError::Transport(
                "connection closed during handshake".into(),
            )),
            Err(_) => Err(NotifyError::Handshake("timed out waiting for CONNECTED".into())),
        }
    }
}

async fn run_link(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx_out: mpsc::UnboundedReceiver<ClientFrame>,
    tx_in: mpsc::UnboundedSender<Inbound>,
    heartbeat: Duration,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx_out.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(_) => continue,
            };
            if ws_sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // A healthy broker answers pings within one interval; two silent
    // intervals mean a missed heartbeat and the link is treated as lost.
    let idle_limit = heartbeat * 2;
    loop {
        let msg = match timeout(idle_limit, ws_receiver.next()).await {
            Err(_) => {
                let _ = tx_in.send(Inbound::Failed(format!(
                    "no broker traffic for {idle_limit:?}"
                )));
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                let _ = tx_in.send(Inbound::Failed(err.to_string()));
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };
        match msg {
            Message::Text(text) => match serde_json::from_str::<ServerFrame>(&text) {
                Ok(frame) => {
                    if tx_in.send(Inbound::Frame(frame)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(target: "tiffin::transport", %err, "malformed broker frame");
                    let _ = tx_in.send(Inbound::Failed(format!("malformed broker frame: {err}")));
                    break;
                }
            },
            Message::Close(_) => break,
            // Ping/Pong/Binary are handled (or ignored) by tungstenite.
            _ => {}
        }
    }

    send_task.abort();
}
