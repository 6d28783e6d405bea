//! Connection manager: owns one WebSocket for the lifetime of a chat view.
//!
//! [`Connection::connect`] returns at once in `Connecting`; a spawned I/O task
//! performs the handshake and then pumps frames in both directions. The owner
//! learns about the socket only through [`ConnectionEvent`]s. There is no
//! reconnection: once `Closed`, a connection stays closed and a new one must be
//! created.

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::endpoint::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Events delivered to the connection's owner, in socket order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Fragment(String),
    /// Handshake failure, remote close, or local close.
    Closed { reason: Option<String> },
}

pub struct Connection {
    state: watch::Receiver<ConnectionState>,
    outbound: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Connection {
    /// Open a new connection. Must be called inside a tokio runtime.
    pub fn connect(endpoint: &Endpoint, events: mpsc::Sender<ConnectionEvent>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let io = ConnectionIo {
            url: endpoint.as_str().to_string(),
            label: endpoint.redacted(),
            state: state_tx,
            outbound: outbound_rx,
            events,
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(io.run());

        Self {
            state: state_rx,
            outbound: outbound_tx,
            shutdown,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Queue one text frame. Silently dropped unless the connection is open.
    ///
    /// Returns whether the frame was queued; callers that want feedback should
    /// check [`is_open`](Self::is_open) first.
    pub fn send(&self, frame: String) -> bool {
        if !self.is_open() {
            debug!(bytes = frame.len(), state = ?self.state(), "connection not open, dropping frame");
            return false;
        }
        match self.outbound.send(frame) {
            Ok(()) => true,
            Err(_) => {
                debug!("connection task has exited, dropping frame");
                false
            }
        }
    }

    /// Release the socket and wait for the I/O task to finish. Idempotent.
    pub async fn close(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "connection task panicked");
            }
        }
    }

}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct ConnectionIo {
    url: String,
    label: String,
    state: watch::Sender<ConnectionState>,
    outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<ConnectionEvent>,
    shutdown: CancellationToken,
}

impl ConnectionIo {
    async fn run(mut self) {
        debug!(endpoint = %self.label, "connecting");

        let handshake = tokio::select! {
            _ = self.shutdown.cancelled() => None,
            result = tokio_tungstenite::connect_async(self.url.as_str()) => Some(result),
        };
        let ws = match handshake {
            None => return self.finish(None).await,
            Some(Ok((ws, _response))) => ws,
            Some(Err(e)) => {
                warn!(endpoint = %self.label, error = %e, "websocket handshake failed");
                return self.finish(Some(e.to_string())).await;
            }
        };

        self.state.send_replace(ConnectionState::Open);
        info!(endpoint = %self.label, "connection open");
        if !self.deliver(ConnectionEvent::Opened).await {
            return self.finish(None).await;
        }

        let (mut write, mut read) = ws.split();
        let reason = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "close frame not sent");
                    }
                    break None;
                }
                frame = self.outbound.recv() => {
                    let Some(frame) = frame else { break None };
                    let bytes = frame.len();
                    if let Err(e) = write.send(Message::Text(frame.into())).await {
                        break Some(e.to_string());
                    }
                    debug!(bytes, "frame sent");
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !self.deliver(ConnectionEvent::Fragment(text.as_str().to_owned())).await {
                            break None;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| f.reason.as_str().to_owned())
                            .filter(|reason| !reason.is_empty());
                    }
                    // pings are answered by tungstenite; binary frames are not fragments
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break None,
                },
            }
        };

        self.finish(reason).await;
    }

    /// Deliver an event unless the owner is gone or shutdown was requested.
    async fn deliver(&self, event: ConnectionEvent) -> bool {
        tokio::select! {
            sent = self.events.send(event) => sent.is_ok(),
            _ = self.shutdown.cancelled() => false,
        }
    }

    async fn finish(self, reason: Option<String>) {
        self.state.send_replace(ConnectionState::Closed);
        info!(endpoint = %self.label, reason = reason.as_deref().unwrap_or("-"), "connection closed");

        // the owner may be blocked in close() and no longer draining events
        let event = ConnectionEvent::Closed { reason };
        let permit = tokio::select! {
            permit = self.events.reserve() => permit.ok(),
            _ = self.shutdown.cancelled() => None,
        };
        match permit {
            Some(permit) => permit.send(event),
            None => {
                let _ = self.events.try_send(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn unused_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn refused_handshake_closes() {
        let port = unused_port().await;
        let endpoint = Endpoint::new(&format!("ws://127.0.0.1:{port}/ws/chat"), "t").unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let conn = Connection::connect(&endpoint, tx);
        assert_ne!(conn.state(), ConnectionState::Open);

        let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(matches!(event, Some(ConnectionEvent::Closed { reason: Some(_) })));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn send_before_open_is_dropped() {
        let port = unused_port().await;
        let endpoint = Endpoint::new(&format!("ws://127.0.0.1:{port}/ws"), "t").unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let mut conn = Connection::connect(&endpoint, tx);

        let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(matches!(event, Some(ConnectionEvent::Closed { .. })));

        assert!(!conn.send("{}".to_string()));
        conn.close().await;
        conn.close().await;
        assert!(!conn.send("{}".to_string()));
    }

    #[tokio::test]
    async fn close_completes_while_closed_event_is_pending() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = ws.send(Message::Close(None)).await;
            while ws.next().await.is_some() {}
        });

        let endpoint = Endpoint::new(&format!("ws://{addr}/ws"), "t").unwrap();
        // room for Opened only; nobody drains it, so the Closed event cannot be queued
        let (tx, mut rx) = mpsc::channel(1);
        let mut conn = Connection::connect(&endpoint, tx);

        timeout(Duration::from_secs(5), async {
            while conn.state() != ConnectionState::Closed {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        timeout(Duration::from_secs(2), conn.close())
            .await
            .expect("close hung waiting on the event channel");
        assert_eq!(rx.recv().await, Some(ConnectionEvent::Opened));
    }
}
