//! Player duplex-socket transport.
//!
//! Binds a single WebSocket endpoint (`/ws`) that accepts at most one live
//! peer: a new connection replaces (and closes) any prior one. Rather than
//! the setter-callback wiring this crate's teacher uses for its event
//! bridge, connect/disconnect/message notifications are delivered over an
//! unbounded channel — this avoids a reload racing a stale callback against
//! a freshly rebuilt recovery engine (see the design notes on lifecycle
//! safety).

mod messages;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use messages::{PlayerMessage, ServerMessage};

/// Events surfaced to whatever owns the transport (the recovery engine).
#[derive(Debug)]
pub enum TransportEvent {
    /// A player connected, replacing any prior connection.
    Connected,
    /// The player disconnected (or was replaced).
    Disconnected,
    /// A message arrived from the player.
    Message(PlayerMessage),
}

struct LivePeer {
    outbound: mpsc::UnboundedSender<ServerMessage>,
    cancel: CancellationToken,
    generation: u64,
}

/// Owns the single live player connection and the router for `/ws`.
pub struct PlayerTransport {
    peer: RwLock<Option<LivePeer>>,
    next_generation: AtomicU64,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl PlayerTransport {
    /// Creates a new transport, returning it alongside the receiver that
    /// the recovery engine drains for connect/disconnect/message events.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                peer: RwLock::new(None),
                next_generation: AtomicU64::new(1),
                events_tx,
            }),
            events_rx,
        )
    }

    /// Builds the router exposing the `/ws` endpoint.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/ws", get(upgrade_handler))
            .with_state(Arc::clone(self))
    }

    /// Returns whether a player is currently connected.
    pub fn is_connected(&self) -> bool {
        self.peer.read().is_some()
    }

    /// Sends a message to the connected player.
    ///
    /// If no player is connected, the message is dropped with a warning —
    /// per the transport contract, sends are never queued for a future
    /// connection (recovery re-issues commands on reconnect instead).
    pub fn send(&self, message: ServerMessage) {
        let peer = self.peer.read();
        match peer.as_ref() {
            Some(p) => {
                if p.outbound.send(message).is_err() {
                    log::warn!("[Transport] player channel closed, dropping message");
                }
            }
            None => {
                log::warn!("[Transport] no player connected, dropping message");
            }
        }
    }

    fn adopt(self: &Arc<Self>, outbound: mpsc::UnboundedSender<ServerMessage>) -> (u64, CancellationToken) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let mut slot = self.peer.write();
        if let Some(prior) = slot.take() {
            log::info!("[Transport] replacing existing player connection");
            prior.cancel.cancel();
        }
        *slot = Some(LivePeer {
            outbound,
            cancel: cancel.clone(),
            generation,
        });
        (generation, cancel)
    }

    fn release(&self, generation: u64) {
        let mut slot = self.peer.write();
        if matches!(slot.as_ref(), Some(p) if p.generation == generation) {
            *slot = None;
        }
    }

    fn emit(&self, event: TransportEvent) {
        if self.events_tx.send(event).is_err() {
            log::trace!("[Transport] no event receiver, dropping event");
        }
    }
}

async fn upgrade_handler(
    State(transport): State<Arc<PlayerTransport>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(transport, socket))
}

async fn handle_socket(transport: Arc<PlayerTransport>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (generation, cancel) = transport.adopt(outbound_tx);

    transport.emit(TransportEvent::Connected);

    let write_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    maybe_msg = outbound_rx.recv() => {
                        match maybe_msg {
                            Some(msg) => {
                                let encoded = match serde_json::to_string(&msg) {
                                    Ok(s) => s,
                                    Err(e) => {
                                        log::warn!("[Transport] failed to encode message: {}", e);
                                        continue;
                                    }
                                };
                                if sink.send(Message::Text(encoded.into())).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        })
    };

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            maybe_msg = stream.next() => {
                match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<PlayerMessage>(&text) {
                            Ok(parsed) => transport.emit(TransportEvent::Message(parsed)),
                            Err(e) => log::warn!("[Transport] dropping unparseable message: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("[Transport] socket read error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    write_task.abort();
    transport.release(generation);
    transport.emit(TransportEvent::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_without_connection_is_dropped_not_queued() {
        let (transport, mut events) = PlayerTransport::new();
        assert!(!transport.is_connected());
        transport.send(ServerMessage::RetryCurrent);
        // No connection ever existed, so no event and nothing was buffered.
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn adopting_a_new_peer_cancels_the_prior_one() {
        let (transport, _events) = PlayerTransport::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (_gen1, cancel1) = transport.adopt(tx1);
        assert!(!cancel1.is_cancelled());

        let (tx2, _rx2) = mpsc::unbounded_channel();
        let (_gen2, _cancel2) = transport.adopt(tx2);
        assert!(cancel1.is_cancelled());
    }

    #[tokio::test]
    async fn release_is_a_no_op_for_a_stale_generation() {
        let (transport, _events) = PlayerTransport::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (gen1, _cancel1) = transport.adopt(tx1);

        let (tx2, _rx2) = mpsc::unbounded_channel();
        let (_gen2, _cancel2) = transport.adopt(tx2);

        // Releasing the now-replaced generation must not clear the new peer.
        transport.release(gen1);
        assert!(transport.is_connected());
    }
}
