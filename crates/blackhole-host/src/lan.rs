//! LAN listener (spec §4.3).
//!
//! Accepts WebSocket peers directly on the LAN, the way `relay-server`
//! accepts browser WebSocket peers in `src/state.rs` — generalized from a
//! DashMap keyed by session *code* to one keyed by peer id, since here
//! every accepted peer belongs to the same host.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use blackhole_protocol::{decode_message_binary, decode_message_text, encode_message, EncodedMessage, Frame};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{HostError, Result};

/// A frame destined for exactly one LAN peer, or the inbound event a peer
/// produced. `inbound_tx` carries [`LanInbound`] to the host controller;
/// the host controller answers by calling [`LanListener::send_to`] or
/// [`LanListener::broadcast`].
#[derive(Debug, Clone)]
pub struct LanInbound {
    pub peer_id: String,
    pub frame: Frame,
}

/// A connected peer's outbound frame sender plus a one-shot kill switch
/// the controller can fire to forcibly close it (spec §4.5/S4: an
/// unsupported-version peer gets an `error` frame and is disconnected).
struct PeerHandle {
    tx: mpsc::UnboundedSender<Frame>,
    kill: oneshot::Sender<()>,
}

#[derive(Clone)]
struct LanState {
    peers: Arc<DashMap<String, PeerHandle>>,
    inbound_tx: mpsc::UnboundedSender<LanInbound>,
}

/// Owns the set of accepted LAN peers and the axum server task.
pub struct LanListener {
    peers: Arc<DashMap<String, PeerHandle>>,
}

impl LanListener {
    /// Bind and start serving on `0.0.0.0:{port}`. Frames decoded from
    /// peers are forwarded on `inbound_tx`; the host controller is
    /// expected to drive replies via `send_to`/`broadcast`.
    pub async fn bind(port: u16, inbound_tx: mpsc::UnboundedSender<LanInbound>) -> Result<Self> {
        let peers = Arc::new(DashMap::new());
        let state = LanState { peers: peers.clone(), inbound_tx };

        let app = Router::new().route("/", get(ws_handler)).with_state(state);
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| HostError::LanBind { port, source: e })?;

        info!(port, "LAN listener bound");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!(error = %e, "LAN listener server task ended");
            }
        });

        Ok(Self { peers })
    }

    /// Send one frame to every currently connected peer. Peers whose send
    /// fails (channel closed — they've disconnected) are dropped from the
    /// set; no history is replayed to anyone (spec §3 invariant).
    pub fn broadcast(&self, frame: &Frame) {
        self.peers.retain(|peer_id, handle| {
            let ok = handle.tx.send(frame.clone()).is_ok();
            if !ok {
                debug!(peer_id = %peer_id, "dropping disconnected peer from broadcast set");
            }
            ok
        });
    }

    /// Send one frame to a single peer, if still connected.
    pub fn send_to(&self, peer_id: &str, frame: &Frame) {
        if let Some(handle) = self.peers.get(peer_id) {
            let _ = handle.tx.send(frame.clone());
        }
    }

    /// Forcibly close a peer's connection. A no-op if the peer is already
    /// gone. Used after sending a peer a protocol-version `error` frame
    /// (spec §4.5/S4), since such a peer must not stay connected.
    pub fn disconnect(&self, peer_id: &str) {
        if let Some((_, handle)) = self.peers.remove(peer_id) {
            let _ = handle.kill.send(());
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<LanState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: LanState) {
    let peer_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();
    let (kill_tx, mut kill_rx) = oneshot::channel::<()>();

    state.peers.insert(peer_id.clone(), PeerHandle { tx: out_tx, kill: kill_tx });
    info!(peer_id = %peer_id, "LAN peer connected");

    // Per spec §4.3: immediately push a session_list scoped to this peer.
    // Reuse the same code path a client-issued `list` takes by synthesizing
    // one, rather than duplicating the "build session_list" logic here.
    let _ = state.inbound_tx.send(LanInbound { peer_id: peer_id.clone(), frame: Frame::List });

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let encoded = match encode_message(&frame) {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "failed to encode outgoing frame");
                    continue;
                }
            };
            let msg = match encoded {
                EncodedMessage::Binary(bytes) => Message::Binary(bytes.into()),
                EncodedMessage::Text(text) => Message::Text(text.into()),
            };
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let Some(msg) = msg else { break };
                let msg = match msg {
                    Ok(m) => m,
                    Err(_) => break,
                };
                let frame = match msg {
                    Message::Binary(bytes) => decode_message_binary(&bytes),
                    Message::Text(text) => Some(decode_message_text(&text)),
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) => None,
                };
                if let Some(frame) = frame {
                    let _ = state.inbound_tx.send(LanInbound { peer_id: peer_id.clone(), frame });
                }
            }
            _ = &mut kill_rx => {
                debug!(peer_id = %peer_id, "peer force-disconnected");
                break;
            }
        }
    }

    state.peers.remove(&peer_id);
    writer_task.abort();
    info!(peer_id = %peer_id, "LAN peer disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Spec §8 invariant 6: every connected peer receives exactly one copy
    /// of a broadcast frame, and a disconnected peer is dropped from the
    /// set rather than left to accumulate.
    #[tokio::test]
    async fn broadcast_reaches_every_peer_once_and_drops_dead_ones() {
        let peers = Arc::new(DashMap::new());
        let listener = LanListener { peers: peers.clone() };

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        drop(rx_dead); // peer already gone; its channel is closed

        let (kill_a, _kill_a_rx) = oneshot::channel();
        let (kill_b, _kill_b_rx) = oneshot::channel();
        let (kill_dead, _kill_dead_rx) = oneshot::channel();

        peers.insert("a".to_string(), PeerHandle { tx: tx_a, kill: kill_a });
        peers.insert("b".to_string(), PeerHandle { tx: tx_b, kill: kill_b });
        peers.insert("dead".to_string(), PeerHandle { tx: tx_dead, kill: kill_dead });
        assert_eq!(listener.peer_count(), 3);

        let frame = Frame::SessionClosed { session_id: "s1".into() };
        listener.broadcast(&frame);

        assert_eq!(rx_a.recv().await, Some(frame.clone()));
        assert_eq!(rx_b.recv().await, Some(frame));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
        assert_eq!(listener.peer_count(), 2, "dead peer dropped from broadcast set");
    }

    #[test]
    fn send_to_targets_only_the_named_peer() {
        let peers = Arc::new(DashMap::new());
        let listener = LanListener { peers: peers.clone() };

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (kill_a, _kill_a_rx) = oneshot::channel();
        let (kill_b, _kill_b_rx) = oneshot::channel();
        peers.insert("a".to_string(), PeerHandle { tx: tx_a, kill: kill_a });
        peers.insert("b".to_string(), PeerHandle { tx: tx_b, kill: kill_b });

        listener.send_to("a", &Frame::List);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    /// Spec §4.5/S4: disconnecting a peer removes it from the set and
    /// fires its kill switch so the connection-handling task can tear
    /// the socket down.
    #[tokio::test]
    async fn disconnect_removes_peer_and_fires_kill_switch() {
        let peers = Arc::new(DashMap::new());
        let listener = LanListener { peers: peers.clone() };

        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (kill_a, kill_a_rx) = oneshot::channel();
        peers.insert("a".to_string(), PeerHandle { tx: tx_a, kill: kill_a });

        listener.disconnect("a");
        assert_eq!(listener.peer_count(), 0);
        assert_eq!(kill_a_rx.await, Ok(()));

        // disconnecting an already-gone peer is a no-op
        listener.disconnect("a");
    }
}
