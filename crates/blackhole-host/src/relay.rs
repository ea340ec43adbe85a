//! Relay client (spec §4.4): the host's single outbound uplink to an
//! optional relay process.
//!
//! Grounded on `other_examples/bc972b27` `mac-client/src/relay-connection.rs`
//! (same author as the teacher, opposite end of this exact wire — a
//! `tokio-tungstenite` client with a `run()` reconnect loop and a command
//! channel for outgoing sends) and on `pty-proxy`'s reconnect-interval
//! pattern, generalized to the doubling backoff spec §4.4/§5 specifies.

use std::sync::Arc;
use std::time::Duration;

use blackhole_protocol::{decode_message_binary, decode_message_text, encode_message, EncodedMessage, Frame};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// The relay uplink's connection state (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Disabled,
    Connecting,
    Connected,
    Reconnecting,
}

/// Events the relay client raises for the host controller to fold into
/// its broadcast/reply logic.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    StateChanged(RelayState),
    Frame(Frame),
}

enum RelayCommand {
    Send(Frame),
    SetEnabled(bool),
    Stop,
}

/// Outbound uplink to a relay. At most one socket is ever open.
#[derive(Clone)]
pub struct RelayClient {
    inner: Arc<Inner>,
    cmd_tx: mpsc::UnboundedSender<RelayCommand>,
}

struct Inner {
    state: RwLock<RelayState>,
    session_id: RwLock<Option<String>>,
}

impl RelayClient {
    /// Construct and start the relay client's background task. Connection
    /// begins immediately iff `enabled` (mirrors `set_enabled(true)` from a
    /// `Disabled` state per spec §4.4).
    pub fn spawn(
        base_url: String,
        token: Option<String>,
        enabled: bool,
        event_tx: mpsc::UnboundedSender<RelayEvent>,
    ) -> Self {
        let inner = Arc::new(Inner {
            state: RwLock::new(if enabled { RelayState::Connecting } else { RelayState::Disabled }),
            session_id: RwLock::new(None),
        });
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let client = Self { inner: inner.clone(), cmd_tx: cmd_tx.clone() };
        tokio::spawn(run(base_url, token, enabled, inner, cmd_rx, event_tx));
        client
    }

    pub async fn state(&self) -> RelayState {
        *self.inner.state.read().await
    }

    pub async fn session_id(&self) -> Option<String> {
        self.inner.session_id.read().await.clone()
    }

    /// Send a frame to the relay, if connected. Silently dropped while
    /// disconnected — there is no retransmission of in-flight frames
    /// (spec §7: "no in-flight frames are retried").
    pub fn send(&self, frame: Frame) {
        let _ = self.cmd_tx.send(RelayCommand::Send(frame));
    }

    pub fn set_enabled(&self, enabled: bool) {
        let _ = self.cmd_tx.send(RelayCommand::SetEnabled(enabled));
    }

    pub fn stop(&self) {
        let _ = self.cmd_tx.send(RelayCommand::Stop);
    }
}

async fn set_state(inner: &Inner, event_tx: &mpsc::UnboundedSender<RelayEvent>, state: RelayState) {
    *inner.state.write().await = state;
    let _ = event_tx.send(RelayEvent::StateChanged(state));
}

fn build_url(base: &str, role: &str, session: Option<&str>, token: Option<&str>) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("role", role);
        if let Some(session) = session {
            pairs.append_pair("session", session);
        }
        if let Some(token) = token {
            pairs.append_pair("token", token);
        }
    }
    Ok(url.to_string())
}

async fn run(
    base_url: String,
    token: Option<String>,
    mut enabled: bool,
    inner: Arc<Inner>,
    mut cmd_rx: mpsc::UnboundedReceiver<RelayCommand>,
    event_tx: mpsc::UnboundedSender<RelayEvent>,
) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if !enabled {
            set_state(&inner, &event_tx, RelayState::Disabled).await;
            match cmd_rx.recv().await {
                Some(RelayCommand::SetEnabled(true)) => {
                    enabled = true;
                    backoff = INITIAL_BACKOFF;
                    set_state(&inner, &event_tx, RelayState::Connecting).await;
                    continue;
                }
                Some(RelayCommand::SetEnabled(false)) => continue,
                Some(RelayCommand::Send(_)) => continue,
                Some(RelayCommand::Stop) | None => return,
            }
        }

        set_state(&inner, &event_tx, RelayState::Connecting).await;
        let session = inner.session_id.read().await.clone();
        let url = match build_url(&base_url, "horizon", session.as_deref(), token.as_deref()) {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "invalid relay URL, disabling relay uplink");
                enabled = false;
                continue;
            }
        };

        match tokio_tungstenite::connect_async(&url).await {
            Ok((ws, _response)) => {
                info!(url = %url, "relay connected");
                set_state(&inner, &event_tx, RelayState::Connected).await;
                backoff = INITIAL_BACKOFF;

                let outcome = drive_connection(ws, &inner, &mut cmd_rx, &event_tx).await;
                match outcome {
                    ConnectionOutcome::Disabled => {
                        enabled = false;
                        continue;
                    }
                    ConnectionOutcome::Stopped => return,
                    ConnectionOutcome::Dropped => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "relay connect failed");
            }
        }

        set_state(&inner, &event_tx, RelayState::Reconnecting).await;
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(RelayCommand::SetEnabled(false)) => { enabled = false; continue; }
                    Some(RelayCommand::Stop) | None => return,
                    _ => {}
                }
            }
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

enum ConnectionOutcome {
    Dropped,
    Disabled,
    Stopped,
}

async fn drive_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    inner: &Arc<Inner>,
    cmd_rx: &mut mpsc::UnboundedReceiver<RelayCommand>,
    event_tx: &mpsc::UnboundedSender<RelayEvent>,
) -> ConnectionOutcome {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(bytes))) => {
                        if let Some(frame) = decode_message_binary(&bytes) {
                            handle_inbound(inner, event_tx, frame).await;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        let frame = decode_message_text(&text);
                        handle_inbound(inner, event_tx, frame).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => return ConnectionOutcome::Dropped,
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "relay socket error");
                        return ConnectionOutcome::Dropped;
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(RelayCommand::Send(frame)) => {
                        if let Ok(encoded) = encode_message(&frame) {
                            let msg = match encoded {
                                EncodedMessage::Binary(b) => Message::Binary(b.into()),
                                EncodedMessage::Text(t) => Message::Text(t.into()),
                            };
                            if write.send(msg).await.is_err() {
                                return ConnectionOutcome::Dropped;
                            }
                        }
                    }
                    Some(RelayCommand::SetEnabled(false)) => {
                        let _ = write.send(Message::Close(None)).await;
                        return ConnectionOutcome::Disabled;
                    }
                    Some(RelayCommand::SetEnabled(true)) => {}
                    Some(RelayCommand::Stop) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        return ConnectionOutcome::Stopped;
                    }
                }
            }
        }
    }
}

async fn handle_inbound(inner: &Arc<Inner>, event_tx: &mpsc::UnboundedSender<RelayEvent>, frame: Frame) {
    if let Frame::SessionAssigned { ref session_id } = frame {
        *inner.session_id.write().await = Some(session_id.clone());
    }
    let _ = event_tx.send(RelayEvent::Frame(frame));
}

#[allow(dead_code)]
fn backoff_sequence_for_test(attempts: usize) -> Vec<Duration> {
    let mut backoff = INITIAL_BACKOFF;
    let mut out = Vec::with_capacity(attempts);
    for _ in 0..attempts {
        out.push(backoff);
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_monotone_and_clamped() {
        // Invariant 8: 2, 4, 8, 10, 10, ...
        let seq = backoff_sequence_for_test(6);
        let expected = [2u64, 4, 8, 10, 10, 10];
        for (got, want) in seq.iter().zip(expected.iter()) {
            assert_eq!(got.as_secs(), *want);
        }
    }

    #[test]
    fn build_url_copies_query_and_appends_role() {
        let url = build_url("wss://r.example?foo=bar", "horizon", None, Some("tok")).unwrap();
        assert!(url.contains("foo=bar"));
        assert!(url.contains("role=horizon"));
        assert!(url.contains("token=tok"));
        assert!(!url.contains("session="));
    }

    #[test]
    fn build_url_includes_session_on_reconnect() {
        let url = build_url("wss://r.example", "horizon", Some("AB12CD"), None).unwrap();
        assert!(url.contains("session=AB12CD"));
    }
}
