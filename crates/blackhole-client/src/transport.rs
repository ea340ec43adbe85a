//! Transport client ("voyager", spec §4.6): one WebSocket to a LAN host
//! or relay URL, a 5s/20s heartbeat, and the same doubling reconnect
//! backoff as the host's relay client.
//!
//! Structured the same way as `blackhole-host`'s relay client (itself
//! grounded on `other_examples/bc972b27`'s `RelayClient`) — a
//! `run()` reconnect loop driven by a command channel — since this is
//! the opposite end of the same wire.

use std::sync::Arc;
use std::time::Duration;

use blackhole_protocol::{decode_message_binary, decode_message_text, encode_message, EncodedMessage, Frame};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Connecting,
    Open,
    Reconnecting,
}

#[derive(Debug, Clone)]
pub enum TransportEvent {
    StateChanged(TransportState),
    Frame(Frame),
    HeartbeatTimeout,
}

enum Command {
    Send(Frame),
    Disconnect,
    Reconnect,
}

#[derive(Clone)]
pub struct Transport {
    state: Arc<RwLock<TransportState>>,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

/// Builds the LAN URL verbatim (spec §6: no query parameters required).
pub fn lan_url(base: &str) -> String {
    base.to_string()
}

/// Builds the relay URL: base query params copied, `role=voyager`
/// appended, plus optional `session`/`token`.
pub fn relay_url(base: &str, session: Option<&str>, token: Option<&str>) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("role", "voyager");
        if let Some(session) = session {
            pairs.append_pair("session", session);
        }
        if let Some(token) = token {
            pairs.append_pair("token", token);
        }
    }
    Ok(url.to_string())
}

impl Transport {
    /// Connect to `url` and start the reconnect/heartbeat loop.
    /// `auto_reconnect` gates whether a lost connection is retried at
    /// all (spec §4.6).
    pub fn spawn(url: String, auto_reconnect: bool, event_tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        let state = Arc::new(RwLock::new(TransportState::Connecting));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(url, auto_reconnect, state.clone(), cmd_rx, event_tx));
        Self { state, cmd_tx }
    }

    pub async fn state(&self) -> TransportState {
        *self.state.read().await
    }

    pub fn send(&self, frame: Frame) {
        let _ = self.cmd_tx.send(Command::Send(frame));
    }

    /// User-triggered disconnect: clears `should_reconnect` so no
    /// reconnect is attempted until `reconnect()` is called again.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    pub fn reconnect(&self) {
        let _ = self.cmd_tx.send(Command::Reconnect);
    }
}

async fn set_state(state: &RwLock<TransportState>, event_tx: &mpsc::UnboundedSender<TransportEvent>, s: TransportState) {
    *state.write().await = s;
    let _ = event_tx.send(TransportEvent::StateChanged(s));
}

enum Outcome {
    LostConnection,
    HeartbeatTimedOut,
    ExplicitDisconnect,
}

async fn run(
    url: String,
    auto_reconnect: bool,
    state: Arc<RwLock<TransportState>>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut backoff = INITIAL_BACKOFF;
    let mut should_reconnect = true;

    loop {
        set_state(&state, &event_tx, TransportState::Connecting).await;
        match tokio_tungstenite::connect_async(&url).await {
            Ok((ws, _response)) => {
                info!(url = %url, "transport connected");
                set_state(&state, &event_tx, TransportState::Open).await;
                backoff = INITIAL_BACKOFF;

                let (mut write, mut read) = ws.split();
                if let Ok(EncodedMessage::Text(text)) = encode_message(&Frame::List) {
                    let _ = write.send(Message::Text(text.into())).await;
                }

                let outcome = drive(&mut write, &mut read, &mut cmd_rx, &event_tx).await;
                let _ = write.send(Message::Close(None)).await;

                match outcome {
                    Outcome::ExplicitDisconnect => {
                        should_reconnect = false;
                    }
                    Outcome::HeartbeatTimedOut => {
                        let _ = event_tx.send(TransportEvent::HeartbeatTimeout);
                    }
                    Outcome::LostConnection => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "transport connect failed");
            }
        }

        if !should_reconnect || !auto_reconnect {
            set_state(&state, &event_tx, TransportState::Idle).await;
            match cmd_rx.recv().await {
                Some(Command::Reconnect) => {
                    should_reconnect = true;
                    backoff = INITIAL_BACKOFF;
                    continue;
                }
                Some(Command::Disconnect) | Some(Command::Send(_)) => continue,
                None => return,
            }
        }

        set_state(&state, &event_tx, TransportState::Reconnecting).await;
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Disconnect) => { should_reconnect = false; continue; }
                    None => return,
                    _ => {}
                }
            }
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn drive(
    write: &mut (impl futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    read: &mut (impl futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    event_tx: &mpsc::UnboundedSender<TransportEvent>,
) -> Outcome {
    let mut last_message_at = Instant::now();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(bytes))) => {
                        last_message_at = Instant::now();
                        if let Some(frame) = decode_message_binary(&bytes) {
                            let _ = event_tx.send(TransportEvent::Frame(frame));
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        last_message_at = Instant::now();
                        let frame = decode_message_text(&text);
                        let _ = event_tx.send(TransportEvent::Frame(frame));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_message_at = Instant::now();
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => { last_message_at = Instant::now(); }
                    Some(Ok(Message::Close(_))) | None => return Outcome::LostConnection,
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "transport socket error");
                        return Outcome::LostConnection;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if last_message_at.elapsed() >= HEARTBEAT_TIMEOUT {
                    warn!(elapsed_s = last_message_at.elapsed().as_secs(), "heartbeat timeout");
                    return Outcome::HeartbeatTimedOut;
                }
                if let Ok(EncodedMessage::Binary(bytes)) = encode_message(&Frame::Ping { session_id: String::new(), binary: true }) {
                    if write.send(Message::Binary(bytes.into())).await.is_err() {
                        return Outcome::LostConnection;
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Send(frame)) => {
                        if let Ok(encoded) = encode_message(&frame) {
                            let msg = match encoded {
                                EncodedMessage::Binary(b) => Message::Binary(b.into()),
                                EncodedMessage::Text(t) => Message::Text(t.into()),
                            };
                            if write.send(msg).await.is_err() {
                                return Outcome::LostConnection;
                            }
                        }
                    }
                    Some(Command::Disconnect) => return Outcome::ExplicitDisconnect,
                    Some(Command::Reconnect) | None => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lan_url_is_verbatim() {
        assert_eq!(lan_url("ws://127.0.0.1:9527"), "ws://127.0.0.1:9527");
    }

    #[test]
    fn relay_url_appends_voyager_role_and_session() {
        let url = relay_url("wss://r.example", Some("AB12CD"), Some("tok")).unwrap();
        assert!(url.contains("role=voyager"));
        assert!(url.contains("session=AB12CD"));
        assert!(url.contains("token=tok"));
    }

    /// `drive` with a read side that never yields anything should time out
    /// after 20s of silence rather than hang forever. Uses paused time so
    /// the four 5s heartbeat ticks advance instantly instead of taking 20s
    /// of wall clock.
    #[tokio::test(start_paused = true)]
    async fn drive_reports_heartbeat_timeout_when_silent() {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (event_tx, _event_rx) = mpsc::unbounded_channel::<TransportEvent>();

        let mut write = futures_util::sink::drain::<Message>().sink_map_err(|e| match e {});
        let mut read = futures_util::stream::pending::<Result<Message, tokio_tungstenite::tungstenite::Error>>();

        // keep the sender alive so `cmd_rx.recv()` stays pending instead of
        // resolving to `None` on every poll
        let _cmd_tx = cmd_tx;

        let outcome = drive(&mut write, &mut read, &mut cmd_rx, &event_tx).await;
        assert!(matches!(outcome, Outcome::HeartbeatTimedOut));
    }
}
