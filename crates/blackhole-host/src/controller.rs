//! Host controller (spec §4.5): wires the session registry, the LAN
//! listener, and the relay uplink together behind one inbound-frame
//! handler.
//!
//! Grounded on `relay-server`'s `handle_connection` dispatch (one match
//! over inbound message kinds, replying on the same transport it arrived
//! on) generalized to two transports instead of one.

use std::sync::Arc;

use blackhole_protocol::Frame;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::Result;
use crate::lan::{LanInbound, LanListener};
use crate::registry::{RegistryEvent, SessionRegistry};
use crate::relay::{RelayClient, RelayEvent, RelayState};

/// Where an inbound frame came from, so replies go back the same way.
enum Origin {
    Lan(String),
    Relay,
}

/// Runtime configuration the controller needs at `start()`.
pub struct ControllerConfig {
    pub lan_port: Option<u16>,
    pub relay_url: Option<String>,
    pub relay_token: Option<String>,
    pub shell: Option<String>,
}

/// Owns every long-running host task. `start()` brings the host up;
/// `stop()` tears it down in reverse order.
pub struct HostController {
    registry: SessionRegistry,
    lan: Arc<tokio::sync::RwLock<Option<LanListener>>>,
    relay: RelayClient,
}

impl HostController {
    /// Bring the host up: bind the LAN listener (unless disabled), start
    /// the relay client (connecting immediately iff a URL was given), and
    /// spawn the single event-fan-out loop.
    pub async fn start(config: ControllerConfig) -> Result<Self> {
        let (registry, mut registry_rx) = SessionRegistry::new();
        let (lan_inbound_tx, mut lan_inbound_rx) = mpsc::unbounded_channel::<LanInbound>();
        let (relay_event_tx, mut relay_event_rx) = mpsc::unbounded_channel::<RelayEvent>();

        let lan = match config.lan_port {
            Some(port) => Some(LanListener::bind(port, lan_inbound_tx).await?),
            None => None,
        };
        let lan = Arc::new(tokio::sync::RwLock::new(lan));

        let relay_enabled = config.relay_url.as_deref().is_some_and(|u| !u.is_empty());
        let relay = RelayClient::spawn(
            config.relay_url.unwrap_or_default(),
            config.relay_token,
            relay_enabled,
            relay_event_tx,
        );

        let controller = Self { registry: registry.clone(), lan: lan.clone(), relay: relay.clone() };
        let shell = config.shell;

        // registry events -> both transports
        {
            let lan = lan.clone();
            let relay = relay.clone();
            tokio::spawn(async move {
                while let Some(event) = registry_rx.recv().await {
                    match event {
                        RegistryEvent::Output { session_id, data } => {
                            let frame = Frame::Stdout { session_id, payload: data };
                            if let Some(lan) = lan.read().await.as_ref() {
                                lan.broadcast(&frame);
                            }
                            relay.send(frame);
                        }
                        RegistryEvent::Closed { session_id } => {
                            let frame = Frame::SessionClosed { session_id };
                            if let Some(lan) = lan.read().await.as_ref() {
                                lan.broadcast(&frame);
                            }
                            relay.send(frame);
                        }
                    }
                }
            });
        }

        // LAN inbound -> dispatch
        {
            let registry = registry.clone();
            let lan = lan.clone();
            let relay = relay.clone();
            let shell = shell.clone();
            tokio::spawn(async move {
                while let Some(LanInbound { peer_id, frame }) = lan_inbound_rx.recv().await {
                    dispatch(&registry, lan.as_ref(), &relay, shell.as_deref(), Origin::Lan(peer_id), frame).await;
                }
            });
        }

        // relay inbound -> dispatch
        {
            let registry = registry.clone();
            let lan = lan.clone();
            let relay = relay.clone();
            let shell = shell.clone();
            tokio::spawn(async move {
                while let Some(event) = relay_event_rx.recv().await {
                    match event {
                        RelayEvent::StateChanged(state) => {
                            info!(?state, "relay state changed");
                        }
                        RelayEvent::Frame(frame) => {
                            dispatch(&registry, lan.as_ref(), &relay, shell.as_deref(), Origin::Relay, frame).await;
                        }
                    }
                }
            });
        }

        Ok(controller)
    }

    pub async fn relay_state(&self) -> RelayState {
        self.relay.state().await
    }

    pub fn enable_relay(&self, enabled: bool) {
        self.relay.set_enabled(enabled);
    }

    pub async fn session_count(&self) -> usize {
        self.registry.list().await.len()
    }

    /// Tear the host down: stop accepting new relay reconnects and drop
    /// the session registry's sessions by closing each in turn.
    pub async fn stop(&self) {
        self.relay.stop();
        for session_id in self.registry.list().await {
            self.registry.close(&session_id).await;
        }
    }
}

async fn dispatch(
    registry: &SessionRegistry,
    lan: &tokio::sync::RwLock<Option<LanListener>>,
    relay: &RelayClient,
    shell: Option<&str>,
    origin: Origin,
    frame: Frame,
) {
    match frame {
        Frame::Ping { session_id, binary } => {
            reply(lan, relay, &origin, Frame::Pong { session_id, binary }).await;
        }
        Frame::List => {
            let sessions = registry.list().await;
            reply(lan, relay, &origin, Frame::SessionList { sessions }).await;
        }
        Frame::Create => match registry.create(24, 80, shell).await {
            Ok(session_id) => reply(lan, relay, &origin, Frame::SessionCreated { session_id }).await,
            Err(e) => {
                warn!(error = %e, "session create failed");
                reply(lan, relay, &origin, Frame::Error { code: "create_failed".into(), message: e.to_string() }).await;
            }
        },
        Frame::Close { session_id } => {
            registry.close(&session_id).await;
            let closed = Frame::SessionClosed { session_id };
            if let Some(lan) = lan.read().await.as_ref() {
                lan.broadcast(&closed);
            }
            relay.send(closed);
        }
        Frame::Stdin { session_id, payload } => {
            registry.write(&session_id, &payload).await;
        }
        Frame::Resize { session_id, rows, cols } => {
            registry.resize(&session_id, rows, cols).await;
        }
        Frame::Unsupported { version } => {
            warn!(version, "dropping peer on unsupported protocol version");
            let message = UNSUPPORTED_VERSION_MESSAGE.to_string();
            reply(lan, relay, &origin, Frame::Error { code: "unsupported_version".into(), message }).await;
            // spec §4.5/S4: an unsupported-version peer gets the error
            // frame above, then is closed outright.
            match &origin {
                Origin::Lan(peer_id) => {
                    if let Some(lan) = lan.read().await.as_ref() {
                        lan.disconnect(peer_id);
                    }
                }
                Origin::Relay => relay.set_enabled(false),
            }
        }
        _ => {}
    }
}

const UNSUPPORTED_VERSION_MESSAGE: &str = "Unsupported protocol version";

/// Send `frame` back the way it came: to the requesting LAN peer, or
/// to the relay.
async fn reply(lan: &tokio::sync::RwLock<Option<LanListener>>, relay: &RelayClient, origin: &Origin, frame: Frame) {
    match origin {
        Origin::Lan(peer_id) => {
            if let Some(lan) = lan.read().await.as_ref() {
                lan.send_to(peer_id, &frame);
            }
        }
        Origin::Relay => relay.send(frame),
    }
}
