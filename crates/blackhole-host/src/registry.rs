//! Session registry (spec §4.2).
//!
//! Owns every PTY on the host. Grounded on `portable_pty`-based registries
//! in the example pack (notably `other_examples/ee40510c` `PtyRegistry`),
//! adapted to spec semantics: ordered listing, no output buffering/replay
//! (the spec explicitly says late joiners get no history — the teacher's
//! `relay-server` scrollback belongs to the relay, which is out of scope
//! here), and a single combined event stream instead of per-session
//! broadcast channels.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{HostError, Result};

/// Events the registry emits as PTYs produce output or die. The host
/// controller holds the single receiver for this stream (spec §4.5).
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// PTY output, in PTY-read order per session. No ordering guarantee
    /// between different sessions.
    Output { session_id: String, data: Vec<u8> },
    /// The PTY reader observed EOF/error; the session has been removed.
    Closed { session_id: String },
}

struct SessionEntry {
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
}

/// Default shell fallback chain per spec §6: `$SHELL` first, then
/// POSIX `bash`/`sh`, or on Windows `pwsh`/`powershell`/`cmd`.
pub fn default_shell() -> String {
    if let Ok(shell) = std::env::var("SHELL") {
        if !shell.is_empty() {
            return shell;
        }
    }
    if cfg!(target_os = "windows") {
        for candidate in ["pwsh", "powershell", "cmd"] {
            if which_exists(candidate) {
                return candidate.to_string();
            }
        }
        "cmd".to_string()
    } else {
        for candidate in ["/bin/bash", "/bin/sh"] {
            if std::path::Path::new(candidate).exists() {
                return candidate.to_string();
            }
        }
        "/bin/sh".to_string()
    }
}

fn which_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(name).with_extension("exe").exists())
        })
        .unwrap_or(false)
}

/// Owns PTY sessions, in creation order. Cloning is cheap (`Arc` inside);
/// every clone shares the same underlying map.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    order: RwLock<Vec<String>>,
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    event_tx: mpsc::UnboundedSender<RegistryEvent>,
}

impl SessionRegistry {
    /// Create a new, empty registry. Returns the registry plus the single
    /// event receiver the host controller subscribes to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RegistryEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let registry = Self {
            inner: Arc::new(Inner {
                order: RwLock::new(Vec::new()),
                sessions: RwLock::new(HashMap::new()),
                event_tx,
            }),
        };
        (registry, event_rx)
    }

    /// Spawn a new PTY running `shell` (or the platform default) at
    /// `rows`x`cols`. Always returns a fresh id — sessions are never
    /// reused (spec §4.2).
    pub async fn create(&self, rows: u16, cols: u16, shell: Option<&str>) -> Result<String> {
        let shell = shell.map(str::to_string).unwrap_or_else(default_shell);
        let session_id = new_session_id();

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| HostError::PtySpawn(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&shell);
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| HostError::PtySpawn(e.to_string()))?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| HostError::PtySpawn(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| HostError::PtySpawn(e.to_string()))?;

        let entry = Arc::new(SessionEntry {
            master: Mutex::new(pair.master),
            writer: Mutex::new(writer),
            child: Mutex::new(child),
        });

        {
            let mut sessions = self.inner.sessions.write().await;
            sessions.insert(session_id.clone(), entry);
        }
        {
            let mut order = self.inner.order.write().await;
            order.push(session_id.clone());
        }

        spawn_reader(self.clone(), session_id.clone(), reader);
        info!(session_id = %session_id, shell = %shell, "session created");
        Ok(session_id)
    }

    /// Close a session. Idempotent: closing an unknown or already-closed
    /// id is a no-op (spec §9, ambiguity b).
    pub async fn close(&self, session_id: &str) {
        let entry = {
            let mut sessions = self.inner.sessions.write().await;
            sessions.remove(session_id)
        };
        {
            let mut order = self.inner.order.write().await;
            order.retain(|id| id != session_id);
        }
        if let Some(entry) = entry {
            let mut child = entry.child.lock().await;
            let _ = child.kill();
            info!(session_id = %session_id, "session closed");
        }
    }

    /// List sessions in creation order.
    pub async fn list(&self) -> Vec<String> {
        self.inner.order.read().await.clone()
    }

    /// Write bytes to a session's PTY. Silently ignored if the session
    /// doesn't exist (spec §3 invariant).
    pub async fn write(&self, session_id: &str, bytes: &[u8]) {
        let entry = self.inner.sessions.read().await.get(session_id).cloned();
        if let Some(entry) = entry {
            let mut writer = entry.writer.lock().await;
            if let Err(e) = writer.write_all(bytes).and_then(|_| writer.flush()) {
                warn!(session_id = %session_id, error = %e, "pty write failed");
            }
        } else {
            debug!(session_id = %session_id, "write for unknown session ignored");
        }
    }

    /// Resize a session's PTY. Silently ignored if unknown (spec §9,
    /// ambiguity a — flagged, not silently "fixed" into an error path).
    pub async fn resize(&self, session_id: &str, rows: u16, cols: u16) {
        let entry = self.inner.sessions.read().await.get(session_id).cloned();
        if let Some(entry) = entry {
            let master = entry.master.lock().await;
            if let Err(e) = master.resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 }) {
                warn!(session_id = %session_id, error = %e, "pty resize failed");
            }
        } else {
            debug!(session_id = %session_id, "resize for unknown session ignored");
        }
    }

    /// `true` if `session_id` is currently registered.
    pub async fn contains(&self, session_id: &str) -> bool {
        self.inner.sessions.read().await.contains_key(session_id)
    }

    async fn remove_on_eof(&self, session_id: &str) {
        {
            let mut sessions = self.inner.sessions.write().await;
            sessions.remove(session_id);
        }
        {
            let mut order = self.inner.order.write().await;
            order.retain(|id| id != session_id);
        }
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn spawn_reader(registry: SessionRegistry, session_id: String, mut reader: Box<dyn Read + Send>) {
    let event_tx = registry.inner.event_tx.clone();
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if event_tx
                        .send(RegistryEvent::Output { session_id: session_id.clone(), data: buf[..n].to_vec() })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    debug!(session_id = %session_id, error = %e, "pty reader exiting");
                    break;
                }
            }
        }
        let rt = tokio::runtime::Handle::current();
        rt.block_on(registry.remove_on_eof(&session_id));
        let _ = event_tx.send(RegistryEvent::Closed { session_id });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_is_empty_initially() {
        let (registry, _rx) = SessionRegistry::new();
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn close_unknown_session_is_noop() {
        let (registry, _rx) = SessionRegistry::new();
        registry.close("does-not-exist").await; // must not panic
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn write_and_resize_to_unknown_session_are_ignored() {
        let (registry, _rx) = SessionRegistry::new();
        registry.write("nope", b"hi").await;
        registry.resize("nope", 24, 80).await;
    }

    #[tokio::test]
    async fn create_list_close_ordering() {
        let (registry, _rx) = SessionRegistry::new();
        // PTY creation may be unavailable in a sandboxed CI environment;
        // skip gracefully rather than failing the whole suite (matches
        // the hedge `ee40510c`'s PtyRegistry tests use).
        let Ok(a) = registry.create(24, 80, Some("/bin/sh")).await else { return };
        let Ok(b) = registry.create(24, 80, Some("/bin/sh")).await else { return };
        assert_eq!(registry.list().await, vec![a.clone(), b.clone()]);
        registry.close(&a).await;
        assert_eq!(registry.list().await, vec![b.clone()]);
        registry.close(&b).await;
        assert!(registry.list().await.is_empty());
    }
}
