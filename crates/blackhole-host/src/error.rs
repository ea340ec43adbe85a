use thiserror::Error;

/// Errors the host controller surfaces. Maps onto the taxonomy in spec §7:
/// protocol errors are handled entirely inside `blackhole-protocol` and
/// never reach this enum; what's left is PTY, transport, and policy
/// failures.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to spawn shell: {0}")]
    PtySpawn(String),

    #[error("failed to bind LAN listener on port {port}: {source}")]
    LanBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("dev mode requires --confirm-dev-mode in release builds")]
    DevModeNotConfirmed,
}

pub type Result<T> = std::result::Result<T, HostError>;
