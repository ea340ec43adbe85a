use thiserror::Error;

/// Errors the client controller surfaces. Maps onto spec §7's transport
/// and policy kinds; protocol errors never reach here (the codec never
/// errors on decode).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid transport URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("heartbeat timeout: no data for {0}s")]
    HeartbeatTimeout(u64),
}

pub type Result<T> = std::result::Result<T, ClientError>;
