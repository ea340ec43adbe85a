//! The Blackhole host controller: session registry, LAN listener, and
//! relay uplink.

pub mod config;
pub mod controller;
pub mod error;
pub mod lan;
pub mod registry;
pub mod relay;

pub use config::HostConfig;
pub use controller::{ControllerConfig, HostController};
pub use error::{HostError, Result};
pub use registry::{default_shell, RegistryEvent, SessionRegistry};
pub use relay::{RelayClient, RelayEvent, RelayState};
