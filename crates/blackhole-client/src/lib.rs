//! The Blackhole client controller: transport, session/renderer
//! coordination, modifier composition, and the resize contract.

pub mod coordinator;
pub mod emulator;
pub mod error;
pub mod modifiers;
pub mod resize;
pub mod transport;

pub use coordinator::{Coordinator, CoordinatorAction};
pub use emulator::{NullEmulator, TerminalEmulator};
pub use error::{ClientError, Result};
pub use modifiers::Modifiers;
pub use resize::{MetricsDebouncer, Metrics, ResizeContract};
pub use transport::{Transport, TransportEvent, TransportState};
