//! Consumer Session Registry
//!
//! - **ClientRegistry**: the shared set of open consumer sessions and the
//!   fan-out pass over them
//! - **ClientSession / SessionHandle**: the two ends of one consumer's
//!   outbound queue and liveness flag

mod client_registry;
mod session;

pub use client_registry::{BroadcastReport, ClientRegistry, RegistryConfig, RegistryError};
pub use session::{ClientSession, Frame, SendFailure, SessionHandle, SessionId};
