//! Terminal instance lifecycle
//!
//! The registry of live ttyd processes, the attach/stop logic around it,
//! and the per-instance liveness monitors that keep the registry honest.

mod instance;
mod manager;
mod monitor;

pub use instance::{AttachKey, TerminalInstance};
pub use manager::TerminalManager;
