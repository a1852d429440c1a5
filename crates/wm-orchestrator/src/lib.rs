//! wm-orchestrator: The webmux daemon
//!
//! The orchestrator owns the registry of live ttyd instances and turns
//! attach requests from the fronting web layer into network-reachable
//! terminal servers, one per (user, host, session). It discovers tmux
//! sessions locally and over SSH, keeps an nginx proxy in sync when one
//! fronts the terminals, and runs every child process under the requesting
//! user's own identity.

pub mod discovery;
pub mod exposure;
pub mod hosts;
pub mod ipc;
pub mod muxctl;
pub mod portalloc;
pub mod ssh;
pub mod state;
pub mod terminal;

pub use state::OrchestratorState;
pub use terminal::TerminalManager;
