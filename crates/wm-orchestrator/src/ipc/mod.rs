//! IPC interface for the fronting web layer

mod server;

pub use server::IpcServer;
