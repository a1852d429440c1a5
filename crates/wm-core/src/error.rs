//! Core error types for webmux

use std::path::PathBuf;
use thiserror::Error;

use crate::types::HostId;

/// Top-level error type for the webmux ecosystem
#[derive(Error, Debug)]
pub enum WmError {
    /// Identity resolution error
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Terminal lifecycle error
    #[error("Terminal error: {0}")]
    Terminal(#[from] TerminalError),

    /// Multiplexer command error
    #[error("Multiplexer error: {0}")]
    Mux(#[from] MuxError),

    /// Host store error
    #[error("Host store error: {0}")]
    HostStore(#[from] HostStoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from resolving an OS user identity.
///
/// An unknown user is fatal to whatever request triggered the lookup; it is
/// never degraded or retried.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The username does not exist on this system
    #[error("Unknown system user: {0}")]
    UnknownUser(String),

    /// The passwd lookup itself failed
    #[error("User lookup failed for {user}: {source}")]
    Lookup {
        user: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the terminal instance lifecycle
#[derive(Error, Debug)]
pub enum TerminalError {
    /// Identity resolution failed
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The terminal-serving process failed to start
    #[error("Failed to spawn terminal server: {0}")]
    Spawn(#[source] std::io::Error),

    /// No free port could be allocated
    #[error("Port allocation failed: {0}")]
    PortAllocation(#[source] std::io::Error),

    /// The requested host is not in the caller's host list
    #[error("Host not found: {0}")]
    HostNotFound(HostId),

    /// The session name cannot be passed safely through a shell
    #[error("Invalid session name: {0:?}")]
    InvalidSessionName(String),
}

/// Errors from multiplexer pass-through commands (create/rename/delete)
/// and remote discovery.
#[derive(Error, Debug)]
pub enum MuxError {
    /// Identity resolution failed
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The requested host is not in the caller's host list
    #[error("Host not found: {0}")]
    HostNotFound(HostId),

    /// The tmux or ssh command exited nonzero; the message carries the
    /// command's own diagnostic text verbatim
    #[error("{0}")]
    CommandFailed(String),

    /// The remote host did not answer within the bounded window
    #[error("Remote host unreachable: {0}")]
    RemoteUnreachable(String),

    /// The command could not be launched at all
    #[error("Failed to run command: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the per-user host document store
#[derive(Error, Debug)]
pub enum HostStoreError {
    /// The host document could not be read or written
    #[error("Host config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The host document is not valid JSON
    #[error("Host config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// No host with the given id in the user's list
    #[error("Host not found: {0}")]
    NotFound(HostId),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
