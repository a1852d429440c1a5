//! IPC protocol between the fronting web layer and the orchestrator
//!
//! Uses JSON-encoded messages over TCP on localhost (127.0.0.1). The web
//! layer authenticates users against the system (PAM) and forwards the
//! authenticated username with each request; the orchestrator trusts it
//! because the listener only accepts loopback peers.

use serde::{Deserialize, Serialize};

use crate::types::{HostId, HostPatch, HostSpec, RemoteHost, SessionRecord, TerminalId};

/// IPC request from the web layer to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Ping (for keepalive)
    Ping,

    /// List tmux sessions across the local machine and all enabled hosts
    ListSessions { username: String },

    /// Attach to a session, reusing a live terminal instance if one exists
    Attach {
        username: String,
        session_name: String,
        #[serde(default)]
        host_id: HostId,
    },

    /// Stop a terminal instance; unknown ids succeed without effect
    Stop { terminal_id: TerminalId },

    /// Create a new tmux session
    CreateSession {
        username: String,
        session_name: String,
        #[serde(default)]
        host_id: HostId,
    },

    /// Rename a tmux session
    RenameSession {
        username: String,
        old_name: String,
        new_name: String,
        #[serde(default)]
        host_id: HostId,
    },

    /// Kill a tmux session
    DeleteSession {
        username: String,
        session_name: String,
        #[serde(default)]
        host_id: HostId,
    },

    /// List the user's configured remote hosts
    ListHosts { username: String },

    /// Add a remote host to the user's list
    AddHost { username: String, host: HostSpec },

    /// Update fields of an existing host
    UpdateHost {
        username: String,
        host_id: HostId,
        patch: HostPatch,
    },

    /// Remove a host from the user's list
    DeleteHost { username: String, host_id: HostId },
}

/// IPC response from the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Pong response
    Pong,

    /// Discovered sessions
    Sessions { sessions: Vec<SessionRecord> },

    /// A terminal instance is ready for the client
    Attached(AttachInfo),

    /// Terminal stopped (or was already gone)
    Stopped,

    /// A session mutation succeeded; the client should re-poll the listing
    SessionChanged { refresh_sessions: bool },

    /// The user's host list
    Hosts { hosts: Vec<RemoteHost> },

    /// Host added, with its generated id
    HostAdded { host: RemoteHost },

    /// Generic success
    Ok,

    /// Error response
    Error { message: String },
}

/// Everything a client needs to reach a terminal instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachInfo {
    /// Id of the serving instance
    pub terminal_id: TerminalId,
    /// Whether an existing instance was reused instead of spawned
    pub reused: bool,
    /// Credential the terminal server requires (basic auth password)
    pub token: String,
    /// How to reach the instance
    pub connection: ConnectionInfo,
}

/// Topology-dependent connection coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConnectionInfo {
    /// Connect straight to the advertised host and port
    Direct { host: String, port: u16 },

    /// Connect through the fronting proxy at the given path
    Proxied { path: String },
}
