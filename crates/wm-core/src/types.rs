//! Core domain types

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Unique identifier for a running terminal instance.
///
/// Issued monotonically by the terminal manager and never reused for the
/// lifetime of the daemon, so a stale client can never reach a recycled
/// instance by accident.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TerminalId(pub u64);

impl TerminalId {
    /// Get the raw numeric id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a session host: the reserved `local` host or a
/// configured remote host's id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(pub String);

impl HostId {
    /// The reserved id for the machine the daemon runs on
    pub const LOCAL: &'static str = "local";

    /// Create a host id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The local host id
    pub fn local() -> Self {
        Self(Self::LOCAL.to_string())
    }

    /// Whether this id names the local machine
    pub fn is_local(&self) -> bool {
        self.0 == Self::LOCAL
    }

    /// Get the raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for HostId {
    fn default() -> Self {
        Self::local()
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A remote machine reachable over SSH, owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHost {
    /// Unique id within the owning user's host list
    pub id: HostId,
    /// Display name
    pub name: String,
    /// Hostname or address to SSH to
    pub hostname: String,
    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// SSH username; when absent the caller's own username is used
    #[serde(default)]
    pub username: Option<String>,
    /// Disabled hosts are kept in the list but never queried
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl RemoteHost {
    /// The SSH username to use for `caller` when connecting to this host
    pub fn ssh_user<'a>(&'a self, caller: &'a str) -> &'a str {
        self.username.as_deref().unwrap_or(caller)
    }
}

fn default_ssh_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

/// Payload for adding a host; everything but the hostname has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSpec {
    /// Display name, defaults to the hostname
    #[serde(default)]
    pub name: Option<String>,
    /// Hostname or address
    pub hostname: String,
    /// SSH port
    #[serde(default)]
    pub port: Option<u16>,
    /// SSH username, defaults to the caller
    #[serde(default)]
    pub username: Option<String>,
    /// Enabled flag
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Partial update for an existing host; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// A tmux session observed during discovery.
///
/// Recomputed on every listing and never persisted; the fields mirror the
/// tmux format variables the listing command asks for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// tmux session id (e.g. `$3`)
    pub id: String,
    /// Session name
    pub name: String,
    /// Creation time as reported by tmux (unix seconds)
    pub created: Option<u64>,
    /// Number of windows
    pub windows: u32,
    /// Whether any client is currently attached through tmux itself
    pub attached: bool,
    /// Host the session lives on
    pub host_id: HostId,
    /// Display name of that host
    pub host_name: String,
    /// Stable display color for that host
    pub host_color: String,
}

/// Display palette for hosts. Index 0 is reserved for the local host.
pub const HOST_COLORS: [&str; 8] = [
    "#4a9eff", // blue - local
    "#10b981", // green
    "#f59e0b", // orange
    "#8b5cf6", // purple
    "#ef4444", // red
    "#06b6d4", // cyan
    "#ec4899", // pink
    "#f97316", // deep orange
];

/// Pick the display color for a host.
///
/// `local` always gets the reserved first palette entry; any other id is
/// hashed into the remaining entries, so a given host renders identically
/// across calls and across daemon restarts.
pub fn host_color(host_id: &HostId) -> &'static str {
    if host_id.is_local() {
        return HOST_COLORS[0];
    }
    let digest = Sha256::digest(host_id.as_str().as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    let hash = u64::from_be_bytes(buf);
    let idx = (hash % (HOST_COLORS.len() as u64 - 1)) as usize;
    HOST_COLORS[idx + 1]
}
