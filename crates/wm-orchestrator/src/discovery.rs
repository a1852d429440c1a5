//! tmux session discovery, local and remote
//!
//! Listings are recomputed on every request and never cached. Every source
//! (the local tmux server, each configured remote host) is queried
//! independently; a source that is missing, unreachable or slow contributes
//! an empty list and never aborts the overall listing.

use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use wm_core::config::ServerConfig;
use wm_core::identity::UserIdentity;
use wm_core::types::{host_color, HostId, RemoteHost, SessionRecord};

use crate::hosts::HostStore;
use crate::ssh;

/// tmux format string for session listings; fields are `|`-delimited in
/// the order SessionRecord expects.
pub const LIST_FORMAT: &str =
    "#{session_id}|#{session_name}|#{session_created}|#{session_windows}|#{session_attached}";

/// Read-only session discovery across the local machine and the caller's
/// configured remote hosts.
pub struct SessionDiscovery {
    config: Arc<ServerConfig>,
    hosts: Arc<HostStore>,
}

impl SessionDiscovery {
    pub fn new(config: Arc<ServerConfig>, hosts: Arc<HostStore>) -> Self {
        Self { config, hosts }
    }

    /// List sessions everywhere: local first, then every enabled host in
    /// the order the user keeps them. Never fails; each source degrades to
    /// an empty contribution on its own.
    pub async fn list_all(&self, username: &str) -> Vec<SessionRecord> {
        let mut sessions = self.list_local(username).await;

        let hosts = match self.hosts.list(username).await {
            Ok(hosts) => hosts,
            Err(e) => {
                warn!(user = username, error = %e, "Failed to load host list for discovery");
                Vec::new()
            }
        };

        // Hosts are queried concurrently; join_all keeps registry order.
        let results = futures::future::join_all(
            hosts
                .iter()
                .filter(|h| h.enabled)
                .map(|host| self.list_remote(host, username)),
        )
        .await;
        for remote in results {
            sessions.extend(remote);
        }

        sessions
    }

    /// List sessions on the local tmux server owned by `username`.
    ///
    /// A user without a tmux socket simply has no sessions; that is an
    /// empty list, not an error.
    pub async fn list_local(&self, username: &str) -> Vec<SessionRecord> {
        let identity = match UserIdentity::resolve(username) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(user = username, error = %e, "Identity resolution failed during discovery");
                return Vec::new();
            }
        };

        let socket = self.config.tmux_socket(identity.uid);
        if !socket.exists() {
            debug!(user = username, socket = %socket.display(), "No tmux socket");
            return Vec::new();
        }

        let mut cmd = Command::new("tmux");
        cmd.arg("-S")
            .arg(&socket)
            .arg("list-sessions")
            .arg("-F")
            .arg(LIST_FORMAT)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        identity.demote(&mut cmd);

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) => {
                warn!(user = username, error = %e, "Failed to run tmux list-sessions");
                return Vec::new();
            }
        };
        if !output.status.success() {
            // tmux exits nonzero when the server has no sessions
            debug!(user = username, "tmux list-sessions returned nonzero");
            return Vec::new();
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_sessions(&stdout, &HostId::local(), "Local")
    }

    /// List sessions on one remote host over SSH.
    ///
    /// Runs as the resolved user so their own keys authenticate. Bounded by
    /// the configured connect and overall timeouts; any failure is logged
    /// and yields an empty list.
    pub async fn list_remote(&self, host: &RemoteHost, username: &str) -> Vec<SessionRecord> {
        let identity = match UserIdentity::resolve(username) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(user = username, error = %e, "Identity resolution failed during discovery");
                return Vec::new();
            }
        };

        let ssh_user = host.ssh_user(username);
        let mut cmd = Command::new("ssh");
        cmd.args(ssh::base_args(
            host,
            ssh_user,
            Some(self.config.timeouts.ssh_connect),
        ))
        .arg(format!("tmux list-sessions -F \"{}\"", LIST_FORMAT))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        identity.demote(&mut cmd);

        let bound = self.config.timeouts.remote_list;
        let output = match timeout(bound, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(host = %host.hostname, error = %e, "Failed to run ssh");
                return Vec::new();
            }
            Err(_) => {
                warn!(host = %host.hostname, timeout = ?bound, "Remote listing timed out");
                return Vec::new();
            }
        };

        if !output.status.success() {
            warn!(
                host = %host.hostname,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Remote listing failed"
            );
            return Vec::new();
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let sessions = parse_sessions(&stdout, &host.id, &host.name);
        debug!(host = %host.hostname, count = sessions.len(), "Remote sessions listed");
        sessions
    }
}

/// Parse `|`-delimited tmux listing output into session records.
///
/// Short or malformed lines are skipped rather than failing the listing.
fn parse_sessions(output: &str, host_id: &HostId, host_name: &str) -> Vec<SessionRecord> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('|').collect();
            if parts.len() < 5 {
                return None;
            }
            Some(SessionRecord {
                id: parts[0].to_string(),
                name: parts[1].to_string(),
                created: parts[2].parse().ok(),
                windows: parts[3].parse().unwrap_or(0),
                attached: parts[4] != "0",
                host_id: host_id.clone(),
                host_name: host_name.to_string(),
                host_color: host_color(host_id).to_string(),
            })
        })
        .collect()
}
