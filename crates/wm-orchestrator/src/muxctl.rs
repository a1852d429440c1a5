//! Multiplexer pass-through commands
//!
//! Create, rename and delete are synchronous commands against tmux: on the
//! local socket under the caller's demoted identity, or over SSH for a
//! configured host. They hold no state; a failure surfaces the underlying
//! command's diagnostic text verbatim so the client sees exactly what tmux
//! or ssh said. Nothing here is retried.

use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::info;

use wm_core::config::ServerConfig;
use wm_core::error::MuxError;
use wm_core::identity::UserIdentity;
use wm_core::types::{HostId, RemoteHost};

use crate::hosts::HostStore;
use crate::ssh;

/// Stateless tmux session mutations, local or remote.
pub struct MuxController {
    config: Arc<ServerConfig>,
    hosts: Arc<HostStore>,
}

impl MuxController {
    pub fn new(config: Arc<ServerConfig>, hosts: Arc<HostStore>) -> Self {
        Self { config, hosts }
    }

    /// Create a detached session.
    pub async fn create_session(
        &self,
        username: &str,
        host_id: &HostId,
        session_name: &str,
    ) -> Result<(), MuxError> {
        check_name(session_name)?;
        info!(user = username, host = %host_id, session = session_name, "Creating session");
        self.run(
            username,
            host_id,
            &["new-session", "-d", "-s", session_name],
        )
        .await
    }

    /// Rename a session.
    pub async fn rename_session(
        &self,
        username: &str,
        host_id: &HostId,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), MuxError> {
        check_name(old_name)?;
        check_name(new_name)?;
        info!(user = username, host = %host_id, from = old_name, to = new_name, "Renaming session");
        self.run(
            username,
            host_id,
            &["rename-session", "-t", old_name, new_name],
        )
        .await
    }

    /// Kill a session.
    pub async fn delete_session(
        &self,
        username: &str,
        host_id: &HostId,
        session_name: &str,
    ) -> Result<(), MuxError> {
        check_name(session_name)?;
        info!(user = username, host = %host_id, session = session_name, "Deleting session");
        self.run(username, host_id, &["kill-session", "-t", session_name])
            .await
    }

    /// Run one tmux subcommand on the right host as the right user.
    async fn run(
        &self,
        username: &str,
        host_id: &HostId,
        tmux_args: &[&str],
    ) -> Result<(), MuxError> {
        let identity = UserIdentity::resolve(username)?;

        let mut cmd = if host_id.is_local() {
            let socket = self.config.tmux_socket(identity.uid);
            let mut cmd = Command::new("tmux");
            cmd.arg("-S").arg(&socket).args(tmux_args);
            cmd
        } else {
            let host = self
                .hosts
                .get(username, host_id)
                .await
                .map_err(|_| MuxError::HostNotFound(host_id.clone()))?;
            let ssh_user = host.ssh_user(username);
            let mut cmd = Command::new("ssh");
            cmd.args(ssh::base_args(
                &host,
                ssh_user,
                Some(self.config.timeouts.ssh_connect),
            ))
            .arg(format!("tmux {}", tmux_args.join(" ")));
            cmd
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        identity.demote(&mut cmd);

        let bound = self.config.timeouts.remote_command;
        let output = match timeout(bound, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(MuxError::RemoteUnreachable(format!(
                    "command timed out after {:?}",
                    bound
                )));
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(MuxError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

fn check_name(name: &str) -> Result<(), MuxError> {
    if ssh::is_safe_session_name(name) {
        Ok(())
    } else {
        Err(MuxError::CommandFailed(format!(
            "invalid session name: {:?}",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(dir: &tempfile::TempDir) -> MuxController {
        let config = ServerConfig {
            tmux_socket_base: format!("{}/tmux-", dir.path().display()),
            ..Default::default()
        };
        let hosts = Arc::new(HostStore::new(dir.path().join("hosts")));
        MuxController::new(Arc::new(config), hosts)
    }

    #[tokio::test]
    async fn test_invalid_session_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let muxctl = controller(&dir);
        let err = muxctl
            .create_session(&whoami::username(), &HostId::local(), "bad name; rm")
            .await
            .unwrap_err();
        assert!(matches!(err, MuxError::CommandFailed(_)));
    }

    #[tokio::test]
    async fn test_unknown_remote_host_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let muxctl = controller(&dir);
        let err = muxctl
            .create_session(&whoami::username(), &HostId::new("deadbeef"), "work")
            .await
            .unwrap_err();
        assert!(matches!(err, MuxError::HostNotFound(_)));
    }

    #[tokio::test]
    async fn test_local_failure_surfaces_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let muxctl = controller(&dir);
        // No tmux server on this socket: kill-session must fail and the
        // error text must come from the command itself.
        let result = muxctl
            .delete_session(&whoami::username(), &HostId::local(), "nope")
            .await;
        assert!(result.is_err());
    }
}
