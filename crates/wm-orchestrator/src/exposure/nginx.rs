//! nginx-fronted exposure
//!
//! One rule file per terminal under the configured directory, which the
//! main nginx config is expected to `include`. nginx only picks changes up
//! on reload, and the reload is acknowledged before it completes, so both
//! publish and withdraw send the reload signal and then sleep a short
//! fixed settle interval. The settle is a mitigation for the reload's
//! asynchrony, not a completion guarantee.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use wm_core::ipc::ConnectionInfo;
use wm_core::types::TerminalId;

use super::Exposure;

/// Writes and removes per-terminal nginx rule files.
pub struct NginxExposure {
    rules_dir: PathBuf,
    reload_command: Vec<String>,
    settle: Duration,
}

impl NginxExposure {
    pub fn new(rules_dir: PathBuf, reload_command: Vec<String>, settle: Duration) -> Self {
        Self {
            rules_dir,
            reload_command,
            settle,
        }
    }

    fn rule_path(&self, id: TerminalId) -> PathBuf {
        self.rules_dir.join(format!("terminal_{}.conf", id))
    }

    /// Signal nginx to re-read its configuration, then wait out the settle
    /// interval. Reload failures are logged; the rule file on disk is
    /// already correct and the next reload will pick it up.
    async fn reload_and_settle(&self) {
        let Some((bin, args)) = self.reload_command.split_first() else {
            return;
        };
        match tokio::process::Command::new(bin).args(args).status().await {
            Ok(status) if status.success() => debug!("Reloaded proxy configuration"),
            Ok(status) => warn!(%status, "Proxy reload exited nonzero"),
            Err(e) => warn!(error = %e, "Failed to run proxy reload command"),
        }
        tokio::time::sleep(self.settle).await;
    }
}

#[async_trait]
impl Exposure for NginxExposure {
    fn bind_address(&self) -> &str {
        // nginx proxies from localhost; the ports are never exposed
        "127.0.0.1"
    }

    async fn publish(&self, id: TerminalId, port: u16) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.rules_dir)?;
        std::fs::write(self.rule_path(id), render_rule(id, port))?;
        debug!(terminal_id = %id, port, "Wrote proxy rule");
        self.reload_and_settle().await;
        Ok(())
    }

    async fn withdraw(&self, id: TerminalId) {
        let path = self.rule_path(id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(terminal_id = %id, "Removed proxy rule");
                self.reload_and_settle().await;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(terminal_id = %id, error = %e, "Failed to remove proxy rule"),
        }
    }

    fn connection_info(&self, id: TerminalId, _port: u16) -> ConnectionInfo {
        ConnectionInfo::Proxied {
            path: format!("/terminal/{}", id),
        }
    }
}

/// Routing fragment mapping the terminal's public path to its loopback
/// port, with the websocket upgrade headers ttyd needs.
fn render_rule(id: TerminalId, port: u16) -> String {
    format!(
        r#"# Terminal {id} proxy configuration
location /terminal/{id} {{
    proxy_pass http://127.0.0.1:{port}/;
    proxy_http_version 1.1;
    proxy_set_header Upgrade $http_upgrade;
    proxy_set_header Connection "upgrade";
    proxy_set_header Host $host;
    proxy_set_header X-Real-IP $remote_addr;
    proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
    proxy_read_timeout 86400;
}}
"#
    )
}
