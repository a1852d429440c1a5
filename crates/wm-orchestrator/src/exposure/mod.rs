//! Terminal exposure strategies
//!
//! A deployment either lets clients hit ttyd ports directly, or fronts
//! them with nginx behind per-terminal paths. Instead of threading a
//! topology flag through every call site, the orchestrator is handed one
//! `Exposure` implementation and everything else stays topology-blind.

mod nginx;

pub use nginx::NginxExposure;

use std::sync::Arc;

use async_trait::async_trait;

use wm_core::config::ExposureConfig;
use wm_core::ipc::ConnectionInfo;
use wm_core::types::TerminalId;

/// How a terminal instance becomes reachable by clients.
#[async_trait]
pub trait Exposure: Send + Sync {
    /// Address ttyd instances bind on this topology.
    fn bind_address(&self) -> &str;

    /// Make the instance reachable. Idempotent; re-publishing an already
    /// published instance is a safe no-op (or rewrite).
    async fn publish(&self, id: TerminalId, port: u16) -> std::io::Result<()>;

    /// Tear down whatever `publish` set up. Idempotent; withdrawing an
    /// absent instance is a safe no-op.
    async fn withdraw(&self, id: TerminalId);

    /// Connection coordinates to hand back to the client.
    fn connection_info(&self, id: TerminalId, port: u16) -> ConnectionInfo;
}

/// Build the exposure strategy described by the configuration.
pub fn from_config(config: &ExposureConfig) -> Arc<dyn Exposure> {
    match config {
        ExposureConfig::Direct { bind_address } => {
            Arc::new(DirectExposure::new(bind_address.clone()))
        }
        ExposureConfig::NginxProxy {
            rules_dir,
            reload_command,
            settle,
        } => Arc::new(NginxExposure::new(
            rules_dir.clone(),
            reload_command.clone(),
            *settle,
        )),
    }
}

/// Direct topology: clients connect straight to the allocated port.
pub struct DirectExposure {
    bind_address: String,
    /// Host name advertised to clients; the bind address itself is often
    /// the 0.0.0.0 wildcard, which a client cannot dial.
    advertise_host: String,
}

impl DirectExposure {
    pub fn new(bind_address: String) -> Self {
        let advertise_host = if bind_address == "0.0.0.0" {
            gethostname::gethostname().to_string_lossy().into_owned()
        } else {
            bind_address.clone()
        };
        Self {
            bind_address,
            advertise_host,
        }
    }
}

#[async_trait]
impl Exposure for DirectExposure {
    fn bind_address(&self) -> &str {
        &self.bind_address
    }

    async fn publish(&self, _id: TerminalId, _port: u16) -> std::io::Result<()> {
        Ok(())
    }

    async fn withdraw(&self, _id: TerminalId) {}

    fn connection_info(&self, _id: TerminalId, port: u16) -> ConnectionInfo {
        ConnectionInfo::Direct {
            host: self.advertise_host.clone(),
            port,
        }
    }
}
