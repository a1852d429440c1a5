//! Global orchestrator state

use std::sync::Arc;

use wm_core::config::ServerConfig;

use crate::discovery::SessionDiscovery;
use crate::exposure::{self, Exposure};
use crate::hosts::HostStore;
use crate::muxctl::MuxController;
use crate::terminal::TerminalManager;

/// Shared state for the orchestrator daemon. Built once at startup and
/// handed to the IPC server; its lifetime is the serving process's.
pub struct OrchestratorState {
    /// Configuration
    pub config: Arc<ServerConfig>,
    /// Per-user remote host store
    pub hosts: Arc<HostStore>,
    /// Live terminal instances
    pub terminals: Arc<TerminalManager>,
    /// Session discovery
    pub discovery: SessionDiscovery,
    /// Session mutations
    pub muxctl: MuxController,
}

impl OrchestratorState {
    /// Create state with the exposure strategy the config describes.
    pub fn new(config: ServerConfig) -> Self {
        let exposure = exposure::from_config(&config.exposure);
        Self::with_exposure(config, exposure)
    }

    /// Create state with an explicit exposure strategy.
    pub fn with_exposure(config: ServerConfig, exposure: Arc<dyn Exposure>) -> Self {
        let config = Arc::new(config);
        let hosts = Arc::new(HostStore::new(config.hosts_dir.clone()));
        let terminals = Arc::new(TerminalManager::new(
            Arc::clone(&config),
            Arc::clone(&hosts),
            exposure,
        ));
        let discovery = SessionDiscovery::new(Arc::clone(&config), Arc::clone(&hosts));
        let muxctl = MuxController::new(Arc::clone(&config), Arc::clone(&hosts));
        Self {
            config,
            hosts,
            terminals,
            discovery,
            muxctl,
        }
    }
}
