//! Per-instance liveness monitor
//!
//! Every spawned terminal server gets one supervising task that owns the
//! child handle. It enforces the invariant the registry promises -
//! "registry entry implies live process" - by reaping the entry (and the
//! proxy rule) the moment the child exits, whether the exit was natural
//! or requested. Stop requests run the bounded two-phase teardown:
//! SIGTERM, a grace interval, then SIGKILL.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{info, warn};

use wm_core::types::TerminalId;

use crate::exposure::Exposure;

use super::TerminalInstance;

pub(crate) fn spawn(
    instance: Arc<TerminalInstance>,
    mut child: Child,
    registry: Arc<DashMap<TerminalId, Arc<TerminalInstance>>>,
    exposure: Arc<dyn Exposure>,
    mut stop_rx: mpsc::Receiver<()>,
    exited_tx: watch::Sender<bool>,
    grace: Duration,
) {
    tokio::spawn(async move {
        let id = instance.id;
        let pid = instance.pid;

        let status = tokio::select! {
            status = child.wait() => status,
            _ = stop_rx.recv() => terminate(pid, grace, &mut child).await,
        };

        match status {
            Ok(status) => info!(terminal_id = %id, pid, %status, "Terminal exited"),
            Err(e) => warn!(terminal_id = %id, pid, error = %e, "Failed to reap terminal"),
        }

        instance.mark_dead();
        registry.remove(&id);
        exposure.withdraw(id).await;
        let _ = exited_tx.send(true);
    });
}

/// Two-phase teardown: graceful signal, bounded wait, forced kill. The
/// bound makes stop latency independent of how the child handles SIGTERM.
async fn terminate(
    pid: u32,
    grace: Duration,
    child: &mut Child,
) -> std::io::Result<std::process::ExitStatus> {
    signal(pid, libc::SIGTERM);
    match timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(pid, grace = ?grace, "Terminal ignored SIGTERM, escalating to SIGKILL");
            child.start_kill()?;
            child.wait().await
        }
    }
}

fn signal(pid: u32, sig: libc::c_int) {
    // ESRCH just means the child already exited; wait() observes that
    unsafe {
        libc::kill(pid as libc::pid_t, sig);
    }
}
