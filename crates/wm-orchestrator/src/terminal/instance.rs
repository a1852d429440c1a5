//! A single running terminal-serving process

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use wm_core::types::{HostId, TerminalId};

/// Identity of the session an instance serves. At most one live instance
/// exists per key; many clients share it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttachKey {
    pub username: String,
    pub host_id: HostId,
    pub session_name: String,
}

impl AttachKey {
    pub fn new(username: &str, host_id: &HostId, session_name: &str) -> Self {
        Self {
            username: username.to_string(),
            host_id: host_id.clone(),
            session_name: session_name.to_string(),
        }
    }
}

/// A live ttyd process registered with the manager.
///
/// Instances are created only once the child process exists and are
/// removed by their monitor when the child exits, so holding one of these
/// out of the registry never implies the process is still alive - check
/// `is_alive` before reusing.
pub struct TerminalInstance {
    /// Monotonic id, never reused
    pub id: TerminalId,
    /// Port the terminal server listens on
    pub port: u16,
    /// Child process id
    pub pid: u32,
    /// Identity the process runs as
    pub uid: u32,
    pub gid: u32,
    /// Requesting user
    pub username: String,
    /// Host the served session lives on
    pub host_id: HostId,
    /// Served session name
    pub session_name: String,
    /// Credential the terminal server requires from clients
    pub token: String,
    /// Creation time, unix millis
    pub created_at: u64,

    alive: AtomicBool,
    stop_tx: mpsc::Sender<()>,
    exited_rx: watch::Receiver<bool>,
}

impl TerminalInstance {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: TerminalId,
        port: u16,
        pid: u32,
        uid: u32,
        gid: u32,
        username: String,
        host_id: HostId,
        session_name: String,
        token: String,
        created_at: u64,
        stop_tx: mpsc::Sender<()>,
        exited_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            port,
            pid,
            uid,
            gid,
            username,
            host_id,
            session_name,
            token,
            created_at,
            alive: AtomicBool::new(true),
            stop_tx,
            exited_rx,
        }
    }

    /// The dedup key this instance serves
    pub fn key(&self) -> AttachKey {
        AttachKey::new(&self.username, &self.host_id, &self.session_name)
    }

    /// Whether the monitor still believes the process is running
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Ask the monitor to run the two-phase teardown. Safe to call any
    /// number of times, including after exit.
    pub(crate) fn request_stop(&self) {
        // Full or closed both mean a teardown is already underway
        let _ = self.stop_tx.try_send(());
    }

    /// Wait until the monitor confirms the process exited, bounded.
    pub(crate) async fn wait_exit(&self, bound: Duration) -> bool {
        let mut rx = self.exited_rx.clone();
        if *rx.borrow() {
            return true;
        }
        timeout(bound, async move {
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    return true;
                }
            }
            // Sender dropped; the monitor signals before it finishes
            *rx.borrow()
        })
        .await
        .unwrap_or(false)
    }
}
