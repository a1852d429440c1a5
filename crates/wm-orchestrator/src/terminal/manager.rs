//! Terminal manager: the live-instance registry and attach/stop logic
//!
//! Sessions are long-lived and reattached from many clients and devices;
//! spawning one ttyd per attach would leak processes and ports. Identity
//! is therefore keyed by (user, host, session) and the first live match
//! is authoritative: attach either reuses it or spawns a fresh instance
//! under that key's lock, so two racing attaches for the same session can
//! never both spawn. Distinct keys proceed fully concurrently.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::process::Command;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};

use wm_core::config::ServerConfig;
use wm_core::error::TerminalError;
use wm_core::identity::UserIdentity;
use wm_core::ipc::AttachInfo;
use wm_core::time::current_time_millis;
use wm_core::types::{HostId, RemoteHost, TerminalId};

use crate::exposure::Exposure;
use crate::hosts::HostStore;
use crate::ssh;

use super::{instance::AttachKey, monitor, TerminalInstance};

/// Length of the access token ttyd enforces as its basic-auth password.
const TOKEN_LEN: usize = 32;

/// Owns every live terminal instance and the only paths that create or
/// destroy them.
pub struct TerminalManager {
    config: Arc<ServerConfig>,
    hosts: Arc<HostStore>,
    exposure: Arc<dyn Exposure>,
    /// Live instances by id. Entries are inserted only after a child
    /// process exists and are removed by stop or the instance's monitor.
    instances: Arc<DashMap<TerminalId, Arc<TerminalInstance>>>,
    /// Per-key attach serialization
    attach_locks: DashMap<AttachKey, Arc<Mutex<()>>>,
    /// Next terminal id; ids are never reused
    next_id: AtomicU64,
}

impl TerminalManager {
    pub fn new(
        config: Arc<ServerConfig>,
        hosts: Arc<HostStore>,
        exposure: Arc<dyn Exposure>,
    ) -> Self {
        Self {
            config,
            hosts,
            exposure,
            instances: Arc::new(DashMap::new()),
            attach_locks: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Attach a user to a session, reusing the live instance for the same
    /// (user, host, session) key when one exists.
    pub async fn attach(
        &self,
        username: &str,
        host_id: &HostId,
        session_name: &str,
    ) -> Result<AttachInfo, TerminalError> {
        if !ssh::is_safe_session_name(session_name) {
            return Err(TerminalError::InvalidSessionName(session_name.to_string()));
        }

        let key = AttachKey::new(username, host_id, session_name);
        let lock = self.attach_lock(&key);
        let _guard = lock.lock().await;

        if let Some(instance) = self.find_live(&key) {
            info!(
                terminal_id = %instance.id,
                port = instance.port,
                session = session_name,
                "Reusing terminal instance"
            );
            // Re-assert the proxy binding; the rule may have been lost to
            // a proxy restart and rewriting it is idempotent.
            if let Err(e) = self.exposure.publish(instance.id, instance.port).await {
                warn!(terminal_id = %instance.id, error = %e, "Proxy re-sync failed");
            }
            return Ok(AttachInfo {
                terminal_id: instance.id,
                reused: true,
                token: instance.token.clone(),
                connection: self.exposure.connection_info(instance.id, instance.port),
            });
        }

        self.spawn_instance(&key).await
    }

    /// Spawn a fresh instance for a key that has no live one. Caller holds
    /// the key lock.
    async fn spawn_instance(&self, key: &AttachKey) -> Result<AttachInfo, TerminalError> {
        let identity = UserIdentity::resolve(&key.username)?;
        let port = crate::portalloc::find_free_port(self.exposure.bind_address())?;
        let token = mint_token();

        let hosted = if key.host_id.is_local() {
            let socket = self.config.tmux_socket(identity.uid);
            local_attach_argv(&socket, &key.session_name)
        } else {
            let host = self
                .hosts
                .get(&key.username, &key.host_id)
                .await
                .map_err(|_| TerminalError::HostNotFound(key.host_id.clone()))?;
            let ssh_user = host.ssh_user(&key.username).to_string();
            remote_attach_argv(&host, &ssh_user, &key.session_name)
        };

        let mut cmd = self.ttyd_command(&identity, port, &token, &hosted);
        // Spawn failure is fatal to the attach and leaves no registry entry
        let child = cmd.spawn().map_err(TerminalError::Spawn)?;
        let pid = child.id().unwrap_or_default();

        let id = TerminalId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (exited_tx, exited_rx) = watch::channel(false);
        let instance = Arc::new(TerminalInstance::new(
            id,
            port,
            pid,
            identity.uid,
            identity.gid,
            key.username.clone(),
            key.host_id.clone(),
            key.session_name.clone(),
            token.clone(),
            current_time_millis(),
            stop_tx,
            exited_rx,
        ));

        // Registered only now that a live process handle exists; no
        // half-initialized entry is ever visible.
        self.instances.insert(id, Arc::clone(&instance));
        monitor::spawn(
            Arc::clone(&instance),
            child,
            Arc::clone(&self.instances),
            Arc::clone(&self.exposure),
            stop_rx,
            exited_tx,
            self.config.timeouts.stop_grace,
        );

        info!(
            terminal_id = %id,
            pid,
            port,
            user = %key.username,
            host = %key.host_id,
            session = %key.session_name,
            "Started terminal instance"
        );

        // A failed proxy sync is logged, not rolled back: the instance is
        // healthy and the next attach re-asserts the rule.
        if let Err(e) = self.exposure.publish(id, port).await {
            warn!(terminal_id = %id, error = %e, "Proxy sync failed");
        }

        Ok(AttachInfo {
            terminal_id: id,
            reused: false,
            token,
            connection: self.exposure.connection_info(id, port),
        })
    }

    /// Stop an instance. Unknown ids succeed without effect.
    pub async fn stop(&self, id: TerminalId) {
        let instance = match self.instances.get(&id) {
            Some(entry) => Arc::clone(entry.value()),
            None => return,
        };

        info!(terminal_id = %id, pid = instance.pid, "Stopping terminal instance");
        instance.request_stop();

        // The monitor owns teardown; give it the grace interval plus the
        // forced-kill margin before giving up on confirmation.
        let bound = self.config.timeouts.stop_grace + Duration::from_secs(2);
        if !instance.wait_exit(bound).await {
            warn!(terminal_id = %id, "Terminal did not confirm exit in time");
        }

        self.instances.remove(&id);
        self.exposure.withdraw(id).await;
    }

    /// Stop every live instance; used during daemon shutdown.
    pub async fn shutdown_all(&self) {
        let ids: Vec<TerminalId> = self.instances.iter().map(|e| *e.key()).collect();
        if ids.is_empty() {
            return;
        }
        info!(count = ids.len(), "Stopping all terminal instances");
        futures::future::join_all(ids.into_iter().map(|id| self.stop(id))).await;
    }

    /// Number of registered instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Check if no instances are registered
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Snapshot of all registered instances
    pub fn list(&self) -> Vec<Arc<TerminalInstance>> {
        self.instances.iter().map(|e| Arc::clone(e.value())).collect()
    }

    fn find_live(&self, key: &AttachKey) -> Option<Arc<TerminalInstance>> {
        self.instances
            .iter()
            .map(|e| Arc::clone(e.value()))
            .find(|instance| instance.is_alive() && &instance.key() == key)
    }

    fn attach_lock(&self, key: &AttachKey) -> Arc<Mutex<()>> {
        self.attach_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Build the ttyd invocation wrapping the hosted attach command.
    fn ttyd_command(
        &self,
        identity: &UserIdentity,
        port: u16,
        token: &str,
        hosted: &[String],
    ) -> Command {
        let ttyd = &self.config.ttyd;
        let mut cmd = Command::new(&ttyd.bin);
        cmd.arg("--writable")
            .arg("-p")
            .arg(port.to_string())
            .arg("-i")
            .arg(self.exposure.bind_address())
            .arg("-c")
            .arg(format!("{}:{}", identity.username, token))
            .arg("-t")
            .arg(format!("fontSize={}", ttyd.font_size))
            .arg("-t")
            .arg(format!("fontFamily={}", ttyd.font_family))
            .arg("-t")
            .arg(format!("theme={}", ttyd.theme))
            .args(hosted)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        identity.demote(&mut cmd);
        cmd
    }
}

/// Local attach: turn mouse reporting off first so browser-side mouse
/// handling does not fight tmux pass-through, then replace the shell with
/// the attach.
fn local_attach_argv(socket: &Path, session: &str) -> Vec<String> {
    let sock = socket.display();
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!(
            "tmux -S {sock} set-option -t {session} mouse off 2>/dev/null || true; \
             exec tmux -S {sock} attach -t {session}"
        ),
    ]
}

/// Remote attach: force PTY allocation so tmux gets a real terminal on
/// the far side.
fn remote_attach_argv(host: &RemoteHost, ssh_user: &str, session: &str) -> Vec<String> {
    let mut args = ssh::base_args(host, ssh_user, None);
    let destination = args.pop().expect("base_args always ends with destination");
    let mut argv = vec!["ssh".to_string(), "-tt".to_string()];
    argv.extend(args);
    argv.push("-o".to_string());
    argv.push("LogLevel=QUIET".to_string());
    argv.push(destination);
    argv.extend([
        "tmux".to_string(),
        "attach".to_string(),
        "-t".to_string(),
        session.to_string(),
    ]);
    argv
}

/// Mint an unguessable per-instance token. ttyd enforces it as the basic
/// auth password, so a leaked port number alone grants nothing.
fn mint_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wm_core::types::HostId;

    fn host() -> RemoteHost {
        RemoteHost {
            id: HostId::new("a1b2c3d4"),
            name: "build".into(),
            hostname: "build.example.com".into(),
            port: 22,
            username: Some("deploy".into()),
            enabled: true,
        }
    }

    #[test]
    fn test_local_attach_argv_disables_mouse() {
        let argv = local_attach_argv(Path::new("/tmp/tmux-1000/default"), "work");
        assert_eq!(argv[0], "sh");
        assert!(argv[2].contains("mouse off"));
        assert!(argv[2].contains("exec tmux -S /tmp/tmux-1000/default attach -t work"));
    }

    #[test]
    fn test_remote_attach_argv_forces_pty() {
        let argv = remote_attach_argv(&host(), "deploy", "work");
        assert_eq!(argv[0], "ssh");
        assert_eq!(argv[1], "-tt");
        assert!(argv.contains(&"deploy@build.example.com".to_string()));
        assert_eq!(argv.last().unwrap(), "work");
        // Quiet logging keeps ssh noise out of the terminal stream
        assert!(argv.contains(&"LogLevel=QUIET".to_string()));
    }

    #[test]
    fn test_tokens_are_long_and_unique() {
        let a = mint_token();
        let b = mint_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
