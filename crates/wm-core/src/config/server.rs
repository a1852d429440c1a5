//! Orchestrator daemon configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the webmux orchestrator daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IPC port for the fronting web layer (localhost only)
    pub ipc_port: u16,

    /// Base of per-user tmux control socket directories; the socket for a
    /// user is `<base><uid>/default`
    pub tmux_socket_base: String,

    /// Directory holding the per-user host documents
    pub hosts_dir: PathBuf,

    /// How terminal instances are exposed to clients
    pub exposure: ExposureConfig,

    /// Terminal-serving process settings
    pub ttyd: TtydConfig,

    /// Command and discovery time bounds
    pub timeouts: TimeoutConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ipc_port: 7710,
            exposure: ExposureConfig::default(),
            tmux_socket_base: "/tmp/tmux-".to_string(),
            hosts_dir: super::default_data_dir().join("hosts"),
            ttyd: TtydConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl ServerConfig {
    /// The IPC address (localhost:port)
    pub fn ipc_address(&self) -> String {
        format!("127.0.0.1:{}", self.ipc_port)
    }

    /// The tmux control socket path for a user
    pub fn tmux_socket(&self, uid: u32) -> PathBuf {
        PathBuf::from(format!("{}{}/default", self.tmux_socket_base, uid))
    }
}

/// Deployment topology: either clients reach ttyd ports directly, or a
/// fronting nginx proxies them behind per-terminal paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExposureConfig {
    /// Clients connect straight to the allocated port
    Direct {
        /// Address ttyd binds; advertised back to clients
        bind_address: String,
    },

    /// An nginx instance proxies `/terminal/<id>` to the loopback port
    NginxProxy {
        /// Directory nginx includes per-terminal rule files from
        rules_dir: PathBuf,
        /// Command that makes nginx re-read its configuration
        reload_command: Vec<String>,
        /// How long to wait after a reload before answering the client
        #[serde(with = "duration_millis")]
        settle: Duration,
    },
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self::Direct {
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

impl ExposureConfig {
    /// Default proxy-fronted configuration
    pub fn nginx_defaults() -> Self {
        Self::NginxProxy {
            rules_dir: PathBuf::from("/etc/nginx/terminals"),
            reload_command: vec!["nginx".into(), "-s".into(), "reload".into()],
            settle: Duration::from_millis(300),
        }
    }
}

/// Settings for spawned ttyd processes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtydConfig {
    /// Binary to launch
    pub bin: String,
    /// Terminal font size
    pub font_size: u32,
    /// Terminal font family
    pub font_family: String,
    /// xterm.js theme as a JSON fragment
    pub theme: String,
}

impl Default for TtydConfig {
    fn default() -> Self {
        Self {
            bin: "ttyd".to_string(),
            font_size: 14,
            font_family: "Menlo, Monaco, \"Courier New\", monospace".to_string(),
            theme: r##"{"background": "#0f0f0f", "foreground": "#e0e0e0", "cursor": "#4a9eff"}"##
                .to_string(),
        }
    }
}

/// Time bounds for SSH, discovery and teardown.
///
/// Remote operations are bounded so a single unreachable host cannot stall
/// a listing or mutation; teardown is bounded so stop latency does not
/// depend on child behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// SSH TCP connect bound (passed as ConnectTimeout)
    #[serde(with = "duration_secs")]
    pub ssh_connect: Duration,

    /// Overall bound on a remote session listing
    #[serde(with = "duration_secs")]
    pub remote_list: Duration,

    /// Overall bound on a remote session mutation
    #[serde(with = "duration_secs")]
    pub remote_command: Duration,

    /// Grace between SIGTERM and SIGKILL during teardown
    #[serde(with = "duration_secs")]
    pub stop_grace: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ssh_connect: Duration::from_secs(2),
            remote_list: Duration::from_secs(5),
            remote_command: Duration::from_secs(10),
            stop_grace: Duration::from_secs(5),
        }
    }
}

// Helper modules for Duration serialization as plain integers
mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod duration_millis {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_exposure_is_direct() {
        let config = ServerConfig::default();
        assert!(matches!(config.exposure, ExposureConfig::Direct { .. }));
    }

    #[test]
    fn test_tmux_socket_path() {
        let config = ServerConfig::default();
        assert_eq!(
            config.tmux_socket(1000),
            PathBuf::from("/tmp/tmux-1000/default")
        );
    }

    #[test]
    fn test_timeouts_are_bounded() {
        let t = TimeoutConfig::default();
        assert!(t.ssh_connect <= t.remote_list);
        assert!(t.remote_list <= t.remote_command);
    }

    #[test]
    fn test_exposure_toml_roundtrip() {
        let exposure = ExposureConfig::nginx_defaults();
        let toml = toml::to_string(&exposure).unwrap();
        let back: ExposureConfig = toml::from_str(&toml).unwrap();
        match back {
            ExposureConfig::NginxProxy { settle, .. } => {
                assert_eq!(settle, Duration::from_millis(300));
            }
            _ => panic!("expected nginx exposure"),
        }
    }
}
