//! SSH invocation plumbing
//!
//! webmux never speaks the SSH protocol itself; it shells out to the ssh
//! binary under the requesting user's identity so that user's own keys and
//! agent are what authenticate. These helpers build the shared argument
//! prefix so every call site applies the same host-key and timeout policy.

use std::time::Duration;

use wm_core::types::RemoteHost;

/// Base ssh arguments up to and including the destination.
///
/// Host keys are not verified: hosts are user-configured by address and the
/// per-user known_hosts files of a demoted process would be written inside
/// the daemon's filesystem view, where first-connect prompts cannot be
/// answered.
pub fn base_args(
    host: &RemoteHost,
    ssh_user: &str,
    connect_timeout: Option<Duration>,
) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        host.port.to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
    ];
    if let Some(timeout) = connect_timeout {
        args.push("-o".to_string());
        args.push(format!("ConnectTimeout={}", timeout.as_secs().max(1)));
    }
    args.push(format!("{}@{}", ssh_user, host.hostname));
    args
}

/// Whether a name is safe to pass to tmux through a remote shell.
///
/// Remote commands travel as a single string that the far side's shell
/// re-splits, and local attach commands are interpolated into an `sh -c`
/// line, so session names are restricted to characters that survive both.
pub fn is_safe_session_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
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
            port: 2222,
            username: None,
            enabled: true,
        }
    }

    #[test]
    fn test_base_args_destination_is_last() {
        let args = base_args(&host(), "alice", Some(Duration::from_secs(2)));
        assert_eq!(args.last().unwrap(), "alice@build.example.com");
        assert!(args.contains(&"ConnectTimeout=2".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "2222"));
    }

    #[test]
    fn test_base_args_without_timeout() {
        let args = base_args(&host(), "alice", None);
        assert!(!args.iter().any(|a| a.starts_with("ConnectTimeout")));
    }

    #[test]
    fn test_session_name_safety() {
        assert!(is_safe_session_name("work"));
        assert!(is_safe_session_name("dev-box_1.2"));
        assert!(!is_safe_session_name(""));
        assert!(!is_safe_session_name("a b"));
        assert!(!is_safe_session_name("x;rm -rf /"));
        assert!(!is_safe_session_name("$(id)"));
    }
}
