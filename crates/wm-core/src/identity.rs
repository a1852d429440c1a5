//! OS user resolution and privilege demotion
//!
//! Every privileged launch in webmux goes through this module: the daemon
//! runs with enough privilege to serve many users, so each child process
//! (ttyd, tmux, ssh) must be executed under the requesting user's own
//! uid/gid. Demotion is what keeps one user from driving another user's
//! sessions or borrowing their SSH keys.

use std::ffi::CString;
use std::io;
use std::path::PathBuf;

use crate::error::IdentityError;

/// A resolved OS user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Login name
    pub username: String,
    /// Numeric user id
    pub uid: u32,
    /// Primary group id
    pub gid: u32,
    /// Home directory
    pub home: PathBuf,
}

impl UserIdentity {
    /// Resolve a username against the system user database.
    ///
    /// An unknown user is a hard error; callers never fall back to running
    /// anything under the daemon's own identity.
    pub fn resolve(username: &str) -> Result<Self, IdentityError> {
        let cname = CString::new(username)
            .map_err(|_| IdentityError::UnknownUser(username.to_string()))?;

        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let mut buf = vec![0u8; 4096];

        loop {
            let ret = unsafe {
                libc::getpwnam_r(
                    cname.as_ptr(),
                    &mut pwd,
                    buf.as_mut_ptr() as *mut libc::c_char,
                    buf.len(),
                    &mut result,
                )
            };

            if ret == libc::ERANGE {
                // Entry larger than the buffer; grow and retry
                buf.resize(buf.len() * 2, 0);
                continue;
            }
            if ret != 0 {
                return Err(IdentityError::Lookup {
                    user: username.to_string(),
                    source: io::Error::from_raw_os_error(ret),
                });
            }
            break;
        }

        if result.is_null() {
            return Err(IdentityError::UnknownUser(username.to_string()));
        }

        let home = unsafe { std::ffi::CStr::from_ptr(pwd.pw_dir) }
            .to_string_lossy()
            .into_owned();

        Ok(Self {
            username: username.to_string(),
            uid: pwd.pw_uid,
            gid: pwd.pw_gid,
            home: PathBuf::from(home),
        })
    }

    /// Whether this identity is the one the daemon is already running as
    pub fn is_current(&self) -> bool {
        self.uid == current_euid()
    }

    /// Arrange for `cmd` to execute under this identity.
    ///
    /// When the daemon already runs as the target user this is a no-op;
    /// otherwise the child is given the user's gid and uid before exec
    /// (gid first, applied by the standard library in that order).
    pub fn demote(&self, cmd: &mut tokio::process::Command) {
        if self.is_current() {
            return;
        }
        cmd.uid(self.uid).gid(self.gid);
    }
}

/// Effective uid of the daemon process
pub fn current_euid() -> u32 {
    unsafe { libc::geteuid() }
}
