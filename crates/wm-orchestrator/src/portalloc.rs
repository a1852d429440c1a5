//! Ephemeral port allocation
//!
//! A port is obtained by binding to port 0 and reading back the kernel's
//! choice, then releasing the socket for the terminal server to claim.
//! Nothing reserves the port across that gap: another process could bind
//! it first, in which case the ttyd spawn fails and the attach surfaces
//! the error. The window is accepted rather than eliminated.

use std::net::TcpListener;

use wm_core::error::TerminalError;

/// Find a free TCP port on the given bind address.
pub fn find_free_port(bind_address: &str) -> Result<u16, TerminalError> {
    let listener =
        TcpListener::bind((bind_address, 0)).map_err(TerminalError::PortAllocation)?;
    let port = listener
        .local_addr()
        .map_err(TerminalError::PortAllocation)?
        .port();
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_nonzero_port() {
        let port = find_free_port("127.0.0.1").unwrap();
        assert!(port > 0);
    }

    #[test]
    fn test_released_port_is_bindable() {
        let port = find_free_port("127.0.0.1").unwrap();
        // The socket was released, so the caller can claim the port
        TcpListener::bind(("127.0.0.1", port)).unwrap();
    }
}
