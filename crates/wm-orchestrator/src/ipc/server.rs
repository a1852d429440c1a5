//! IPC server implementation
//!
//! Listens on localhost TCP for JSON-line requests from the fronting web
//! layer. That layer authenticates users (PAM) and forwards the
//! authenticated username; the orchestrator trusts it because only
//! loopback peers are accepted.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use wm_core::ipc::{IpcRequest, IpcResponse};

use crate::state::OrchestratorState;

/// IPC server for the web layer.
///
/// Listens on localhost (127.0.0.1) only - not accessible from network.
pub struct IpcServer {
    /// Address to bind (127.0.0.1:port)
    pub address: String,
    /// Orchestrator state
    state: Arc<OrchestratorState>,
    /// Cancellation token for shutdown
    shutdown: CancellationToken,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(address: String, state: Arc<OrchestratorState>, shutdown: CancellationToken) -> Self {
        Self {
            address,
            state,
            shutdown,
        }
    }

    /// Accept and serve clients until the shutdown token fires.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.address)
            .await
            .with_context(|| format!("Failed to bind IPC server to {}", self.address))?;

        tracing::info!("IPC server listening on {}", self.address);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            if !peer_addr.ip().is_loopback() {
                                warn!("Rejected non-localhost connection from {}", peer_addr);
                                continue;
                            }
                            let state = Arc::clone(&self.state);
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(stream, state).await {
                                    warn!("IPC client error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept IPC connection: {}", e);
                        }
                    }
                }
                _ = self.shutdown.cancelled() => {
                    tracing::info!("IPC server shutting down");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_client(stream: TcpStream, state: Arc<OrchestratorState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break; // EOF
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<IpcRequest>(trimmed) {
            Ok(request) => {
                debug!(?request, "IPC request");
                dispatch(request, &state).await
            }
            Err(e) => IpcResponse::Error {
                message: format!("Invalid request: {}", e),
            },
        };

        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        writer.write_all(payload.as_bytes()).await?;
    }

    Ok(())
}

/// Route one request to the owning component. Mutation failures surface
/// the underlying diagnostic text; nothing is retried here.
async fn dispatch(request: IpcRequest, state: &OrchestratorState) -> IpcResponse {
    match request {
        IpcRequest::Ping => IpcResponse::Pong,

        IpcRequest::ListSessions { username } => IpcResponse::Sessions {
            sessions: state.discovery.list_all(&username).await,
        },

        IpcRequest::Attach {
            username,
            session_name,
            host_id,
        } => match state.terminals.attach(&username, &host_id, &session_name).await {
            Ok(info) => IpcResponse::Attached(info),
            Err(e) => IpcResponse::Error {
                message: e.to_string(),
            },
        },

        IpcRequest::Stop { terminal_id } => {
            state.terminals.stop(terminal_id).await;
            IpcResponse::Stopped
        }

        IpcRequest::CreateSession {
            username,
            session_name,
            host_id,
        } => session_mutation(
            state
                .muxctl
                .create_session(&username, &host_id, &session_name)
                .await,
        ),

        IpcRequest::RenameSession {
            username,
            old_name,
            new_name,
            host_id,
        } => session_mutation(
            state
                .muxctl
                .rename_session(&username, &host_id, &old_name, &new_name)
                .await,
        ),

        IpcRequest::DeleteSession {
            username,
            session_name,
            host_id,
        } => session_mutation(
            state
                .muxctl
                .delete_session(&username, &host_id, &session_name)
                .await,
        ),

        IpcRequest::ListHosts { username } => match state.hosts.list(&username).await {
            Ok(hosts) => IpcResponse::Hosts { hosts },
            Err(e) => IpcResponse::Error {
                message: e.to_string(),
            },
        },

        IpcRequest::AddHost { username, host } => match state.hosts.add(&username, host).await {
            Ok(host) => IpcResponse::HostAdded { host },
            Err(e) => IpcResponse::Error {
                message: e.to_string(),
            },
        },

        IpcRequest::UpdateHost {
            username,
            host_id,
            patch,
        } => match state.hosts.update(&username, &host_id, patch).await {
            Ok(_) => IpcResponse::Ok,
            Err(e) => IpcResponse::Error {
                message: e.to_string(),
            },
        },

        IpcRequest::DeleteHost { username, host_id } => {
            match state.hosts.delete(&username, &host_id).await {
                Ok(()) => IpcResponse::Ok,
                Err(e) => IpcResponse::Error {
                    message: e.to_string(),
                },
            }
        }
    }
}

/// Session mutations answer with a refresh hint so the client re-polls
/// the listing instead of patching its local view.
fn session_mutation(result: Result<(), wm_core::error::MuxError>) -> IpcResponse {
    match result {
        Ok(()) => IpcResponse::SessionChanged {
            refresh_sessions: true,
        },
        Err(e) => IpcResponse::Error {
            message: e.to_string(),
        },
    }
}
