//! IPC integration tests
//!
//! Drives the JSON-lines protocol end to end: host CRUD round-trips and
//! attach/stop through a stub ttyd executable.

use std::os::unix::fs::PermissionsExt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use wm_core::config::{ExposureConfig, ServerConfig};
use wm_core::ipc::{IpcRequest, IpcResponse};
use wm_core::types::HostSpec;
use wm_orchestrator::ipc::IpcServer;
use wm_orchestrator::OrchestratorState;

/// Base port for test servers - each test gets a unique offset
static PORT_COUNTER: AtomicU16 = AtomicU16::new(0);

fn get_test_port() -> u16 {
    let offset = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
    39300 + offset
}

fn test_state(dir: &tempfile::TempDir) -> Arc<OrchestratorState> {
    let stub = dir.path().join("ttyd-stub");
    std::fs::write(&stub, "#!/bin/sh\nexec sleep 30\n").unwrap();
    let mut perms = std::fs::metadata(&stub).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&stub, perms).unwrap();

    let mut config = ServerConfig {
        exposure: ExposureConfig::Direct {
            bind_address: "127.0.0.1".to_string(),
        },
        hosts_dir: dir.path().join("hosts"),
        ..Default::default()
    };
    config.ttyd.bin = stub.display().to_string();
    config.timeouts.stop_grace = Duration::from_secs(2);
    Arc::new(OrchestratorState::new(config))
}

struct TestClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: BufWriter<tokio::net::tcp::OwnedWriteHalf>,
}

impl TestClient {
    async fn connect(address: &str) -> Self {
        // Retry connection a few times in case server isn't ready
        let mut last_err = None;
        for _ in 0..20 {
            match TcpStream::connect(address).await {
                Ok(stream) => {
                    let (reader, writer) = stream.into_split();
                    return Self {
                        reader: BufReader::new(reader),
                        writer: BufWriter::new(writer),
                    };
                }
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
        panic!(
            "Failed to connect to IPC server at {}: {:?}",
            address, last_err
        );
    }

    async fn send_request(&mut self, request: IpcRequest) -> IpcResponse {
        let mut request_json =
            serde_json::to_string(&request).expect("Failed to serialize request");
        request_json.push('\n');
        self.writer
            .write_all(request_json.as_bytes())
            .await
            .expect("Failed to write request");
        self.writer.flush().await.expect("Failed to flush");

        let mut response_line = String::new();
        self.reader
            .read_line(&mut response_line)
            .await
            .expect("Failed to read response");
        assert!(!response_line.is_empty(), "connection closed");
        serde_json::from_str(&response_line).expect("Failed to parse response")
    }
}

async fn start_server(state: Arc<OrchestratorState>) -> (String, CancellationToken) {
    let address = format!("127.0.0.1:{}", get_test_port());
    let cancel = CancellationToken::new();
    let server = IpcServer::new(address.clone(), state, cancel.clone());
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (address, cancel)
}

#[tokio::test]
async fn test_ping_pong() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    let (address, cancel) = start_server(state).await;

    let mut client = TestClient::connect(&address).await;
    let response = client.send_request(IpcRequest::Ping).await;
    assert!(matches!(response, IpcResponse::Pong));

    cancel.cancel();
}

#[tokio::test]
async fn test_host_crud_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    let (address, cancel) = start_server(state).await;
    let mut client = TestClient::connect(&address).await;
    let username = whoami::username();

    // Empty to start
    let response = client
        .send_request(IpcRequest::ListHosts {
            username: username.clone(),
        })
        .await;
    match response {
        IpcResponse::Hosts { hosts } => assert!(hosts.is_empty()),
        other => panic!("unexpected response: {:?}", other),
    }

    // Add generates an id and fills defaults
    let response = client
        .send_request(IpcRequest::AddHost {
            username: username.clone(),
            host: HostSpec {
                name: None,
                hostname: "build.example.com".into(),
                port: None,
                username: None,
                enabled: None,
            },
        })
        .await;
    let added = match response {
        IpcResponse::HostAdded { host } => host,
        other => panic!("unexpected response: {:?}", other),
    };
    assert_eq!(added.id.as_str().len(), 8);
    assert_eq!(added.port, 22);

    // Listed back
    let response = client
        .send_request(IpcRequest::ListHosts {
            username: username.clone(),
        })
        .await;
    match response {
        IpcResponse::Hosts { hosts } => {
            assert_eq!(hosts.len(), 1);
            assert_eq!(hosts[0].id, added.id);
        }
        other => panic!("unexpected response: {:?}", other),
    }

    // Delete removes it
    let response = client
        .send_request(IpcRequest::DeleteHost {
            username: username.clone(),
            host_id: added.id,
        })
        .await;
    assert!(matches!(response, IpcResponse::Ok));

    let response = client
        .send_request(IpcRequest::ListHosts { username })
        .await;
    match response {
        IpcResponse::Hosts { hosts } => assert!(hosts.is_empty()),
        other => panic!("unexpected response: {:?}", other),
    }

    cancel.cancel();
}

#[tokio::test]
async fn test_attach_and_stop_over_ipc() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    let (address, cancel) = start_server(Arc::clone(&state)).await;
    let mut client = TestClient::connect(&address).await;
    let username = whoami::username();

    let response = client
        .send_request(IpcRequest::Attach {
            username: username.clone(),
            session_name: "work".into(),
            host_id: Default::default(),
        })
        .await;
    let info = match response {
        IpcResponse::Attached(info) => info,
        other => panic!("unexpected response: {:?}", other),
    };
    assert!(!info.reused);
    assert_eq!(state.terminals.len(), 1);

    // Second attach reuses
    let response = client
        .send_request(IpcRequest::Attach {
            username,
            session_name: "work".into(),
            host_id: Default::default(),
        })
        .await;
    match response {
        IpcResponse::Attached(second) => {
            assert!(second.reused);
            assert_eq!(second.terminal_id, info.terminal_id);
        }
        other => panic!("unexpected response: {:?}", other),
    }

    let response = client
        .send_request(IpcRequest::Stop {
            terminal_id: info.terminal_id,
        })
        .await;
    assert!(matches!(response, IpcResponse::Stopped));
    assert_eq!(state.terminals.len(), 0);

    cancel.cancel();
}

#[tokio::test]
async fn test_malformed_request_yields_error() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    let (address, cancel) = start_server(state).await;
    let mut client = TestClient::connect(&address).await;

    client
        .writer
        .write_all(b"this is not json\n")
        .await
        .unwrap();
    client.writer.flush().await.unwrap();

    let mut line = String::new();
    client.reader.read_line(&mut line).await.unwrap();
    let response: IpcResponse = serde_json::from_str(&line).unwrap();
    assert!(matches!(response, IpcResponse::Error { .. }));

    cancel.cancel();
}
