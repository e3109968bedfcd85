//! Shared fixtures: a fake `bw` executable and a fake `bw serve` backend

#![allow(dead_code)]

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use config::{BitwardenConfig, LogFormat, ServerConfig, SidecarConfig, TelemetryConfig, TimeoutConfig};
use secrecy::Secret;
use tempfile::TempDir;

pub const SESSION: &str = "session-token";

/// Behaviour switches are marker files next to the script so that tests
/// running in parallel never share state through the process environment.
const FAKE_BW: &str = r#"#!/bin/sh
dir=$(dirname "$0")
case "$1" in
  config)
    echo "Saved setting \`config\`."
    exit 0 ;;
  login)
    if [ "$BW_CLIENTID" != "user.abc" ] || [ "$BW_CLIENTSECRET" != "s3cr3t" ]; then
      echo "client_id or client_secret is incorrect. Try again." >&2
      exit 1
    fi
    echo "You are logged in!"
    exit 0 ;;
  unlock)
    if [ "$2" = "--check" ]; then
      if [ "$BW_SESSION" = "session-token" ]; then echo "Vault is unlocked!"; exit 0; fi
      echo "Vault is locked." >&2
      exit 1
    fi
    if [ "$BW_PASSWORD" != "master" ]; then echo "Invalid master password." >&2; exit 1; fi
    echo "session-token"
    exit 0 ;;
  sync)
    if [ -f "$dir/sync-fails" ] || [ "$BW_SESSION" != "session-token" ]; then
      echo "You are not logged in." >&2
      exit 1
    fi
    echo "Syncing complete."
    exit 0 ;;
  serve)
    if [ "$BW_SESSION" != "session-token" ]; then echo "missing session" >&2; exit 4; fi
    if [ -f "$dir/serve-hangs" ]; then exec sleep 30; fi
    echo "Listening on $3:$5"
    exit 3 ;;
esac
exit 2
"#;

pub struct FakeBw {
    dir: TempDir,
    pub path: PathBuf,
}

impl FakeBw {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("bw");
        std::fs::write(&path, FAKE_BW).expect("write fake bw");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        Self { dir, path }
    }

    pub fn fail_sync(&self) {
        std::fs::write(self.dir.path().join("sync-fails"), b"").expect("marker");
    }

    pub fn hang_serve(&self) {
        std::fs::write(self.dir.path().join("serve-hangs"), b"").expect("marker");
    }
}

/// Fake `bw serve`: `/status` reports `status`, everything else is echoed back
pub struct FakeBackend {
    pub addr: SocketAddr,
    pub status_hits: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub async fn start(status: &'static str) -> Self {
        let status_hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/status", get(status_handler))
            .fallback(echo_handler)
            .with_state((status, status_hits.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, status_hits }
    }

    pub fn hits(&self) -> usize {
        self.status_hits.load(Ordering::SeqCst)
    }
}

type BackendState = (&'static str, Arc<AtomicUsize>);

async fn status_handler(State((status, hits)): State<BackendState>) -> Json<serde_json::Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({
        "success": true,
        "data": { "object": "template", "template": { "status": status } }
    }))
}

async fn echo_handler(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let payload = serde_json::json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "body": String::from_utf8_lossy(&body),
        "x_custom": header("x-custom"),
        "connection": header("connection"),
        "host": header("host"),
    });

    (
        StatusCode::CREATED,
        [("x-backend", "fake-bw-serve")],
        Json(payload),
    )
        .into_response()
}

/// Port with nothing listening
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

pub fn sidecar_config(bw: &FakeBw, backend_port: u16, password: &str) -> SidecarConfig {
    SidecarConfig {
        bitwarden: BitwardenConfig {
            host: Some("https://vault.example.com".to_string()),
            client_id: Secret::new("user.abc".to_string()),
            client_secret: Secret::new("s3cr3t".to_string()),
            password: Secret::new(password.to_string()),
            binary: bw.path.to_string_lossy().into_owned(),
        },
        server: ServerConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            backend_host: "127.0.0.1".to_string(),
            backend_port,
        },
        timeouts: TimeoutConfig {
            health: Duration::from_secs(2),
            sync: Duration::from_secs(10),
            command: Duration::from_secs(10),
        },
        sync_interval: None,
        verify_unlock: true,
        debug: false,
        telemetry: TelemetryConfig {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_addr: None,
        },
    }
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
