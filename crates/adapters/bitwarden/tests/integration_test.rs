//! Integration tests for the Bitwarden adapter
//!
//! The `bw` binary is replaced by a shell script that checks the environment
//! it receives, so these tests only run on Unix.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use adapter_bitwarden::{
    BackendProbe, BackendStatus, BwCli, BwCliConfigBuilder, CliError, HttpStatusProbe, ProbeError,
};
use axum::{routing::get, Json, Router};
use secrecy::{ExposeSecret, Secret};
use tempfile::TempDir;

const FAKE_BW: &str = r#"#!/bin/sh
for arg in "$@"; do
  if [ "$arg" = "master" ]; then echo "password leaked into argv" >&2; exit 9; fi
done
case "$1" in
  config)
    if [ "$3" = "https://persisted.example.com" ]; then
      echo "Logout required before server config update." >&2
      exit 1
    fi
    if [ "$3" = "not-a-url" ]; then
      echo "Invalid URL." >&2
      exit 1
    fi
    echo "Saved setting \`config\`."
    exit 0 ;;
  login)
    if [ "$BW_CLIENTID" = "user.already" ]; then
      echo "You are already logged in as user@example.com." >&2
      exit 1
    fi
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
    if [ "$BW_PASSWORD" = "empty" ]; then exit 0; fi
    if [ "$BW_PASSWORD" != "master" ]; then echo "Invalid master password." >&2; exit 1; fi
    printf '  session-token\n'
    exit 0 ;;
  sync)
    if [ "$BW_SESSION" = "session-token" ]; then echo "Syncing complete."; exit 0; fi
    echo "You are not logged in." >&2
    exit 1 ;;
  slow)
    sleep 5
    exit 0 ;;
esac
exit 2
"#;

fn fake_bw(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("bw");
    std::fs::write(&path, FAKE_BW).expect("write fake bw");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

fn cli(dir: &TempDir, client_id: &str, password: &str) -> BwCli {
    let config = BwCliConfigBuilder::new(fake_bw(dir).to_string_lossy())
        .with_api_key(client_id, "s3cr3t")
        .with_password(Secret::new(password.to_string()))
        .with_command_timeout(Duration::from_secs(10))
        .with_sync_timeout(Duration::from_secs(10))
        .build();
    BwCli::new(config)
}

#[tokio::test]
async fn test_setup_commands() {
    let dir = TempDir::new().unwrap();
    let cli = cli(&dir, "user.abc", "master");

    cli.configure_server("https://vault.example.com").await.unwrap();
    cli.login_apikey().await.unwrap();

    let session = cli.unlock().await.unwrap();
    assert_eq!(session.expose_secret(), "session-token");

    cli.check_unlocked(&session).await.unwrap();
}

#[tokio::test]
async fn test_login_failure_carries_output() {
    let dir = TempDir::new().unwrap();
    let cli = cli(&dir, "user.wrong", "master");

    match cli.login_apikey().await {
        Err(CliError::Failed { output, .. }) => {
            assert!(output.contains("client_id or client_secret is incorrect"));
        }
        other => panic!("expected login failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_already_logged_in_is_success() {
    let dir = TempDir::new().unwrap();
    let cli = cli(&dir, "user.already", "master");
    assert!(cli.login_apikey().await.is_ok());
}

#[tokio::test]
async fn test_config_server_while_logged_in_is_success() {
    let dir = TempDir::new().unwrap();
    let cli = cli(&dir, "user.already", "master");

    cli.configure_server("https://persisted.example.com").await.unwrap();
    assert!(cli.login_apikey().await.is_ok());
}

#[tokio::test]
async fn test_config_server_other_failures_propagate() {
    let dir = TempDir::new().unwrap();
    let cli = cli(&dir, "user.abc", "master");

    match cli.configure_server("not-a-url").await {
        Err(CliError::Failed { output, .. }) => assert!(output.contains("Invalid URL")),
        other => panic!("expected config failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unlock_failures() {
    let dir = TempDir::new().unwrap();

    let wrong = cli(&dir, "user.abc", "wrong");
    assert!(matches!(wrong.unlock().await, Err(CliError::Failed { .. })));

    let empty = cli(&dir, "user.abc", "empty");
    assert_eq!(empty.unlock().await.unwrap_err(), CliError::EmptyOutput);
}

#[tokio::test]
async fn test_check_rejects_bad_session() {
    let dir = TempDir::new().unwrap();
    let cli = cli(&dir, "user.abc", "master");
    let bad = Secret::new("other".to_string());
    assert!(cli.check_unlocked(&bad).await.is_err());
}

#[tokio::test]
async fn test_sync_output() {
    let dir = TempDir::new().unwrap();
    let cli = cli(&dir, "user.abc", "master");

    let ok = cli.sync(&Secret::new("session-token".to_string())).await.unwrap();
    assert_eq!(ok, "Syncing complete.");

    let err = cli
        .sync(&Secret::new("expired".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.output(), "You are not logged in.");
}

#[tokio::test]
async fn test_sync_timeout() {
    let dir = TempDir::new().unwrap();
    // The fake binary sleeps when invoked as `slow`, so point a wrapper at it.
    let wrapper = dir.path().join("bw-slow");
    std::fs::write(
        &wrapper,
        format!("#!/bin/sh\nexec {} slow\n", fake_bw(&dir).display()),
    )
    .unwrap();
    std::fs::set_permissions(&wrapper, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = BwCliConfigBuilder::new(wrapper.to_string_lossy())
        .with_sync_timeout(Duration::from_millis(200))
        .build();
    let cli = BwCli::new(config);

    let err = cli
        .sync(&Secret::new("session-token".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::Timeout(_)));
}

async fn serve_status(status: &'static str) -> String {
    let app = Router::new().route(
        "/status",
        get(move || async move {
            Json(serde_json::json!({
                "success": true,
                "data": { "object": "template", "template": { "status": status } }
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_http_status_unlocked_and_locked() {
    let unlocked = HttpStatusProbe::new(&serve_status("unlocked").await, Duration::from_secs(2)).unwrap();
    assert_eq!(unlocked.status().await.unwrap(), BackendStatus::Unlocked);

    let locked = HttpStatusProbe::new(&serve_status("locked").await, Duration::from_secs(2)).unwrap();
    assert_eq!(
        locked.status().await.unwrap(),
        BackendStatus::Locked("locked".to_string())
    );
}

#[tokio::test]
async fn test_http_status_unreachable() {
    // Bind then drop to get a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let probe = HttpStatusProbe::new(&format!("http://{}", addr), Duration::from_secs(1)).unwrap();
    assert!(matches!(probe.status().await, Err(ProbeError::Unreachable(_))));
}
