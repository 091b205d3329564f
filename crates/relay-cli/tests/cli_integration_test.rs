//! CLI Integration Tests
//!
//! Runs the built `relay` binary as a child process.
//!
//! Test Scenarios:
//! 1. Startup fails when configuration is missing or malformed
//! 2. URL validation (http:// prefix requirement)
//! 3. A configured relay forwards requests to a live upstream
//!
//! Every test clears the configuration variables inherited from the outer
//! environment and sets `ENV=production` so a stray `.env` file is ignored.

use std::net::SocketAddr;
use std::process::{Child, Command, Output, Stdio};
use std::time::Duration;

use axum::{body::Bytes, Router};
use tokio::net::TcpListener;

// ============================================================================
// Test Helpers
// ============================================================================

const CONFIG_VARS: [&str; 7] = [
    "RPCs",
    "FALLBACK_RPCs",
    "PORT",
    "ERROR_TIME_TO_LIVE_MINUTES",
    "SLACK_WEBHOOK_URL",
    "UPSTREAM_TIMEOUT_MS",
    "EXCLUSION_CAPACITY",
];

/// Builds a command for the relay binary with a clean configuration.
fn relay_command() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_relay"));
    for var in CONFIG_VARS {
        command.env_remove(var);
    }
    command.env("ENV", "production");
    command
}

fn valid_env(command: &mut Command, port: u16) -> &mut Command {
    command
        .env("RPCs", "http://127.0.0.1:9001,http://127.0.0.1:9002")
        .env("FALLBACK_RPCs", "http://127.0.0.1:9003")
        .env("PORT", port.to_string())
        .env("ERROR_TIME_TO_LIVE_MINUTES", "1")
        .env("SLACK_WEBHOOK_URL", "http://127.0.0.1:9004/hook")
}

fn run(command: &mut Command) -> Output {
    command.output().expect("failed to run relay binary")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Reserves a free port by binding to port 0 and releasing it.
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Starts an upstream that answers every request with a fixed body.
async fn start_upstream(body: &'static str) -> SocketAddr {
    let app = Router::new().fallback(move |_body: Bytes| async move { body });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Kills the child process when dropped so a failing test does not leak it.
struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

// ============================================================================
// Configuration Validation Tests
// ============================================================================

#[test]
fn test_missing_configuration_fails() {
    let output = run(&mut relay_command());

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Missing required environment variable"));
}

#[test]
fn test_each_missing_variable_is_named() {
    for var in ["RPCs", "FALLBACK_RPCs", "PORT", "SLACK_WEBHOOK_URL"] {
        let mut command = relay_command();
        valid_env(&mut command, 8080).env_remove(var);
        let output = run(&mut command);

        assert!(!output.status.success(), "{} should be required", var);
        assert!(stderr(&output).contains(var), "stderr should name {}", var);
    }
}

#[test]
fn test_endpoint_missing_http_prefix() {
    let mut command = relay_command();
    valid_env(&mut command, 8080).env("RPCs", "127.0.0.1:9001");
    let output = run(&mut command);

    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("http://") || err.contains("https://"));
}

#[test]
fn test_flag_endpoint_missing_http_prefix() {
    let mut command = relay_command();
    valid_env(&mut command, 8080).args(["--fallback-rpc", "127.0.0.1:9003"]);
    let output = run(&mut command);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("127.0.0.1:9003"));
}

#[test]
fn test_invalid_ttl_fails() {
    for ttl in ["soon", "0"] {
        let mut command = relay_command();
        valid_env(&mut command, 8080).env("ERROR_TIME_TO_LIVE_MINUTES", ttl);
        let output = run(&mut command);

        assert!(!output.status.success(), "TTL {:?} should be rejected", ttl);
        assert!(stderr(&output).contains("ERROR_TIME_TO_LIVE_MINUTES"));
    }
}

#[test]
fn test_invalid_port_flag_fails() {
    let mut command = relay_command();
    valid_env(&mut command, 8080).args(["--port", "eighty"]);
    let output = run(&mut command);

    assert!(!output.status.success());
}

// ============================================================================
// End-to-End Tests
// ============================================================================

#[tokio::test]
async fn test_relay_forwards_to_upstream() {
    let upstream = start_upstream("from-upstream").await;
    let port = free_port();

    let mut command = relay_command();
    valid_env(&mut command, port)
        .env("RPCs", format!("http://{}", upstream))
        .env("FALLBACK_RPCs", format!("http://{}", upstream))
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    let _child = ChildGuard(command.spawn().expect("failed to spawn relay binary"));

    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/rpc", port);

    let mut relayed = None;
    for _ in 0..50 {
        match client.post(&url).body("{}").send().await {
            Ok(response) => {
                relayed = Some((response.status(), response.text().await.unwrap()));
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }

    let (status, body) = relayed.expect("relay never started listening");
    assert_eq!(status, 200);
    assert_eq!(body, "from-upstream");
}
