//! Component tests for the hosting modes.
//!
//! These run the real server on loopback sockets and talk to it with an
//! HTTP client, while an in-process supervisor drives the lifecycle.

use std::io::Write;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use authenticator_lib::service::event_log::{Level, MemoryEventLog};
use authenticator_lib::service::{
    self, stdio, ControlCommand, EventLog, LifecycleState, ServiceStatus, SupervisorChannel,
};
use authenticator_lib::{GatewayConfig, GatewayError, GatewayResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn loopback_config(port: u16) -> GatewayConfig {
    GatewayConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port,
        ..Default::default()
    }
}

async fn next_status(rx: &mut mpsc::Receiver<ServiceStatus>) -> ServiceStatus {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed")
}

// =========================================================================
// Supervised mode
// =========================================================================

#[tokio::test]
async fn supervised_service_serves_until_stopped() {
    let port = free_port();
    let config = loopback_config(port);
    let events = MemoryEventLog::new();
    let (channel, commands, mut statuses) = SupervisorChannel::pair(8);

    let task = {
        let config = config.clone();
        let events = events.clone();
        tokio::spawn(async move {
            service::run_service(
                &config,
                Arc::new(config.domain_policy()),
                Arc::new(events),
                channel,
            )
            .await
        })
    };

    assert_eq!(next_status(&mut statuses).await.state, LifecycleState::StartPending);
    let running = next_status(&mut statuses).await;
    assert_eq!(running.state, LifecycleState::Running);
    assert_eq!(running.accepts.len(), 2);

    // Running is only reported once the port is bound.
    let url = format!("http://127.0.0.1:{}/ActiveUser", port);
    let client = reqwest::Client::builder().no_proxy().build().unwrap();

    let resp = client
        .get(&url)
        .basic_auth("alice@example.com", Some("apple"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "Name": "alice@example.com" }));

    let resp = client
        .get(&url)
        .basic_auth("alice@example.com", Some("wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers().get("www-authenticate").unwrap().to_str().unwrap(),
        "Basic realm=\"restricted\""
    );

    commands.send(ControlCommand::Interrogate).await.unwrap();
    assert_eq!(next_status(&mut statuses).await, running);

    commands
        .send(ControlCommand::Other("pause".into()))
        .await
        .unwrap();
    commands.send(ControlCommand::Stop).await.unwrap();
    assert_eq!(next_status(&mut statuses).await.state, LifecycleState::StopPending);

    task.await.unwrap().unwrap();

    let info = events.messages(Level::Info);
    assert!(info.contains(&format!(
        "starting TM1-Authenticator-Service service on port {}",
        port
    )));
    assert!(info.contains(&"service TM1-Authenticator-Service stopped".to_string()));
    assert_eq!(
        events.messages(Level::Error),
        vec!["unexpected control request: pause".to_string()]
    );
}

#[tokio::test]
async fn occupied_port_is_fatal_before_running() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let config = loopback_config(taken.local_addr().unwrap().port());
    let events = MemoryEventLog::new();
    let (channel, _commands, mut statuses) = SupervisorChannel::pair(8);

    let err = service::run_service(
        &config,
        Arc::new(config.domain_policy()),
        Arc::new(events.clone()),
        channel,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, GatewayError::Bind { .. }));
    assert_eq!(next_status(&mut statuses).await.state, LifecycleState::StartPending);
    assert!(statuses.recv().await.is_none(), "Running must not be reported");

    let errors = events.messages(Level::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("service TM1-Authenticator-Service failed:"));
}

#[tokio::test]
async fn invalid_realm_fails_startup() {
    let config = GatewayConfig {
        realm: "line\nbreak".into(),
        ..loopback_config(0)
    };
    let (channel, _commands, _statuses) = SupervisorChannel::pair(8);

    let err = service::run_service(
        &config,
        Arc::new(config.domain_policy()),
        Arc::new(MemoryEventLog::new()),
        channel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, GatewayError::Config(_)));
}

// =========================================================================
// Supervised mode over the stdio protocol
// =========================================================================

async fn run_over_stdio(
    config: &GatewayConfig,
    input: &[u8],
) -> (GatewayResult<()>, Vec<String>) {
    let (mut supervisor_in, service_in) = tokio::io::duplex(256);
    let (service_out, mut supervisor_out) = tokio::io::duplex(4096);
    supervisor_in.write_all(input).await.unwrap();

    let events: Arc<dyn EventLog> = Arc::new(MemoryEventLog::new());
    let (channel, _signals, writer) = stdio::connect(service_in, service_out, events.clone());
    let result = service::run_attached(
        config,
        Arc::new(config.domain_policy()),
        events,
        channel,
        writer,
    )
    .await;

    // The writer has finished, so its end of the pipe is closed.
    let mut out = String::new();
    supervisor_out.read_to_string(&mut out).await.unwrap();
    (result, out.lines().map(str::to_string).collect())
}

#[tokio::test]
async fn stdio_stop_writes_stop_pending_last() {
    let (result, lines) = run_over_stdio(&loopback_config(0), b"interrogate\nstop\n").await;
    result.unwrap();

    assert_eq!(
        lines,
        vec![
            r#"{"state":"start_pending","accepts":[]}"#,
            r#"{"state":"running","accepts":["stop","shutdown"]}"#,
            r#"{"state":"running","accepts":["stop","shutdown"]}"#,
            r#"{"state":"stop_pending","accepts":[]}"#,
        ]
    );
}

#[tokio::test]
async fn stdio_shutdown_writes_stop_pending_last() {
    let (result, lines) = run_over_stdio(&loopback_config(0), b"SHUTDOWN\n").await;
    result.unwrap();
    assert_eq!(
        lines.last().map(String::as_str),
        Some(r#"{"state":"stop_pending","accepts":[]}"#)
    );
}

#[tokio::test]
async fn stdio_bind_failure_still_writes_start_pending() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let config = loopback_config(taken.local_addr().unwrap().port());

    let (result, lines) = run_over_stdio(&config, b"stop\n").await;
    assert!(matches!(result, Err(GatewayError::Bind { .. })));
    assert_eq!(lines, vec![r#"{"state":"start_pending","accepts":[]}"#]);
}

// =========================================================================
// Interactive mode
// =========================================================================

#[tokio::test]
async fn interactive_mode_serves_same_contract() {
    let port = free_port();
    let config = loopback_config(port);
    let events = MemoryEventLog::new();

    let task = {
        let config = config.clone();
        let events = events.clone();
        tokio::spawn(async move {
            service::run_interactive(&config, Arc::new(config.domain_policy()), Arc::new(events))
                .await
        })
    };

    let url = format!("http://127.0.0.1:{}/ActiveUser", port);
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let mut resp = None;
    for _ in 0..50 {
        match client
            .get(&url)
            .basic_auth("carol@example.com", Some("apple"))
            .send()
            .await
        {
            Ok(r) => {
                resp = Some(r);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    let resp = resp.expect("interactive server never came up");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["Name"], "carol@example.com");

    assert!(events
        .messages(Level::Info)
        .contains(&format!("Starting Authenticator service on port {}", port)));

    task.abort();
}

// =========================================================================
// Configuration files
// =========================================================================

#[test]
fn config_file_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"port": 9443, "path": "/authenticate", "policy": {{"domain": "corp.test", "secret": "pear"}}}}"#
    )
    .unwrap();

    let config = GatewayConfig::load(file.path()).unwrap();
    assert_eq!(config.port, 9443);
    assert_eq!(config.path, "/authenticate");
    assert_eq!(config.realm, "restricted");
    assert!(config.validate().is_ok());

    use authenticator_lib::credentials::CredentialValidator;
    let policy = config.domain_policy();
    assert!(policy.validate("dave@corp.test", "pear"));
    assert!(!policy.validate("dave@example.com", "apple"));
}

#[test]
fn unreadable_config_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = GatewayConfig::load(&dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, GatewayError::Config(_)));
}

#[test]
fn malformed_config_is_a_json_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();
    let err = GatewayConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, GatewayError::Json(_)));
}
