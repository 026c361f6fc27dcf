use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use cinder::engine::Registry;
use cinder::store::{JobStatus, Params};
use cinder::trigger::{Response, TriggerEndpoint, TriggerServer, client};
use cinder_test_utils::builders::{TestWorkdir, WorkdirBuilder};
use cinder_test_utils::{init_tracing, with_timeout};

const SETTLE: Duration = Duration::from_secs(10);

/// Bind a trigger server over `builder`'s work directory, with jobs seeing
/// its endpoint the way `serve` wires them.
async fn start_server(builder: WorkdirBuilder) -> (TestWorkdir, Registry, TriggerEndpoint) {
    let wd = builder.build();
    let server = TriggerServer::bind().await.unwrap();
    let endpoint = server.endpoint().clone();
    let registry = Registry::with_job_env(wd.path(), endpoint.env_vars());
    server.spawn(registry.clone());
    (wd, registry, endpoint)
}

async fn raw_exchange(endpoint: &TriggerEndpoint, line: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(endpoint.address()).await.unwrap();
    stream.write_all(line.as_bytes()).await.unwrap();
    let mut answer = Vec::new();
    stream.read_to_end(&mut answer).await.unwrap();
    answer
}

#[tokio::test(flavor = "multi_thread")]
async fn server_binds_loopback_with_fresh_token() {
    init_tracing();
    let (_wd, _registry, endpoint) = start_server(WorkdirBuilder::new()).await;

    assert_ne!(endpoint.port, 0);
    assert_eq!(endpoint.token.len(), 32);
    assert!(endpoint.address().ip().is_loopback());
}

#[tokio::test(flavor = "multi_thread")]
async fn valid_request_starts_a_job() {
    init_tracing();
    let builder = WorkdirBuilder::new().with_project("remote", "echo \"token=$SOCKET_TOKEN\"\n");
    let (wd, registry, endpoint) = start_server(builder).await;

    let response = with_timeout(client::start_project(&endpoint, "remote"))
        .await
        .unwrap();
    assert_eq!(response, Response::Ok);

    assert!(registry.wait_idle(SETTLE).await);
    let project = wd.project("remote");
    let job = registry.open_job(&project, "1");
    assert_eq!(job.status(), JobStatus::Finished);
    assert!(job.read_output().contains(&format!("token={}", endpoint.token)));
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_token_is_refused_without_side_effects() {
    init_tracing();
    let builder = WorkdirBuilder::new().with_project("remote", "true\n");
    let (wd, registry, endpoint) = start_server(builder).await;

    let forged = "z".repeat(32);
    let answer = with_timeout(raw_exchange(&endpoint, &format!("{forged} 1 6 remote\n"))).await;
    assert_eq!(answer, vec![1, b'\n']);

    assert_eq!(wd.project("remote").last_count(), 0);
    assert!(registry.running().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn garbage_is_answered_with_failure() {
    init_tracing();
    let (_wd, _registry, endpoint) = start_server(WorkdirBuilder::new()).await;

    let answer = with_timeout(raw_exchange(&endpoint, "hello there\n")).await;
    assert_eq!(answer, vec![1, b'\n']);

    let line = format!("{} 1 99 short\n", endpoint.token);
    let answer = with_timeout(raw_exchange(&endpoint, &line)).await;
    assert_eq!(answer, vec![1, b'\n']);
}

#[tokio::test(flavor = "multi_thread")]
async fn refused_starts_answer_failure() {
    init_tracing();
    let builder = WorkdirBuilder::new().with_project("slow", "sleep 30\n");
    let (_wd, registry, endpoint) = start_server(builder).await;

    let unknown = with_timeout(client::start_project(&endpoint, "missing")).await.unwrap();
    assert_eq!(unknown, Response::Fail);

    let first = with_timeout(client::start_project(&endpoint, "slow")).await.unwrap();
    assert_eq!(first, Response::Ok);
    let busy = with_timeout(client::start_project(&endpoint, "slow")).await.unwrap();
    assert_eq!(busy, Response::Fail);

    registry.interrupt_all();
    assert!(registry.wait_idle(SETTLE).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn job_environment_reaches_the_server() {
    init_tracing();
    let builder = WorkdirBuilder::new()
        .with_project("downstream", "echo downstream ran\n")
        .with_project("upstream", "echo \"$SOCKET_PORT $SOCKET_TOKEN\"\n");
    let (wd, registry, _endpoint) = start_server(builder).await;

    assert!(registry.start_job(&wd.project("upstream"), Params::new()).is_started());
    assert!(registry.wait_idle(SETTLE).await);

    let upstream = registry.open_job(&wd.project("upstream"), "1");
    assert_eq!(upstream.status(), JobStatus::Finished);

    // Use exactly what the script saw, as `cinder start` would.
    let output = upstream.read_output();
    let (port, token) = output.trim().split_once(' ').unwrap();
    let endpoint = TriggerEndpoint {
        port: port.parse().unwrap(),
        token: token.to_string(),
    };

    let response = with_timeout(client::start_project(&endpoint, "downstream")).await.unwrap();
    assert_eq!(response, Response::Ok);

    assert!(registry.wait_idle(SETTLE).await);
    let downstream = registry.open_job(&wd.project("downstream"), "1");
    assert_eq!(downstream.status(), JobStatus::Finished);
    assert!(downstream.read_output().contains("downstream ran"));
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_closes_the_socket_before_interrupting() {
    init_tracing();
    let wd = WorkdirBuilder::new()
        .with_project("slow", "sleep 30\n")
        .with_project("late", "sleep 30\n")
        .build();
    let server = TriggerServer::bind().await.unwrap();
    let endpoint = server.endpoint().clone();
    let registry = Registry::with_job_env(wd.path(), endpoint.env_vars());
    let listener = server.spawn(registry.clone());

    let started = with_timeout(client::start_project(&endpoint, "slow")).await.unwrap();
    assert_eq!(started, Response::Ok);

    assert!(with_timeout(cinder::shutdown(&registry, listener, SETTLE)).await);

    let slow = registry.open_job(&wd.project("slow"), "1");
    assert_eq!(slow.status(), JobStatus::Stopped);
    assert!(registry.running().is_empty());

    // Nothing can be started once shutdown has begun.
    assert!(client::start_project(&endpoint, "late").await.is_err());
    assert_eq!(wd.project("late").last_count(), 0);
}
