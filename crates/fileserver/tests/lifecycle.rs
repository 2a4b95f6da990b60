//! End-to-end tests for the artifact server lifecycle over real loopback sockets.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use fileserver::{
    allocate_ephemeral_port, ArtifactServer, FileServerError, ReadinessPolicy,
    ServerLifecycleController, ServerPhase, READY_BODY, SHUTDOWN_BODY,
};
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

async fn raw_get(port: u16, path: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connect to file server");
    let request = format!("GET {path} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn serves_files_once_ready() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("testfile.txt"), "Hello, world!").unwrap();

    let controller = ServerLifecycleController::new();
    let port = allocate_ephemeral_port().unwrap();
    let mut handle = controller.start(Some(dir.path()), port).await.unwrap();
    assert_eq!(handle.port(), port);
    assert_eq!(handle.phase(), ServerPhase::Starting);

    assert!(controller.await_ready(&mut handle).await);
    assert_eq!(handle.phase(), ServerPhase::Ready);

    let ready = reqwest::get(format!("{}fileserver-is-ready", handle.base_url()))
        .await
        .unwrap();
    assert!(ready.status().is_success());
    assert_eq!(ready.text().await.unwrap(), READY_BODY);

    let body = reqwest::get(format!("{}testfile.txt", handle.base_url()))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "Hello, world!");

    let missing = reqwest::get(format!("{}absent.txt", handle.base_url()))
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    controller.shutdown(&mut handle).await;
    assert_eq!(handle.phase(), ServerPhase::Stopped);
    controller.join(handle, JOIN_TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn path_traversal_is_not_found() {
    let parent = tempdir().unwrap();
    let root = parent.path().join("deploy");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(parent.path().join("secret.txt"), "top secret").unwrap();

    let controller = ServerLifecycleController::new();
    let mut handle = controller
        .start(Some(&root), allocate_ephemeral_port().unwrap())
        .await
        .unwrap();
    assert!(controller.await_ready(&mut handle).await);

    let passwd = raw_get(handle.port(), "/../../etc/passwd").await;
    assert!(passwd.starts_with("HTTP/1.1 404"), "unexpected response: {passwd}");
    assert!(!passwd.contains("root:"));

    let sibling = raw_get(handle.port(), "/../secret.txt").await;
    assert!(sibling.starts_with("HTTP/1.1 404"), "unexpected response: {sibling}");
    assert!(!sibling.contains("top secret"));

    let encoded = raw_get(handle.port(), "/%2e%2e/secret.txt").await;
    assert!(encoded.starts_with("HTTP/1.1 404"), "unexpected response: {encoded}");

    let invalid_utf8 = raw_get(handle.port(), "/%ff").await;
    assert!(
        invalid_utf8.starts_with("HTTP/1.1 404"),
        "unexpected response: {invalid_utf8}"
    );

    controller.shutdown(&mut handle).await;
    controller.join(handle, JOIN_TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn shutdown_twice_does_not_hang() {
    let dir = tempdir().unwrap();
    let controller = ServerLifecycleController::new();
    let mut handle = controller
        .start(Some(dir.path()), allocate_ephemeral_port().unwrap())
        .await
        .unwrap();
    assert!(controller.await_ready(&mut handle).await);

    tokio::time::timeout(Duration::from_secs(5), async {
        controller.shutdown(&mut handle).await;
        controller.shutdown(&mut handle).await;
    })
    .await
    .expect("repeated shutdown returns promptly");

    controller.join(handle, JOIN_TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn probe_gives_up_once_server_is_gone() {
    let dir = tempdir().unwrap();
    let controller = ServerLifecycleController::new().with_readiness(ReadinessPolicy {
        attempts: 3,
        interval: Duration::from_millis(20),
        request_timeout: Duration::from_millis(200),
    });
    let mut handle = controller
        .start(Some(dir.path()), allocate_ephemeral_port().unwrap())
        .await
        .unwrap();
    assert!(controller.await_ready(&mut handle).await);

    controller.shutdown(&mut handle).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!controller.await_ready(&mut handle).await);
    assert_eq!(handle.phase(), ServerPhase::Stopped);
    controller.join(handle, JOIN_TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn busy_port_is_a_bind_error() {
    let dir = tempdir().unwrap();
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let controller = ServerLifecycleController::new();
    let result = controller.start(Some(dir.path()), port).await;
    assert!(matches!(result, Err(FileServerError::Bind { .. })));
}

#[tokio::test]
async fn run_returns_after_remote_shutdown() {
    let dir = tempdir().unwrap();
    let port = allocate_ephemeral_port().unwrap();
    let server = ArtifactServer::new(dir.path()).unwrap();
    let task = tokio::spawn(server.run(IpAddr::V4(Ipv4Addr::LOCALHOST), port));

    let client = reqwest::Client::new();
    let mut ready = false;
    for _ in 0..20 {
        if client
            .get(format!("http://127.0.0.1:{port}/fileserver-is-ready"))
            .send()
            .await
            .is_ok()
        {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(ready, "server never answered the readiness probe");

    let reply = client
        .post(format!("http://127.0.0.1:{port}/shutdown"))
        .send()
        .await
        .unwrap();
    assert_eq!(reply.text().await.unwrap(), SHUTDOWN_BODY);

    tokio::time::timeout(JOIN_TIMEOUT, task)
        .await
        .expect("server stops after shutdown")
        .unwrap()
        .unwrap();
}
