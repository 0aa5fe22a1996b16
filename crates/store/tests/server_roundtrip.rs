//! 통합 테스트 -- 실제 Unix 소켓으로 참조 서버와 클라이언트 왕복 검증

use std::sync::Arc;
use std::time::Duration;

use flowtest_store::{KvStore, MemoryStore, StoreClient, StoreError, server};
use tokio_util::sync::CancellationToken;

async fn start_server(dir: &std::path::Path) -> (std::path::PathBuf, CancellationToken) {
    let socket = dir.join("client.sock");
    let listener = server::bind(&socket).expect("bind");
    let shutdown = CancellationToken::new();
    tokio::spawn(server::serve(
        listener,
        Arc::new(MemoryStore::new()),
        shutdown.clone(),
    ));
    (socket, shutdown)
}

#[tokio::test]
async fn liveness_check_on_fresh_store_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let (socket, shutdown) = start_server(dir.path()).await;

    let client = StoreClient::connect(&socket, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(client.get("test-key").await.unwrap(), None);
    shutdown.cancel();
}

#[tokio::test]
async fn put_range_delete_through_socket() {
    let dir = tempfile::tempdir().unwrap();
    let (socket, shutdown) = start_server(dir.path()).await;
    let client = StoreClient::connect(&socket, Duration::from_secs(5))
        .await
        .unwrap();

    client.put("/run/catalog/a", "1".to_owned()).await.unwrap();
    client.put("/run/catalog/b", "2".to_owned()).await.unwrap();
    client.put("/run/broker/a", "3".to_owned()).await.unwrap();

    let entries = client.range("/run/catalog/").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].key, "/run/catalog/a");
    assert_eq!(entries[1].value, "2");

    assert_eq!(client.delete_prefix("/run/").await.unwrap(), 3);
    assert!(client.range("/").await.unwrap().is_empty());
    shutdown.cancel();
}

#[tokio::test]
async fn bind_replaces_stale_socket_file() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("client.sock");
    std::fs::write(&socket, b"stale").unwrap();

    let listener = server::bind(&socket);
    assert!(listener.is_ok());
}

#[tokio::test]
async fn server_shutdown_surfaces_as_connectivity_error() {
    let dir = tempfile::tempdir().unwrap();
    let (socket, shutdown) = start_server(dir.path()).await;
    let client = StoreClient::connect(&socket, Duration::from_secs(5))
        .await
        .unwrap();

    shutdown.cancel();
    // 종료 시 연결 태스크가 끝나며 스트림이 닫힘
    tokio::time::sleep(Duration::from_millis(50)).await;
    let err = client.get("test-key").await.unwrap_err();
    assert!(err.is_connectivity(), "unexpected error: {err}");

    // 끊긴 연결은 버려지고 이후 호출은 닫힌 클라이언트로 보고됨
    let err = client.get("test-key").await.unwrap_err();
    assert!(matches!(err, StoreError::Closed));
}
