//! 통합 테스트 -- 실행기 실패 경로에서 프로세스가 남지 않음을 검증

#![cfg(unix)]

use std::time::Duration;

use flowtest_core::config::StoreConfig;
use flowtest_supervisor::{SupervisorError, WorkspaceHandle, start_metadata_store};

fn store_config(program: &str) -> StoreConfig {
    StoreConfig {
        program: program.to_owned(),
        dial_timeout_ms: 500,
        stop_grace_secs: 1,
        ..StoreConfig::default()
    }
}

#[tokio::test]
async fn missing_store_program_is_spawn_error() {
    // Given: 워크스페이스와 존재하지 않는 스토어 프로그램
    let ws = WorkspaceHandle::create().unwrap();

    // When: 스토어 기동
    let err = start_metadata_store(&ws, &store_config("/nonexistent/flowtest-store"))
        .await
        .unwrap_err();

    // Then: 실행 실패 메시지에 프로그램 이름이 포함됨
    assert!(matches!(err, SupervisorError::Spawn { .. }));
    ws.close().unwrap();
}

#[tokio::test]
async fn store_exiting_immediately_is_early_exit() {
    // Given: 시작하자마자 종료하는 "스토어"
    let ws = WorkspaceHandle::create().unwrap();

    // When: 기동
    let err = start_metadata_store(&ws, &store_config("/bin/false"))
        .await
        .unwrap_err();

    // Then: 연결 제한 시간을 기다리지 않고 종료가 보고됨
    assert!(matches!(err, SupervisorError::ExitedEarly { .. }), "{err}");
    ws.close().unwrap();
}

#[tokio::test]
async fn store_that_never_listens_times_out_and_is_stopped() {
    // Given: 실행되지만 소켓을 열지 않는 "스토어"
    let ws = WorkspaceHandle::create().unwrap();
    let script = ws.path().join("silent-store.sh");
    std::fs::write(&script, "#!/bin/sh\necho $$ > \"$(dirname \"$0\")/store.pid\"\nexec sleep 600\n")
        .unwrap();
    let mut perms = std::fs::metadata(&script).unwrap().permissions();
    std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
    std::fs::set_permissions(&script, perms).unwrap();

    // When: 짧은 연결 제한 시간으로 기동
    let started = std::time::Instant::now();
    let err = start_metadata_store(&ws, &store_config(script.to_str().unwrap()))
        .await
        .unwrap_err();

    // Then: 연결 시간 초과는 연결 실패이며 프로세스는 사라짐
    assert!(matches!(err, SupervisorError::Store(_)), "{err}");
    assert!(started.elapsed() < Duration::from_secs(10));
    let pid: u32 = std::fs::read_to_string(ws.path().join("store.pid"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(!flowtest_supervisor::process::is_process_alive(pid));
    ws.close().unwrap();
}
