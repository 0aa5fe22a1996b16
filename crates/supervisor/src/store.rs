//! 메타데이터 스토어 실행기

use std::path::{Path, PathBuf};
use std::sync::Arc;

use flowtest_core::config::StoreConfig;
use flowtest_store::error::STORE_PROCESS;
use flowtest_store::{KvStore, StoreClient};
use tracing::{debug, info, warn};

use crate::error::SupervisorError;
use crate::process::{ManagedProcess, ProcessSpec, wait_for_exit};
use crate::workspace::WorkspaceHandle;

/// 스토어 로그 레벨을 전달하는 환경 변수
pub const STORE_LOG_LEVEL_ENV: &str = "FLOWTEST_STORE_LOG_LEVEL";

/// 연결 직후 스토어 응답을 확인하려고 한 번 읽는 키
pub const LIVENESS_KEY: &str = "test-key";

/// `workspace` 안에서 스토어를 기동하고 프로세스와 연결된 클라이언트를 반환합니다.
///
/// 반환 후에는 프로세스가 종료되는 즉시 감시자가 클라이언트를 닫습니다.
/// 실행 후 실패하면 에러를 반환하기 전에 프로세스를 정지합니다.
pub async fn start_metadata_store(
    workspace: &WorkspaceHandle,
    config: &StoreConfig,
) -> Result<(ManagedProcess, Arc<StoreClient>), SupervisorError> {
    let program = resolve_program(&config.program);
    let socket = workspace.store_socket();
    let spec = ProcessSpec::new(STORE_PROCESS, program)
        .arg("--socket")
        .arg(&socket)
        .cwd(workspace.path())
        .env(STORE_LOG_LEVEL_ENV, &config.log_level)
        .stop_grace(config.stop_grace());
    let mut process = ManagedProcess::spawn(spec)?;

    match connect(&process, &socket, config).await {
        Ok(client) => {
            let client = Arc::new(client);
            let closer = client.closer();
            let mut exit = process.exit_watch();
            tokio::spawn(async move {
                let status = wait_for_exit(&mut exit).await;
                if !closer.is_cancelled() {
                    warn!(status = %status, "metadata store exited, closing client");
                }
                closer.cancel();
            });
            info!(socket = %socket.display(), "metadata store ready");
            Ok((process, client))
        }
        Err(e) => {
            if let Err(stop_err) = process.stop().await {
                warn!(error = %stop_err, "failed to stop metadata store after startup failure");
            }
            Err(e)
        }
    }
}

async fn connect(
    process: &ManagedProcess,
    socket: &Path,
    config: &StoreConfig,
) -> Result<StoreClient, SupervisorError> {
    let client = tokio::select! {
        exit = process.wait_exit() => {
            return Err(SupervisorError::ExitedEarly {
                process: STORE_PROCESS.to_owned(),
                status: exit.to_string(),
            });
        }
        client = StoreClient::connect(socket, config.dial_timeout()) => client?,
    };

    let answer = client.get(LIVENESS_KEY).await?;
    debug!(present = answer.is_some(), "liveness check answered");
    Ok(client)
}

/// 경로 없는 프로그램 이름을 실행 파일 옆, 그다음 `PATH`에서 찾습니다.
///
/// 경로 구분자가 있는 이름은 그대로 사용합니다. 찾지 못한 이름은 그대로 반환하여
/// 실행 에러 메시지에 나타나게 합니다.
pub fn resolve_program(program: &str) -> PathBuf {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 || as_path.is_absolute() {
        return as_path.to_path_buf();
    }

    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let sibling = dir.join(program);
        if sibling.is_file() {
            return sibling;
        }
    }

    if let Some(paths) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths) {
            let candidate = dir.join(program);
            if candidate.is_file() {
                return candidate;
            }
        }
    }

    as_path.to_path_buf()
}
