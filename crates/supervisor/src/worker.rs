//! 컴퓨트 워커 실행기

use std::path::Path;

use flowtest_core::config::WorkerConfig;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::SupervisorError;
use crate::process::{ManagedProcess, ProcessSpec};

/// 컴퓨트 워커 프로세스 이름
pub const WORKER_PROCESS: &str = "compute-worker";

/// `directory`에서 `socket`을 사용하는 워커를 기동합니다.
///
/// 워커가 stdout에 준비 토큰을 출력할 때까지 기다립니다. 시간 초과나 조기 종료 시
/// 프로세스를 정지하고 에러를 반환합니다.
pub async fn start_compute_worker(
    directory: &Path,
    socket: &Path,
    config: &WorkerConfig,
) -> Result<ManagedProcess, SupervisorError> {
    match std::fs::remove_file(socket) {
        Ok(()) => debug!(socket = %socket.display(), "removed stale worker socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let spec = ProcessSpec::new(WORKER_PROCESS, &config.program)
        .args(&config.args)
        .cwd(directory)
        .env(&config.socket_env, socket)
        .capture_stdout()
        .stop_grace(config.stop_grace());
    let mut process = ManagedProcess::spawn(spec)?;

    match timeout(config.ready_timeout(), wait_ready(&mut process, &config.ready_token)).await {
        Ok(Ok(())) => {
            process.forward_stdout();
            info!(socket = %socket.display(), "compute worker ready");
            Ok(process)
        }
        Ok(Err(e)) => Err(abandon(process, e).await),
        Err(_) => {
            let err = SupervisorError::ReadyTimeout {
                process: WORKER_PROCESS.to_owned(),
                waited_secs: config.ready_timeout_secs,
            };
            Err(abandon(process, err).await)
        }
    }
}

async fn wait_ready(process: &mut ManagedProcess, token: &str) -> Result<(), SupervisorError> {
    let Some(lines) = process.stdout_mut() else {
        return Err(SupervisorError::ExitedEarly {
            process: WORKER_PROCESS.to_owned(),
            status: "stdout unavailable".to_owned(),
        });
    };
    while let Some(line) = lines.next_line().await? {
        if line.trim() == token {
            return Ok(());
        }
        info!(process = WORKER_PROCESS, stream = "stdout", "{line}");
    }

    // 토큰 전에 stdout이 닫힘: 워커가 종료 중
    let exit = process.wait_exit().await;
    Err(SupervisorError::ExitedEarly {
        process: WORKER_PROCESS.to_owned(),
        status: exit.to_string(),
    })
}

async fn abandon(mut process: ManagedProcess, err: SupervisorError) -> SupervisorError {
    if let Err(stop_err) = process.stop().await {
        warn!(error = %stop_err, "failed to stop compute worker after startup failure");
    }
    err
}
