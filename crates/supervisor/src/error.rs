//! 슈퍼바이저 에러 타입
//!
//! 기동 문제는 [`SetupError`], 정지 문제는 [`TeardownError`]로 변환됩니다.

use flowtest_core::error::{FlowtestError, SetupError, TeardownError};
use flowtest_store::StoreError;
use flowtest_store::error::STORE_PROCESS;

/// 워크스페이스와 하위 프로세스 관리 에러
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// 임시 워크스페이스 생성 실패
    #[error("creating workspace: {0}")]
    Workspace(String),

    /// 프로그램 실행 실패
    #[error("spawning {process}: {reason}")]
    Spawn { process: String, reason: String },

    /// 준비 완료 전에 프로세스 종료
    #[error("{process} exited during startup: {status}")]
    ExitedEarly { process: String, status: String },

    /// 제한 시간 안에 준비 완료를 알리지 않음
    #[error("{process} not ready after {waited_secs}s")]
    ReadyTimeout { process: String, waited_secs: u64 },

    /// 시그널 전송 실패 또는 프로세스가 종료되지 않음
    #[error("stopping {process}: {reason}")]
    Stop { process: String, reason: String },

    /// 메타데이터 스토어 연결 실패
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SupervisorError> for FlowtestError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::Workspace(reason) => SetupError::Workspace(reason).into(),
            SupervisorError::Spawn { process, reason } => {
                SetupError::StartupFailed { process, reason }.into()
            }
            SupervisorError::ExitedEarly { process, status } => SetupError::StartupFailed {
                process,
                reason: format!("exited during startup: {status}"),
            }
            .into(),
            SupervisorError::ReadyTimeout {
                process,
                waited_secs,
            } => SetupError::StartupFailed {
                process,
                reason: format!("not ready after {waited_secs}s"),
            }
            .into(),
            SupervisorError::Stop { process, reason } => {
                TeardownError::ProcessStop { process, reason }.into()
            }
            SupervisorError::Store(e) => SetupError::Connectivity {
                process: STORE_PROCESS.to_owned(),
                reason: e.to_string(),
            }
            .into(),
            SupervisorError::Io(e) => FlowtestError::Io(e),
        }
    }
}
