//! 스토어 에러 타입
//!
//! [`StoreError`]는 [`FlowtestError`]로 변환되어 `?`로 전파됩니다.
//! 기동 중 발생한 스토어 에러는 모두 메타데이터 스토어 프로세스의 연결 실패입니다.

use flowtest_core::error::{FlowtestError, SetupError};

/// 스토어 에러를 설정 실패로 보고할 때 쓰는 프로세스 이름
pub const STORE_PROCESS: &str = "metadata-store";

/// 스토어 클라이언트, 프로토콜, 서버 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 연결 제한 시간 안에 소켓에 연결하지 못함
    #[error("dial {socket} timed out after {timeout_ms}ms: {reason}")]
    DialTimeout {
        socket: String,
        timeout_ms: u64,
        reason: String,
    },

    /// 서버 프로토콜 버전이 지원 최소 버전보다 낮음
    #[error("server version {server} is older than the minimum supported {minimum}")]
    IncompatibleVersion { server: String, minimum: String },

    /// 핸드셰이크 실패 또는 예상치 못한 응답
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// 클라이언트가 닫힘 (대개 스토어 프로세스 종료)
    #[error("store client is closed")]
    Closed,

    /// 요청 또는 응답 인코딩/디코딩 실패
    #[error("protocol error: {0}")]
    Protocol(String),

    /// 서버가 에러 응답을 반환함
    #[error("server error: {0}")]
    Server(String),

    /// 전송 계층 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// 스토어에 더 이상 연결할 수 없는 에러인지 여부
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::DialTimeout { .. } | Self::Closed | Self::Io(_) | Self::Handshake(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<StoreError> for FlowtestError {
    fn from(err: StoreError) -> Self {
        FlowtestError::Setup(SetupError::Connectivity {
            process: STORE_PROCESS.to_owned(),
            reason: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_is_connectivity() {
        assert!(StoreError::Closed.is_connectivity());
        assert!(!StoreError::Server("boom".to_owned()).is_connectivity());
    }

    #[test]
    fn converts_to_setup_connectivity() {
        let err: FlowtestError = StoreError::Closed.into();
        assert!(err.is_setup_failure());
        let msg = err.to_string();
        assert!(msg.contains(STORE_PROCESS));
        assert!(msg.contains("closed"));
    }
}
