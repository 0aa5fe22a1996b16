//! 클러스터 및 엔진 에러 타입
//!
//! [`ClusterError`]는 클러스터 생성/정지/스펙 적용 실패를, [`EngineError`]는
//! 테스트 스텝 실행 실패를 표현합니다. 엔진 에러는 하네스 에러가 아니라
//! 테스트 실패 원인으로 기록됩니다.

use flowtest_core::error::{FlowtestError, SetupError, TeardownError};
use flowtest_store::StoreError;

/// 클러스터 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// 클러스터 설정이 유효하지 않음
    #[error("invalid cluster config: {0}")]
    InvalidConfig(String),

    /// 저널 스펙을 프래그먼트 저장소에 연결할 수 없음
    #[error("journal '{journal}': {reason}")]
    Journal { journal: String, reason: String },

    /// 메타데이터 스토어 호출 실패
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// 스펙 직렬화 실패
    #[error("encoding spec: {0}")]
    Encode(#[from] serde_json::Error),

    /// 프래그먼트 파일 I/O 실패
    #[error("fragment io: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    /// 정지 단계 에러로 변환합니다.
    pub fn into_teardown(self) -> FlowtestError {
        TeardownError::ClusterStop(self.to_string()).into()
    }
}

impl From<ClusterError> for FlowtestError {
    fn from(err: ClusterError) -> Self {
        SetupError::Cluster(err.to_string()).into()
    }
}

/// 테스트 스텝 실행 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 카탈로그에 없는 컬렉션
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    /// 컴퓨트 워커의 람다 호출 실패
    #[error("lambda {derivation}/{transform}: {reason}")]
    Lambda {
        derivation: String,
        transform: String,
        reason: String,
    },

    /// 파생 전파가 허용 깊이를 넘음 (순환 derivation)
    #[error("derivation cascade exceeded {limit} levels at '{collection}'")]
    CascadeLimit { collection: String, limit: usize },

    /// 검증 불일치
    #[error("verify '{collection}': {reason}")]
    Mismatch { collection: String, reason: String },

    /// 클러스터(프래그먼트, 스토어) 실패
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// 실패한 스텝의 선언 위치와 원인
#[derive(Debug, thiserror::Error)]
#[error("{error} (at {scope})")]
pub struct StepFailure {
    pub scope: String,
    #[source]
    pub error: EngineError,
}

impl StepFailure {
    pub fn new(scope: impl Into<String>, error: impl Into<EngineError>) -> Self {
        Self {
            scope: scope.into(),
            error: error.into(),
        }
    }
}
