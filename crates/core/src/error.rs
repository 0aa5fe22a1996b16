//! 에러 타입: 하네스 전역 에러 분류
//!
//! 하네스의 실패는 세 갈래로 나뉩니다.
//!
//! | 분류 | 타입 | 전파 |
//! |------|------|------|
//! | SetupFailure | [`SetupError`], [`CatalogError`], [`ConfigError`] | 치명적, 테스트 실행 전 중단 |
//! | TestFailure | (에러 아님, [`crate::result::TestOutcome`]) | 요약과 종료 코드에만 반영 |
//! | TeardownFailure | [`TeardownError`] | 로그만 남김, 클러스터 정지 실패가 유일한 실패면 전파 |

/// flowtest 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum FlowtestError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 카탈로그 빌드/로딩 에러
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// 환경 구성(워크스페이스, 프로세스, 클러스터) 에러
    #[error("setup failed: {0}")]
    Setup(#[from] SetupError),

    /// 정리 단계 에러
    #[error("teardown failed: {0}")]
    Teardown(#[from] TeardownError),

    /// 실행 도중 종료 시그널 수신
    #[error("interrupted by {signal}")]
    Interrupted {
        /// 수신한 시그널 이름 (SIGINT, SIGTERM)
        signal: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowtestError {
    /// 테스트 실행 전에 발생한 환경 구성 실패인지 여부
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Catalog(_) | Self::Setup(_) | Self::Io(_)
        )
    }
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 카탈로그 빌드 및 산출물 에러
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// 카탈로그 컴파일러 실행 실패
    #[error("catalog build failed: {reason}")]
    BuildFailed { reason: String },

    /// 빌드 산출물을 읽을 수 없음
    #[error("failed to read build artifact {path}: {reason}")]
    ArtifactRead { path: String, reason: String },

    /// 빌드 산출물 파싱 실패
    #[error("failed to parse build artifact: {reason}")]
    ArtifactParse { reason: String },

    /// 카탈로그 내용이 일관되지 않음
    #[error("invalid catalog: {0}")]
    Invalid(String),
}

/// 환경 구성 단계 에러
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// 임시 워크스페이스 생성 실패
    #[error("workspace: {0}")]
    Workspace(String),

    /// 하위 프로세스 기동 실패
    #[error("{process} failed to start: {reason}")]
    StartupFailed { process: String, reason: String },

    /// 하위 프로세스 연결 확인 실패
    #[error("{process} is not reachable: {reason}")]
    Connectivity { process: String, reason: String },

    /// 스토어에 카탈로그 스펙 적용 실패
    #[error("applying specifications: {0}")]
    ApplySpecs(String),

    /// 클러스터 구성 실패
    #[error("constructing cluster: {0}")]
    Cluster(String),
}

/// 정리 단계 에러
#[derive(Debug, thiserror::Error)]
pub enum TeardownError {
    /// 클러스터 정지 실패
    #[error("stopping cluster: {0}")]
    ClusterStop(String),

    /// 하위 프로세스 정지 실패
    #[error("stopping {process}: {reason}")]
    ProcessStop { process: String, reason: String },

    /// 워크스페이스 삭제 실패
    #[error("removing workspace {path}: {reason}")]
    Workspace { path: String, reason: String },
}
