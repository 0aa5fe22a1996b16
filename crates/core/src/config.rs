//! 설정 관리: flowtest.toml 파싱 및 런타임 설정
//!
//! [`FlowtestConfig`]는 하네스의 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`FLOWTEST_STORE_PROGRAM=/usr/bin/flowtest-store` 형식)
//! 3. 설정 파일 (`flowtest.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), flowtest_core::error::FlowtestError> {
//! use flowtest_core::config::FlowtestConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = FlowtestConfig::load("flowtest.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = FlowtestConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, FlowtestError};

/// flowtest 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowtestConfig {
    /// 일반 설정 (로깅)
    #[serde(default)]
    pub general: GeneralConfig,
    /// 메타데이터 스토어 프로세스 설정
    #[serde(default)]
    pub store: StoreConfig,
    /// 컴퓨트 워커 프로세스 설정
    #[serde(default)]
    pub worker: WorkerConfig,
    /// 카탈로그 빌더 설정
    #[serde(default)]
    pub builder: BuilderConfig,
    /// 시뮬레이션 클러스터 설정
    #[serde(default)]
    pub cluster: ClusterSettings,
}

impl FlowtestConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FlowtestError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일이 없으면 기본값에 환경변수 오버라이드만 적용합니다.
    ///
    /// `required`가 참이면 (사용자가 경로를 명시한 경우) 파일 부재를 에러로 처리합니다.
    pub async fn load_or_default(
        path: impl AsRef<Path>,
        required: bool,
    ) -> Result<Self, FlowtestError> {
        let path = path.as_ref();
        if !required && !tokio::fs::try_exists(path).await.unwrap_or(false) {
            let mut config = Self::default();
            config.apply_env_overrides();
            config.validate()?;
            return Ok(config);
        }
        Self::load(path).await
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowtestError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FlowtestError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                FlowtestError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, FlowtestError> {
        toml::from_str(toml_str).map_err(|e| {
            FlowtestError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `FLOWTEST_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "FLOWTEST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "FLOWTEST_GENERAL_LOG_FORMAT");

        // Store
        override_string(&mut self.store.program, "FLOWTEST_STORE_PROGRAM");
        override_u64(
            &mut self.store.dial_timeout_ms,
            "FLOWTEST_STORE_DIAL_TIMEOUT_MS",
        );
        override_string(&mut self.store.log_level, "FLOWTEST_STORE_LOG_LEVEL");
        override_u64(
            &mut self.store.stop_grace_secs,
            "FLOWTEST_STORE_STOP_GRACE_SECS",
        );

        // Worker
        override_string(&mut self.worker.program, "FLOWTEST_WORKER_PROGRAM");
        override_args(&mut self.worker.args, "FLOWTEST_WORKER_ARGS");
        override_string(&mut self.worker.socket_env, "FLOWTEST_WORKER_SOCKET_ENV");
        override_string(&mut self.worker.ready_token, "FLOWTEST_WORKER_READY_TOKEN");
        override_u64(
            &mut self.worker.ready_timeout_secs,
            "FLOWTEST_WORKER_READY_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.worker.stop_grace_secs,
            "FLOWTEST_WORKER_STOP_GRACE_SECS",
        );
        override_u64(
            &mut self.worker.call_timeout_secs,
            "FLOWTEST_WORKER_CALL_TIMEOUT_SECS",
        );

        // Builder
        override_string(&mut self.builder.program, "FLOWTEST_BUILDER_PROGRAM");
        override_bool(
            &mut self.builder.typescript_compile,
            "FLOWTEST_BUILDER_TYPESCRIPT_COMPILE",
        );
        override_bool(
            &mut self.builder.typescript_package,
            "FLOWTEST_BUILDER_TYPESCRIPT_PACKAGE",
        );

        // Cluster
        override_string(&mut self.cluster.prefix, "FLOWTEST_CLUSTER_PREFIX");
        override_string(&mut self.cluster.zone, "FLOWTEST_CLUSTER_ZONE");
        override_bool(
            &mut self.cluster.disable_clock_ticks,
            "FLOWTEST_CLUSTER_DISABLE_CLOCK_TICKS",
        );
        override_u64(
            &mut self.cluster.tick_interval_ms,
            "FLOWTEST_CLUSTER_TICK_INTERVAL_MS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), FlowtestError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }
        if !valid_levels.contains(&self.store.log_level.as_str()) {
            return Err(invalid(
                "store.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        for (field, program) in [
            ("store.program", &self.store.program),
            ("worker.program", &self.worker.program),
            ("builder.program", &self.builder.program),
        ] {
            if program.trim().is_empty() {
                return Err(invalid(field, "program must not be empty".to_owned()));
            }
        }

        for (field, value) in [
            ("store.dial_timeout_ms", self.store.dial_timeout_ms),
            ("worker.ready_timeout_secs", self.worker.ready_timeout_secs),
            ("worker.call_timeout_secs", self.worker.call_timeout_secs),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero".to_owned()));
            }
        }

        if self.worker.socket_env.is_empty() {
            return Err(invalid(
                "worker.socket_env",
                "environment variable name must not be empty".to_owned(),
            ));
        }
        if self.worker.ready_token.is_empty() {
            return Err(invalid(
                "worker.ready_token",
                "readiness token must not be empty".to_owned(),
            ));
        }

        if !self.cluster.prefix.starts_with('/') || self.cluster.prefix.len() < 2 {
            return Err(invalid(
                "cluster.prefix",
                "must be an absolute key prefix such as \"/flowctl-test\"".to_owned(),
            ));
        }
        if !self.cluster.disable_clock_ticks && self.cluster.tick_interval_ms == 0 {
            return Err(invalid(
                "cluster.tick_interval_ms",
                "must be greater than zero when clock ticks are enabled".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> FlowtestError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 메타데이터 스토어 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 스토어 실행 파일 (이름만 주면 하네스 실행 파일 옆, 그다음 PATH에서 찾음)
    pub program: String,
    /// 클라이언트 연결 제한 시간 (밀리초)
    pub dial_timeout_ms: u64,
    /// 스토어 프로세스 로그 레벨
    pub log_level: String,
    /// SIGTERM 이후 SIGKILL까지 대기 시간 (초)
    pub stop_grace_secs: u64,
}

impl StoreConfig {
    /// 연결 제한 시간을 `Duration`으로 반환합니다.
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    /// 정지 유예 시간을 `Duration`으로 반환합니다.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            program: "flowtest-store".to_owned(),
            dial_timeout_ms: 5_000,
            log_level: "error".to_owned(),
            stop_grace_secs: 10,
        }
    }
}

/// 컴퓨트 워커 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 워커 실행 파일
    pub program: String,
    /// 워커 인자 (빌드 디렉토리 기준)
    pub args: Vec<String>,
    /// 소켓 경로를 전달할 환경변수 이름
    pub socket_env: String,
    /// 준비 완료 시 워커가 stdout에 출력하는 토큰
    pub ready_token: String,
    /// 준비 완료 대기 시간 (초)
    pub ready_timeout_secs: u64,
    /// SIGTERM 이후 SIGKILL까지 대기 시간 (초)
    pub stop_grace_secs: u64,
    /// 람다 호출 제한 시간 (초)
    pub call_timeout_secs: u64,
}

impl WorkerConfig {
    /// 준비 완료 대기 시간을 `Duration`으로 반환합니다.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// 정지 유예 시간을 `Duration`으로 반환합니다.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    /// 람다 호출 제한 시간을 `Duration`으로 반환합니다.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "node".to_owned(),
            args: vec!["dist/flow_generated/flow/main.js".to_owned()],
            socket_env: "SOCKET_PATH".to_owned(),
            ready_token: "READY".to_owned(),
            ready_timeout_secs: 60,
            stop_grace_secs: 10,
            call_timeout_secs: 30,
        }
    }
}

/// 카탈로그 빌더 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// 카탈로그 컴파일러 실행 파일
    pub program: String,
    /// TypeScript 람다 컴파일 여부
    pub typescript_compile: bool,
    /// TypeScript 패키지 생성 여부
    pub typescript_package: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            program: "flowctl-build".to_owned(),
            typescript_compile: true,
            typescript_package: false,
        }
    }
}

/// 시뮬레이션 클러스터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// 스토어 키 네임스페이스 루트
    pub prefix: String,
    /// 클러스터 존 이름
    pub zone: String,
    /// 논리 시계 모드 (벽시계 틱 비활성화)
    pub disable_clock_ticks: bool,
    /// 틱 활성화 시 간격 (밀리초)
    pub tick_interval_ms: u64,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            prefix: "/flowctl-test".to_owned(),
            zone: "local".to_owned(),
            disable_clock_ticks: true,
            tick_interval_ms: 1_000,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

/// 공백으로 구분된 인자 목록
fn override_args(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val.split_whitespace().map(str::to_owned).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = FlowtestConfig::default();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.store.program, "flowtest-store");
        assert_eq!(config.store.dial_timeout(), Duration::from_secs(5));
        assert_eq!(config.worker.socket_env, "SOCKET_PATH");
        assert_eq!(config.worker.ready_token, "READY");
        assert!(config.builder.typescript_compile);
        assert!(!config.builder.typescript_package);
        assert!(config.cluster.disable_clock_ticks);
        assert_eq!(config.cluster.zone, "local");
    }

    #[test]
    fn default_config_passes_validation() {
        FlowtestConfig::default().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = FlowtestConfig::parse("").unwrap();
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.cluster.prefix, "/flowctl-test");
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[worker]
program = "deno"
args = ["run", "main.ts"]

[cluster]
disable_clock_ticks = false
"#;
        let config = FlowtestConfig::parse(toml).unwrap();
        assert_eq!(config.worker.program, "deno");
        assert_eq!(config.worker.args, vec!["run", "main.ts"]);
        // 나머지 필드는 기본값 유지
        assert_eq!(config.worker.ready_token, "READY");
        assert!(!config.cluster.disable_clock_ticks);
        assert_eq!(config.cluster.tick_interval_ms, 1_000);
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = FlowtestConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            FlowtestError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = FlowtestConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("general.log_level"));
    }

    #[test]
    fn validate_rejects_invalid_store_log_level() {
        let mut config = FlowtestConfig::default();
        config.store.log_level = "quiet".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("store.log_level"));
    }

    #[test]
    fn validate_rejects_empty_program() {
        let mut config = FlowtestConfig::default();
        config.worker.program = "  ".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker.program"));
    }

    #[test]
    fn validate_rejects_zero_dial_timeout() {
        let mut config = FlowtestConfig::default();
        config.store.dial_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("store.dial_timeout_ms"));
    }

    #[test]
    fn validate_rejects_relative_prefix() {
        let mut config = FlowtestConfig::default();
        config.cluster.prefix = "flowctl-test".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cluster.prefix"));
    }

    #[test]
    fn validate_rejects_zero_tick_interval_only_when_ticking() {
        let mut config = FlowtestConfig::default();
        config.cluster.tick_interval_ms = 0;
        // 틱이 꺼져 있으면 간격은 검증하지 않음
        config.validate().unwrap();

        config.cluster.disable_clock_ticks = false;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tick_interval_ms"));
    }

    #[test]
    #[serial]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: serial 테스트이므로 다른 스레드가 환경변수를 읽지 않습니다.
        unsafe { std::env::set_var("TEST_FLOWTEST_STR", "overridden") };
        override_string(&mut val, "TEST_FLOWTEST_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_FLOWTEST_STR") };
    }

    #[test]
    #[serial]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = true;
        // SAFETY: serial 테스트이므로 다른 스레드가 환경변수를 읽지 않습니다.
        unsafe { std::env::set_var("TEST_FLOWTEST_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_FLOWTEST_BOOL_BAD");
        assert!(val);
        unsafe { std::env::remove_var("TEST_FLOWTEST_BOOL_BAD") };
    }

    #[test]
    #[serial]
    fn env_override_u64_valid() {
        let mut val = 5;
        // SAFETY: serial 테스트이므로 다른 스레드가 환경변수를 읽지 않습니다.
        unsafe { std::env::set_var("TEST_FLOWTEST_U64", "250") };
        override_u64(&mut val, "TEST_FLOWTEST_U64");
        assert_eq!(val, 250);
        unsafe { std::env::remove_var("TEST_FLOWTEST_U64") };
    }

    #[test]
    #[serial]
    fn env_override_args_splits_on_whitespace() {
        let mut val = vec!["a".to_owned()];
        // SAFETY: serial 테스트이므로 다른 스레드가 환경변수를 읽지 않습니다.
        unsafe { std::env::set_var("TEST_FLOWTEST_ARGS", "run  --allow-all main.ts") };
        override_args(&mut val, "TEST_FLOWTEST_ARGS");
        assert_eq!(val, vec!["run", "--allow-all", "main.ts"]);
        unsafe { std::env::remove_var("TEST_FLOWTEST_ARGS") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_FLOWTEST_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = FlowtestConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = FlowtestConfig::parse(&toml_str).unwrap();
        assert_eq!(config.worker.args, parsed.worker.args);
        assert_eq!(config.cluster.prefix, parsed.cluster.prefix);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = FlowtestConfig::from_file("/nonexistent/path/flowtest.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowtestError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    #[serial]
    async fn load_or_default_tolerates_missing_default_file() {
        let config = FlowtestConfig::load_or_default("/nonexistent/flowtest.toml", false)
            .await
            .unwrap();
        assert_eq!(config.store.program, "flowtest-store");
    }

    #[tokio::test]
    async fn load_or_default_requires_explicit_file() {
        let err = FlowtestConfig::load_or_default("/nonexistent/flowtest.toml", true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowtestError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
