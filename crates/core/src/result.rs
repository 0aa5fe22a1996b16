//! 테스트 결과와 요약
//!
//! 테스트 실패는 에러가 아니라 데이터입니다. 결과는 [`Summary`]로 집계되고
//! 종료 코드로 인코딩됩니다.

use std::time::Duration;

use serde::Serialize;

/// 종료 코드로 인코딩 가능한 최대 실패 수
pub const MAX_EXIT_CODE: u8 = 127;

/// 테스트 한 건의 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestOutcome {
    /// 통과
    Passed,
    /// 실패 (에러 메시지와 실패한 스텝의 선언 위치)
    Failed { scope: String, error: String },
}

impl TestOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// 메트릭 레이블 값
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// 테스트 케이스별 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    /// 테스트 이름
    pub test: String,
    #[serde(flatten)]
    pub outcome: TestOutcome,
    /// 실행 시간 (밀리초)
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// 실행 요약
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub ran: usize,
    pub passed: usize,
    pub failed: usize,
    /// 실패한 테스트 이름 (실행 순서)
    pub failed_tests: Vec<String>,
}

impl Summary {
    /// 결과 목록에서 요약을 계산합니다.
    pub fn from_results(results: &[TestResult]) -> Self {
        let failed_tests: Vec<String> = results
            .iter()
            .filter(|r| !r.outcome.is_passed())
            .map(|r| r.test.clone())
            .collect();
        let ran = results.len();
        let failed = failed_tests.len();
        Self {
            ran,
            passed: ran - failed,
            failed,
            failed_tests,
        }
    }

    /// 프로세스 종료 코드: `min(failed, 127)`
    pub fn exit_code(&self) -> u8 {
        u8::try_from(self.failed.min(usize::from(MAX_EXIT_CODE))).unwrap_or(MAX_EXIT_CODE)
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ran {} tests, {} passed, {} failed",
            self.ran, self.passed, self.failed
        )
    }
}
