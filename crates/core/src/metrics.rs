//! 메트릭 상수 및 설명 등록
//!
//! 하네스가 기록하는 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 익스포터는 설치하지 않으며, 레코더가 없으면 `metrics` 매크로는 아무 일도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `flowtest_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(flowtest_core::metrics::TESTS_TOTAL, flowtest_core::metrics::LABEL_OUTCOME => "passed")
//!     .increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 테스트 결과 레이블 키 (passed, failed)
pub const LABEL_OUTCOME: &str = "outcome";

/// 프로세스 레이블 키 (metadata-store, compute-worker)
pub const LABEL_PROCESS: &str = "process";

// ─── 테스트 실행 메트릭 ────────────────────────────────────────────

/// 실행된 테스트 수 (counter, label: outcome)
pub const TESTS_TOTAL: &str = "flowtest_tests_total";

/// 테스트 한 건의 실행 시간 (histogram, 초)
pub const TEST_DURATION_SECONDS: &str = "flowtest_test_duration_seconds";

// ─── 프로세스 수명 메트릭 ──────────────────────────────────────────

/// 기동된 하위 프로세스 수 (counter, label: process)
pub const PROCESS_STARTS_TOTAL: &str = "flowtest_process_starts_total";

/// 정지된 하위 프로세스 수 (counter, label: process)
pub const PROCESS_STOPS_TOTAL: &str = "flowtest_process_stops_total";

/// 환경 구성 실패 수 (counter)
pub const SETUP_FAILURES_TOTAL: &str = "flowtest_setup_failures_total";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 테스트 실행 시간 히스토그램 버킷 (초)
///
/// 1ms ~ 60s 범위
pub const TEST_DURATION_BUCKETS: [f64; 9] = [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 10.0, 60.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 레코더가 설치되지 않은 상태에서 호출해도 안전합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        TESTS_TOTAL,
        "Total number of test cases executed, by outcome"
    );
    describe_histogram!(
        TEST_DURATION_SECONDS,
        "Time to execute a single test case in seconds"
    );
    describe_counter!(
        PROCESS_STARTS_TOTAL,
        "Total number of managed subprocesses started"
    );
    describe_counter!(
        PROCESS_STOPS_TOTAL,
        "Total number of managed subprocesses stopped"
    );
    describe_counter!(
        SETUP_FAILURES_TOTAL,
        "Total number of harness runs aborted before executing tests"
    );
}
