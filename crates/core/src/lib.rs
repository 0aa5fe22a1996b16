//! flowtest 공통 크레이트
//!
//! 하네스의 모든 크레이트가 공유하는 에러 분류, 설정, 카탈로그 모델,
//! 저널 규칙, 테스트 결과, 메트릭 이름을 정의합니다.

pub mod catalog;
pub mod config;
pub mod error;
pub mod journal;
pub mod metrics;
pub mod result;

// --- 주요 타입 re-export ---

// 에러
pub use error::{CatalogError, ConfigError, FlowtestError, SetupError, TeardownError};

// 설정
pub use config::FlowtestConfig;

// 카탈로그
pub use catalog::{BuiltCatalog, CollectionSpec, DerivationSpec, TestCase, TestStep, TransformSpec};

// 저널 규칙
pub use journal::{CompressionCodec, JournalRule, JournalSpec, testing_override_rule};

// 결과
pub use result::{Summary, TestOutcome, TestResult};
