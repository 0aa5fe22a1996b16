//! flowtest 메타데이터 스토어
//!
//! 하네스는 카탈로그, 브로커, 컨슈머 스펙을 별도 프로세스로 실행되는 작은
//! 키/값 스토어에 보관합니다.
//!
//! - [`protocol`]: 줄 단위 JSON 요청/응답
//! - [`client::StoreClient`]: 버전 핸드셰이크를 수행하는 Unix 소켓 클라이언트
//! - [`memory::MemoryStore`]: 프로세스 내 스토어 (서버 백엔드 겸용)
//! - [`server`]: `flowtest-store` 바이너리의 accept 루프
//!
//! 호출 측은 [`KvStore`] 트레이트에 의존하므로 클러스터는 실제 클라이언트와
//! 테스트용 인메모리 스토어 어느 쪽으로도 동작합니다.

pub mod client;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod server;

use std::future::Future;

pub use client::StoreClient;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use protocol::KeyValue;

/// 하네스가 메타데이터 스토어에 요구하는 키/값 연산
///
/// 키는 문자열이며 관례상 `/flowctl-test/<run>/catalog/collections/acme/orders`
/// 같은 절대 경로 형태입니다.
pub trait KvStore: Send + Sync {
    /// `key`에 저장된 값을 반환합니다.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// `key`에 `value`를 저장합니다. 기존 값은 교체됩니다.
    fn put(&self, key: &str, value: String)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 키가 `prefix`로 시작하는 항목을 키 순서로 반환합니다.
    fn range(&self, prefix: &str)
    -> impl Future<Output = Result<Vec<KeyValue>, StoreError>> + Send;

    /// 키가 `prefix`로 시작하는 항목을 모두 삭제하고 삭제 수를 반환합니다.
    fn delete_prefix(&self, prefix: &str)
    -> impl Future<Output = Result<u64, StoreError>> + Send;
}
