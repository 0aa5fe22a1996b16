//! 프로세스 내 키/값 스토어
//!
//! 참조 서버의 백엔드이며, 테스트에서는 실제 클라이언트를 대신합니다.

use std::collections::BTreeMap;

use tokio::sync::RwLock;

use crate::KvStore;
use crate::error::StoreError;
use crate::protocol::{KeyValue, PROTOCOL_VERSION, Request, Response};

/// 비동기 락으로 보호되는 정렬된 인메모리 맵
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 키 개수
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// 프로토콜 요청 하나를 적용하고 응답을 만듭니다.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Hello { .. } => Response::Hello {
                server_version: PROTOCOL_VERSION.to_owned(),
            },
            Request::Get { key } => Response::Value {
                value: self.entries.read().await.get(&key).cloned(),
            },
            Request::Put { key, value } => {
                self.entries.write().await.insert(key, value);
                Response::Value { value: None }
            }
            Request::Range { prefix } => Response::Entries {
                entries: self.scan(&prefix).await,
            },
            Request::DeletePrefix { prefix } => Response::Deleted {
                count: self.remove_prefix(&prefix).await,
            },
        }
    }

    async fn scan(&self, prefix: &str) -> Vec<KeyValue> {
        self.entries
            .read()
            .await
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KeyValue {
                key: k.clone(),
                value: v.clone(),
            })
            .collect()
    }

    async fn remove_prefix(&self, prefix: &str) -> u64 {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        (before - entries.len()) as u64
    }
}

impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn range(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError> {
        Ok(self.scan(prefix).await)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        Ok(self.remove_prefix(prefix).await)
    }
}
