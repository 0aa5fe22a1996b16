//! 컨슈머 샤드와 레지스터
//!
//! derivation마다 샤드 하나가 배정됩니다. 샤드의 레지스터는 transform 호출 사이에
//! 유지되는 상태이며, 테스트 간 격리를 위해 매 테스트 후 초기값으로 재설정됩니다.

use std::collections::BTreeMap;
use std::sync::Mutex;

use flowtest_core::catalog::DerivationSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// 샤드 스펙. 스토어의 컨슈머 prefix 아래에 기록됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSpec {
    /// 샤드 ID (`derive/<collection>`)
    pub id: String,
    /// 파생 컬렉션 이름
    pub derivation: String,
    /// 읽는 소스 컬렉션
    pub sources: Vec<String>,
    /// 할당된 존
    pub zone: String,
}

impl ShardSpec {
    pub fn for_derivation(derivation: &DerivationSpec, zone: &str) -> Self {
        Self {
            id: format!("derive/{}", derivation.collection),
            derivation: derivation.collection.clone(),
            sources: derivation.sources().map(str::to_owned).collect(),
            zone: zone.to_owned(),
        }
    }
}

/// derivation별 레지스터 값
#[derive(Debug, Default)]
pub struct Registers {
    initial: BTreeMap<String, Value>,
    current: Mutex<BTreeMap<String, Value>>,
}

impl Registers {
    /// derivation의 초기 레지스터 값으로 생성합니다.
    pub fn new(derivations: &[DerivationSpec]) -> Self {
        let initial: BTreeMap<String, Value> = derivations
            .iter()
            .map(|d| (d.collection.clone(), d.register_initial.clone()))
            .collect();
        Self {
            current: Mutex::new(initial.clone()),
            initial,
        }
    }

    /// 현재 레지스터 값. 모르는 derivation은 `null`입니다.
    pub fn get(&self, derivation: &str) -> Value {
        match self.current.lock() {
            Ok(current) => current.get(derivation).cloned().unwrap_or(Value::Null),
            Err(poisoned) => poisoned
                .into_inner()
                .get(derivation)
                .cloned()
                .unwrap_or(Value::Null),
        }
    }

    pub fn set(&self, derivation: &str, value: Value) {
        let mut current = match self.current.lock() {
            Ok(current) => current,
            Err(poisoned) => poisoned.into_inner(),
        };
        current.insert(derivation.to_owned(), value);
    }

    /// 모든 레지스터를 초기값으로 되돌립니다.
    pub fn clear_for_test(&self) {
        let mut current = match self.current.lock() {
            Ok(current) => current,
            Err(poisoned) => poisoned.into_inner(),
        };
        *current = self.initial.clone();
        debug!(registers = current.len(), "registers reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowtest_core::catalog::TransformSpec;
    use serde_json::json;

    fn derivation(name: &str, initial: Value) -> DerivationSpec {
        DerivationSpec {
            collection: name.to_owned(),
            transforms: vec![TransformSpec {
                name: "t".to_owned(),
                source: "src".to_owned(),
            }],
            register_initial: initial,
        }
    }

    #[test]
    fn clear_restores_initial_values() {
        let registers = Registers::new(&[derivation("a", json!(0)), derivation("b", json!({}))]);
        registers.set("a", json!(42));
        registers.set("b", json!({"seen": true}));
        registers.clear_for_test();
        assert_eq!(registers.get("a"), json!(0));
        assert_eq!(registers.get("b"), json!({}));
    }

    #[test]
    fn unknown_derivation_reads_null() {
        let registers = Registers::new(&[]);
        assert_eq!(registers.get("nope"), Value::Null);
    }

    #[test]
    fn shard_spec_lists_sources() {
        let shard = ShardSpec::for_derivation(&derivation("acme/totals", json!(0)), "local");
        assert_eq!(shard.id, "derive/acme/totals");
        assert_eq!(shard.sources, vec!["src"]);
        assert_eq!(shard.zone, "local");
    }
}
