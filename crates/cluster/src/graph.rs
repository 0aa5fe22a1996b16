//! derivation 실행 그래프
//!
//! 소스 컬렉션 → derivation 간선으로 이루어진 의존 그래프입니다.
//! 실행마다 한 번 생성되며 이후 변경되지 않습니다.

use std::collections::BTreeMap;

use flowtest_core::catalog::DerivationSpec;

/// 컬렉션을 읽는 transform
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Reader {
    /// 파생 컬렉션 이름
    pub derivation: String,
    /// transform 이름
    pub transform: String,
}

/// derivation 의존 그래프
///
/// 순환(자기 자신을 읽는 derivation 포함)도 허용되며, 전파 깊이는 엔진이 제한합니다.
#[derive(Debug, Clone, Default)]
pub struct ExecutionGraph {
    readers: BTreeMap<String, Vec<Reader>>,
}

impl ExecutionGraph {
    /// derivation 목록에서 소스 컬렉션별 reader 색인을 구성합니다.
    pub fn new(derivations: &[DerivationSpec]) -> Self {
        let mut readers: BTreeMap<String, Vec<Reader>> = BTreeMap::new();
        for derivation in derivations {
            for transform in &derivation.transforms {
                readers
                    .entry(transform.source.clone())
                    .or_default()
                    .push(Reader {
                        derivation: derivation.collection.clone(),
                        transform: transform.name.clone(),
                    });
            }
        }
        for list in readers.values_mut() {
            list.sort();
        }
        Self { readers }
    }

    /// `collection`을 소스로 읽는 transform 목록 (이름순)
    pub fn readers_of(&self, collection: &str) -> &[Reader] {
        self.readers.get(collection).map_or(&[], Vec::as_slice)
    }
}
