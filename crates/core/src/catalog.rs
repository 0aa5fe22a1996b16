//! 카탈로그 모델: 빌드 산출물
//!
//! 카탈로그 컴파일러가 생성하는 JSON 산출물을 표현합니다.
//! [`BuiltCatalog`]는 빌드 이후 변경되지 않으며, 클러스터 생성과 테스트 루프가 읽기 전용으로 공유합니다.
//!
//! # 산출물 형식
//! ```json
//! {
//!   "collections": [{ "name": "acme/orders", "key": ["/id"] }],
//!   "derivations": [{
//!     "collection": "acme/totals",
//!     "transforms": [{ "name": "fromOrders", "source": "acme/orders" }],
//!     "register_initial": 0
//!   }],
//!   "tests": [{
//!     "test": "totals are summed",
//!     "steps": [
//!       { "type": "ingest", "collection": "acme/orders", "documents": [], "scope": "flow.yaml#/tests/0/0" },
//!       { "type": "verify", "collection": "acme/totals", "documents": [], "scope": "flow.yaml#/tests/0/1" }
//!     ]
//!   }],
//!   "journal_rules": []
//! }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CatalogError;
use crate::journal::JournalRule;

/// 빌드된 카탈로그
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuiltCatalog {
    /// 컬렉션 목록 (파생 컬렉션 포함)
    #[serde(default)]
    pub collections: Vec<CollectionSpec>,
    /// 파생(derivation) 목록
    #[serde(default)]
    pub derivations: Vec<DerivationSpec>,
    /// 선언 순서대로의 테스트 케이스
    #[serde(default)]
    pub tests: Vec<TestCase>,
    /// 저널 규칙
    #[serde(default)]
    pub journal_rules: Vec<JournalRule>,
}

impl BuiltCatalog {
    /// JSON 산출물을 파싱하고 일관성을 검증합니다.
    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        let catalog: Self =
            serde_json::from_str(content).map_err(|e| CatalogError::ArtifactParse {
                reason: e.to_string(),
            })?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// 이름으로 컬렉션을 찾습니다.
    pub fn collection(&self, name: &str) -> Option<&CollectionSpec> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// 파생 컬렉션 이름으로 derivation을 찾습니다.
    pub fn derivation(&self, collection: &str) -> Option<&DerivationSpec> {
        self.derivations.iter().find(|d| d.collection == collection)
    }

    /// 카탈로그 내부 참조의 일관성을 검증합니다.
    ///
    /// - 컬렉션, derivation, 테스트, 저널 규칙 이름은 각각 유일해야 함
    /// - 모든 derivation은 선언된 컬렉션을 파생해야 함
    /// - 모든 transform 소스와 테스트 스텝 컬렉션은 선언되어 있어야 함
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut names = HashSet::new();
        for collection in &self.collections {
            if collection.name.is_empty() {
                return Err(CatalogError::Invalid(
                    "collection name must not be empty".to_owned(),
                ));
            }
            if !names.insert(collection.name.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate collection '{}'",
                    collection.name
                )));
            }
        }

        let mut derived = HashSet::new();
        for derivation in &self.derivations {
            if !names.contains(derivation.collection.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "derivation of undeclared collection '{}'",
                    derivation.collection
                )));
            }
            if !derived.insert(derivation.collection.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate derivation '{}'",
                    derivation.collection
                )));
            }
            for transform in &derivation.transforms {
                if !names.contains(transform.source.as_str()) {
                    return Err(CatalogError::Invalid(format!(
                        "transform '{}' of '{}' reads undeclared collection '{}'",
                        transform.name, derivation.collection, transform.source
                    )));
                }
            }
        }

        let mut tests = HashSet::new();
        for test in &self.tests {
            if !tests.insert(test.test.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate test '{}'",
                    test.test
                )));
            }
            for step in &test.steps {
                if !names.contains(step.collection()) {
                    return Err(CatalogError::Invalid(format!(
                        "test '{}' references undeclared collection '{}' at {}",
                        test.test,
                        step.collection(),
                        step.scope()
                    )));
                }
            }
        }

        let mut rules = HashSet::new();
        for rule in &self.journal_rules {
            if !rules.insert(rule.rule.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate journal rule '{}'",
                    rule.rule
                )));
            }
        }

        Ok(())
    }
}

/// 컬렉션 스펙
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    /// 컬렉션 이름 (예: `acme/orders`)
    pub name: String,
    /// 문서 키를 구성하는 JSON 포인터 목록
    #[serde(default)]
    pub key: Vec<String>,
}

impl CollectionSpec {
    /// 문서에서 키 값을 추출합니다. 없는 위치는 `null`로 채웁니다.
    pub fn extract_key(&self, document: &Value) -> Vec<Value> {
        self.key
            .iter()
            .map(|ptr| document.pointer(ptr).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// derivation 스펙
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivationSpec {
    /// 파생되는 컬렉션 이름
    pub collection: String,
    /// 소스 컬렉션별 transform
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
    /// 레지스터 초기값 (테스트마다 이 값으로 재설정됨)
    #[serde(default)]
    pub register_initial: Value,
}

impl DerivationSpec {
    /// 이 derivation이 읽는 소스 컬렉션 이름
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.transforms.iter().map(|t| t.source.as_str())
    }
}

/// transform 스펙
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSpec {
    /// transform 이름
    pub name: String,
    /// 소스 컬렉션 이름
    pub source: String,
}

/// 테스트 케이스
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// 테스트 이름
    pub test: String,
    /// 순서대로 실행되는 스텝
    #[serde(default)]
    pub steps: Vec<TestStep>,
}

/// 테스트 스텝
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestStep {
    /// 컬렉션에 문서를 수집
    Ingest {
        collection: String,
        #[serde(default)]
        documents: Vec<Value>,
        /// 선언 위치 (예: `flow.yaml#/tests/0/0`)
        scope: String,
    },
    /// 컬렉션 내용이 기대 문서를 포함하는지 검증
    Verify {
        collection: String,
        #[serde(default)]
        documents: Vec<Value>,
        scope: String,
    },
}

impl TestStep {
    /// 스텝이 다루는 컬렉션 이름
    pub fn collection(&self) -> &str {
        match self {
            Self::Ingest { collection, .. } | Self::Verify { collection, .. } => collection,
        }
    }

    /// 스텝의 선언 위치
    pub fn scope(&self) -> &str {
        match self {
            Self::Ingest { scope, .. } | Self::Verify { scope, .. } => scope,
        }
    }
}
