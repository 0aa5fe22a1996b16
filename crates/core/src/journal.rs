//! 저널 규칙: 컬렉션 저널의 브로커 스펙 결정
//!
//! 규칙은 이름의 사전순으로 적용되며, 일치하는 규칙의 템플릿 필드가 앞선 값을 덮어씁니다.
//! 따라서 이름이 가장 큰 규칙이 항상 마지막에 적용됩니다.
//!
//! 하네스는 [`testing_override_rule`]을 추가 규칙으로 전달하여
//! 복제 수, 프래그먼트 저장소, 압축 방식을 테스트용으로 고정합니다.

use serde::{Deserialize, Serialize};

/// 테스트 오버라이드 규칙 이름. 어떤 규칙 이름보다도 뒤에 정렬됩니다.
pub const TESTING_OVERRIDE_RULE: &str = "\u{FFFF}\u{FFFF}-testing-overrides";

/// 파일 시스템 프래그먼트 저장소 URL
pub const FILE_FRAGMENT_STORE: &str = "file:///";

/// 규칙이 없을 때의 기본 복제 수
pub const DEFAULT_REPLICATION: u32 = 3;

/// 이름 붙은 저널 규칙
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRule {
    /// 규칙 이름 (적용 순서를 결정)
    pub rule: String,
    /// 규칙이 적용될 저널 선택자
    #[serde(default)]
    pub selector: JournalSelector,
    /// 일치 시 덮어쓸 템플릿
    #[serde(default)]
    pub template: JournalTemplate,
}

impl JournalRule {
    /// 저널 이름이 선택자와 일치하는지 확인합니다.
    pub fn matches(&self, journal: &str) -> bool {
        self.selector.matches(journal)
    }
}

/// 저널 선택자
///
/// `include_prefixes`가 비어 있으면 모든 저널과 일치합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalSelector {
    #[serde(default)]
    pub include_prefixes: Vec<String>,
    #[serde(default)]
    pub exclude_prefixes: Vec<String>,
}

impl JournalSelector {
    pub fn matches(&self, journal: &str) -> bool {
        let included = self.include_prefixes.is_empty()
            || self
                .include_prefixes
                .iter()
                .any(|p| journal.starts_with(p.as_str()));
        let excluded = self
            .exclude_prefixes
            .iter()
            .any(|p| journal.starts_with(p.as_str()));
        included && !excluded
    }
}

/// 저널 템플릿. 지정된 필드만 덮어씁니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication: Option<u32>,
    #[serde(default)]
    pub fragment: FragmentTemplate,
}

/// 프래그먼트 템플릿
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stores: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_codec: Option<CompressionCodec>,
}

/// 프래그먼트 압축 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionCodec {
    /// 압축 없음
    #[default]
    None,
    /// gzip
    Gzip,
    /// snappy
    Snappy,
    /// zstandard
    Zstandard,
}

impl std::fmt::Display for CompressionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Gzip => write!(f, "gzip"),
            Self::Snappy => write!(f, "snappy"),
            Self::Zstandard => write!(f, "zstandard"),
        }
    }
}

/// 규칙 적용 결과인 저널 스펙
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalSpec {
    /// 저널 이름
    pub name: String,
    pub replication: u32,
    pub stores: Vec<String>,
    pub compression_codec: CompressionCodec,
}

/// 테스트용 오버라이드 규칙을 생성합니다.
///
/// 모든 저널에 대해 복제 수 1, `file:///` 저장소, zstandard 압축을 강제합니다.
pub fn testing_override_rule() -> JournalRule {
    JournalRule {
        rule: TESTING_OVERRIDE_RULE.to_owned(),
        selector: JournalSelector::default(),
        template: JournalTemplate {
            replication: Some(1),
            fragment: FragmentTemplate {
                stores: Some(vec![FILE_FRAGMENT_STORE.to_owned()]),
                compression_codec: Some(CompressionCodec::Zstandard),
            },
        },
    }
}

/// 저널에 일치하는 규칙을 적용 순서대로 반환합니다.
///
/// 이름 사전순이며, [`TESTING_OVERRIDE_RULE`]은 이름과 무관하게 항상 마지막입니다.
pub fn matching_rules<'a>(rules: &'a [JournalRule], journal: &str) -> Vec<&'a JournalRule> {
    let mut matched: Vec<&JournalRule> = rules.iter().filter(|r| r.matches(journal)).collect();
    matched.sort_by(|a, b| {
        (a.rule == TESTING_OVERRIDE_RULE, &a.rule).cmp(&(b.rule == TESTING_OVERRIDE_RULE, &b.rule))
    });
    matched
}

/// 규칙을 사전순으로 적용하여 저널 스펙을 결정합니다.
pub fn resolve_journal(rules: &[JournalRule], journal: &str) -> JournalSpec {
    let mut spec = JournalSpec {
        name: journal.to_owned(),
        replication: DEFAULT_REPLICATION,
        stores: Vec::new(),
        compression_codec: CompressionCodec::default(),
    };

    for rule in matching_rules(rules, journal) {
        let template = &rule.template;
        if let Some(replication) = template.replication {
            spec.replication = replication;
        }
        if let Some(stores) = &template.fragment.stores {
            spec.stores = stores.clone();
        }
        if let Some(codec) = template.fragment.compression_codec {
            spec.compression_codec = codec;
        }
    }

    spec
}

/// 이름 기준으로 규칙을 병합합니다. 같은 이름은 `extra` 쪽이 우선합니다.
pub fn merge_rules(base: &mut Vec<JournalRule>, extra: &[JournalRule]) {
    for rule in extra {
        match base.iter_mut().find(|r| r.rule == rule.rule) {
            Some(existing) => *existing = rule.clone(),
            None => base.push(rule.clone()),
        }
    }
}
