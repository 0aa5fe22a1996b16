//! 파일 기반 프래그먼트 저장소
//!
//! 저널에 추가된 문서는 추가 호출마다 하나의 프래그먼트 파일로 기록됩니다.
//! 파일은 워크스페이스 아래에 있으므로 워크스페이스와 함께 삭제됩니다.
//!
//! ```text
//! <root>/<journal, '/'는 '%2F'로>/<begin:020>-<end:020>.jsonl[.zst]
//! ```
//!
//! 각 줄은 `{"clock": <논리 시각>, "doc": <문서>}` 형식입니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use flowtest_core::journal::{CompressionCodec, JournalSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ClusterError;

/// 프래그먼트 저장소 URL 스킴
pub const FILE_SCHEME: &str = "file://";

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Serialize, Deserialize)]
struct Record {
    clock: u64,
    doc: Value,
}

#[derive(Debug)]
struct Fragment {
    begin: u64,
    end: u64,
    path: PathBuf,
}

#[derive(Debug)]
struct JournalState {
    codec: CompressionCodec,
    dir: PathBuf,
    fragments: Vec<Fragment>,
}

impl JournalState {
    fn end_offset(&self) -> u64 {
        self.fragments.last().map_or(0, |f| f.end)
    }
}

/// 워크스페이스에 뿌리를 둔 프래그먼트 저장소
#[derive(Debug)]
pub struct FragmentStore {
    root: PathBuf,
    journals: Mutex<HashMap<String, JournalState>>,
}

impl FragmentStore {
    /// `root` 디렉토리를 만들고 저장소를 생성합니다.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ClusterError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            journals: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 저널을 등록합니다.
    ///
    /// 저널 스펙은 `file://` 저장소를 포함해야 하며, 압축 방식은 `none` 또는
    /// `zstandard`만 지원합니다.
    pub fn register(&self, spec: &JournalSpec) -> Result<(), ClusterError> {
        if !spec.stores.iter().any(|s| s.starts_with(FILE_SCHEME)) {
            return Err(journal_error(
                &spec.name,
                format!("no {FILE_SCHEME} fragment store in {:?}", spec.stores),
            ));
        }
        match spec.compression_codec {
            CompressionCodec::None | CompressionCodec::Zstandard => {}
            other => {
                return Err(journal_error(
                    &spec.name,
                    format!("compression codec '{other}' is not supported"),
                ));
            }
        }

        let dir = self.root.join(spec.name.replace('/', "%2F"));
        std::fs::create_dir_all(&dir)?;
        let mut journals = self.lock()?;
        journals.entry(spec.name.clone()).or_insert(JournalState {
            codec: spec.compression_codec,
            dir,
            fragments: Vec::new(),
        });
        Ok(())
    }

    /// 문서를 하나의 프래그먼트로 추가하고 추가 후 끝 오프셋을 반환합니다.
    pub fn append(&self, journal: &str, clock: u64, docs: &[Value]) -> Result<u64, ClusterError> {
        let mut journals = self.lock()?;
        let state = journals
            .get_mut(journal)
            .ok_or_else(|| journal_error(journal, "not registered".to_owned()))?;
        if docs.is_empty() {
            return Ok(state.end_offset());
        }

        let begin = state.end_offset();
        let end = begin + docs.len() as u64;
        let mut content = Vec::new();
        for doc in docs {
            serde_json::to_writer(
                &mut content,
                &Record {
                    clock,
                    doc: doc.clone(),
                },
            )?;
            content.push(b'\n');
        }

        let (bytes, ext) = match state.codec {
            CompressionCodec::Zstandard => (zstd::encode_all(&content[..], ZSTD_LEVEL)?, "jsonl.zst"),
            _ => (content, "jsonl"),
        };
        let path = state.dir.join(format!("{begin:020}-{end:020}.{ext}"));
        std::fs::write(&path, bytes)?;
        debug!(journal, begin, end, path = %path.display(), "fragment persisted");

        state.fragments.push(Fragment { begin, end, path });
        Ok(end)
    }

    /// 저널의 현재 끝 오프셋
    pub fn end_offset(&self, journal: &str) -> Result<u64, ClusterError> {
        let journals = self.lock()?;
        journals
            .get(journal)
            .map(JournalState::end_offset)
            .ok_or_else(|| journal_error(journal, "not registered".to_owned()))
    }

    /// `from` 오프셋 이후의 문서를 순서대로 읽습니다.
    pub fn read(&self, journal: &str, from: u64) -> Result<Vec<Value>, ClusterError> {
        let journals = self.lock()?;
        let state = journals
            .get(journal)
            .ok_or_else(|| journal_error(journal, "not registered".to_owned()))?;

        let mut docs = Vec::new();
        for fragment in state.fragments.iter().filter(|f| f.end > from) {
            let raw = std::fs::read(&fragment.path)?;
            let content = match state.codec {
                CompressionCodec::Zstandard => zstd::decode_all(&raw[..])?,
                _ => raw,
            };
            let skip = from.saturating_sub(fragment.begin) as usize;
            for line in content
                .split(|b| *b == b'\n')
                .filter(|l| !l.is_empty())
                .skip(skip)
            {
                let record: Record = serde_json::from_slice(line)?;
                docs.push(record.doc);
            }
        }
        Ok(docs)
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, JournalState>>, ClusterError> {
        self.journals
            .lock()
            .map_err(|_| journal_error("*", "fragment index lock poisoned".to_owned()))
    }
}

fn journal_error(journal: &str, reason: String) -> ClusterError {
    ClusterError::Journal {
        journal: journal.to_owned(),
        reason,
    }
}
