//! 임시 워크스페이스
//!
//! 하네스 실행마다 임시 디렉터리 하나가 실행 중 생성되는 모든 파일(소켓, 빌드된
//! 카탈로그, 저널 규칙, 저널 fragment)을 담습니다. [`WorkspaceHandle::close`]로
//! 삭제되며, 닫지 않고 drop해도 (예: 패닉 unwinding 중) 삭제됩니다.

use std::path::{Path, PathBuf};

use flowtest_core::error::TeardownError;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::SupervisorError;

/// 워크스페이스 디렉터리 이름 접두어
pub const WORKSPACE_PREFIX: &str = "flow-test";

/// 실행별 임시 디렉터리 소유자
#[derive(Debug)]
pub struct WorkspaceHandle {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl WorkspaceHandle {
    /// 시스템 임시 디렉터리 아래 고유한 이름의 디렉터리를 생성합니다.
    pub fn create() -> Result<Self, SupervisorError> {
        Self::create_in(std::env::temp_dir())
    }

    /// `parent` 아래 고유한 이름의 디렉터리를 생성합니다.
    pub fn create_in(parent: impl AsRef<Path>) -> Result<Self, SupervisorError> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(parent)
            .map_err(|e| SupervisorError::Workspace(e.to_string()))?;
        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "workspace created");
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 메타데이터 스토어 소켓
    pub fn store_socket(&self) -> PathBuf {
        self.path.join("store.sock")
    }

    /// 컴퓨트 워커 소켓
    pub fn worker_socket(&self) -> PathBuf {
        self.path.join("worker.sock")
    }

    /// 빌드된 카탈로그 출력 경로
    pub fn catalog_path(&self) -> PathBuf {
        self.path.join("catalog.json")
    }

    /// 카탈로그 빌더에 전달하는 추가 저널 규칙
    pub fn journal_rules_path(&self) -> PathBuf {
        self.path.join("journal-rules.json")
    }

    /// 파일 기반 fragment 저장소 루트
    pub fn fragment_root(&self) -> PathBuf {
        self.path.join("fragments")
    }

    /// 디렉터리와 그 내용을 모두 삭제합니다.
    pub fn close(mut self) -> Result<(), TeardownError> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        dir.close().map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "failed to remove workspace");
            TeardownError::Workspace {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        debug!(path = %self.path.display(), "workspace removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_uses_prefix() {
        let parent = tempfile::tempdir().unwrap();
        let ws = WorkspaceHandle::create_in(parent.path()).unwrap();
        let name = ws.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(WORKSPACE_PREFIX));
        assert!(ws.path().is_dir());
        assert!(ws.store_socket().starts_with(ws.path()));
    }

    #[test]
    fn close_removes_directory_with_contents() {
        let parent = tempfile::tempdir().unwrap();
        let ws = WorkspaceHandle::create_in(parent.path()).unwrap();
        let path = ws.path().to_path_buf();
        std::fs::create_dir_all(ws.fragment_root().join("acme")).unwrap();
        std::fs::write(ws.catalog_path(), b"{}").unwrap();

        ws.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn drop_removes_directory() {
        let parent = tempfile::tempdir().unwrap();
        let path = {
            let ws = WorkspaceHandle::create_in(parent.path()).unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn unwritable_parent_is_workspace_error() {
        let err = WorkspaceHandle::create_in("/nonexistent/flowtest/parent").unwrap_err();
        assert!(matches!(err, SupervisorError::Workspace(_)));
    }

    #[test]
    fn distinct_runs_get_distinct_directories() {
        let parent = tempfile::tempdir().unwrap();
        let a = WorkspaceHandle::create_in(parent.path()).unwrap();
        let b = WorkspaceHandle::create_in(parent.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
