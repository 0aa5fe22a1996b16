//! Catalog build step.
//!
//! [`CatalogBuilder`] is the seam the harness builds through;
//! [`CommandCatalogBuilder`] runs an external compiler and loads its JSON
//! artifact.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use flowtest_core::catalog::BuiltCatalog;
use flowtest_core::error::CatalogError;
use flowtest_core::journal::{JournalRule, merge_rules};

/// Inputs of one catalog build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Catalog source (file path or URL).
    pub source: String,
    /// Project directory the compiler runs in.
    pub directory: PathBuf,
    /// Where the built catalog is written.
    pub catalog_path: PathBuf,
    /// Where the extra journal rules are written for the compiler.
    pub rules_path: PathBuf,
    /// Rules merged into the catalog's own journal rules.
    pub extra_journal_rules: Vec<JournalRule>,
    pub typescript_compile: bool,
    pub typescript_package: bool,
}

/// Builds a catalog from its source.
pub trait CatalogBuilder: Send + Sync {
    fn build(
        &self,
        request: &BuildRequest,
    ) -> impl Future<Output = Result<BuiltCatalog, CatalogError>> + Send;
}

/// Runs `<program> --source S --directory D --output P --extra-journal-rules R`.
#[derive(Debug, Clone)]
pub struct CommandCatalogBuilder {
    program: PathBuf,
}

impl CommandCatalogBuilder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `directory` must be absolute: the compiler runs inside it and also
    /// receives it as `--directory`.
    fn command(&self, request: &BuildRequest, directory: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--source")
            .arg(&request.source)
            .arg("--directory")
            .arg(directory)
            .arg("--output")
            .arg(&request.catalog_path)
            .arg("--extra-journal-rules")
            .arg(&request.rules_path)
            .current_dir(directory)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if !request.typescript_compile {
            cmd.arg("--skip-typescript-compile");
        }
        if request.typescript_package {
            cmd.arg("--typescript-package");
        }
        cmd
    }
}

impl CatalogBuilder for CommandCatalogBuilder {
    async fn build(&self, request: &BuildRequest) -> Result<BuiltCatalog, CatalogError> {
        let directory = tokio::fs::canonicalize(&request.directory)
            .await
            .map_err(|e| CatalogError::BuildFailed {
                reason: format!("resolving {}: {e}", request.directory.display()),
            })?;
        let rules = serde_json::to_vec_pretty(&request.extra_journal_rules).map_err(|e| {
            CatalogError::BuildFailed {
                reason: format!("encoding journal rules: {e}"),
            }
        })?;
        tokio::fs::write(&request.rules_path, rules)
            .await
            .map_err(|e| CatalogError::BuildFailed {
                reason: format!("writing {}: {e}", request.rules_path.display()),
            })?;

        info!(
            program = %self.program.display(),
            source = %request.source,
            directory = %directory.display(),
            "building catalog"
        );
        let output = self
            .command(request, &directory)
            .output()
            .await
            .map_err(|e| CatalogError::BuildFailed {
                reason: format!("running {}: {e}", self.program.display()),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CatalogError::BuildFailed {
                reason: format!("{} ({})", stderr.trim(), output.status),
            });
        }

        let content = tokio::fs::read_to_string(&request.catalog_path)
            .await
            .map_err(|e| CatalogError::ArtifactRead {
                path: request.catalog_path.display().to_string(),
                reason: e.to_string(),
            })?;
        let mut catalog = BuiltCatalog::from_json(&content)?;
        merge_rules(&mut catalog.journal_rules, &request.extra_journal_rules);
        catalog.validate()?;

        debug!(
            collections = catalog.collections.len(),
            derivations = catalog.derivations.len(),
            tests = catalog.tests.len(),
            "catalog built"
        );
        Ok(catalog)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    use flowtest_core::journal::{TESTING_OVERRIDE_RULE, testing_override_rule};

    fn script(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("build.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn request(dir: &std::path::Path) -> BuildRequest {
        BuildRequest {
            source: "flow.yaml".to_owned(),
            directory: dir.to_path_buf(),
            catalog_path: dir.join("catalog.json"),
            rules_path: dir.join("journal-rules.json"),
            extra_journal_rules: vec![testing_override_rule()],
            typescript_compile: true,
            typescript_package: false,
        }
    }

    #[tokio::test]
    async fn test_builds_and_merges_override_rule() {
        let dir = tempfile::tempdir().unwrap();
        // Writes a one-collection catalog to the path after --output.
        let builder = CommandCatalogBuilder::new(script(
            dir.path(),
            r#"while [ $# -gt 0 ]; do [ "$1" = --output ] && out="$2"; shift; done
printf '{"collections":[{"name":"acme/orders","key":["/id"]}]}' > "$out""#,
        ));

        let catalog = builder.build(&request(dir.path())).await.unwrap();

        assert_eq!(catalog.collections.len(), 1);
        assert_eq!(catalog.journal_rules.len(), 1);
        assert_eq!(catalog.journal_rules[0].rule, TESTING_OVERRIDE_RULE);
        let rules = std::fs::read_to_string(dir.path().join("journal-rules.json")).unwrap();
        assert!(rules.contains("testing-overrides"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let builder =
            CommandCatalogBuilder::new(script(dir.path(), "echo 'flow.yaml: bad key' >&2\nexit 3"));

        let err = builder.build(&request(dir.path())).await.unwrap_err();

        assert!(matches!(err, CatalogError::BuildFailed { .. }));
        assert!(err.to_string().contains("flow.yaml: bad key"));
    }

    #[tokio::test]
    async fn test_missing_artifact_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let builder = CommandCatalogBuilder::new(script(dir.path(), "exit 0"));

        let err = builder.build(&request(dir.path())).await.unwrap_err();
        assert!(matches!(err, CatalogError::ArtifactRead { .. }));
    }

    #[tokio::test]
    async fn test_relative_directory_is_resolved_before_running() {
        // Given: a project directory named relative to the current directory
        let project = tempfile::Builder::new()
            .prefix("flowtest-build")
            .tempdir_in(".")
            .unwrap();
        assert!(project.path().is_relative());
        let scripts = tempfile::tempdir().unwrap();
        let mut request = request(scripts.path());
        request.directory = project.path().to_path_buf();
        // Fails unless --directory names the directory the compiler runs in.
        let builder = CommandCatalogBuilder::new(script(
            scripts.path(),
            r#"while [ $# -gt 0 ]; do
  [ "$1" = --directory ] && dir="$2"
  [ "$1" = --output ] && out="$2"
  shift
done
[ "$dir" = "$(pwd -P)" ] || { echo "directory $dir, running in $(pwd -P)" >&2; exit 9; }
printf '{"collections":[]}' > "$out""#,
        ));

        // When
        let catalog = builder.build(&request).await.unwrap();

        // Then
        assert!(catalog.collections.is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_is_build_failure() {
        let dir = tempfile::tempdir().unwrap();
        let builder = CommandCatalogBuilder::new(script(dir.path(), "exit 0"));
        let mut request = request(dir.path());
        request.directory = dir.path().join("no-such-project");

        let err = builder.build(&request).await.unwrap_err();

        assert!(matches!(err, CatalogError::BuildFailed { .. }));
        assert!(err.to_string().contains("no-such-project"));
    }

    #[tokio::test]
    async fn test_missing_program_is_build_failure() {
        let dir = tempfile::tempdir().unwrap();
        let builder = CommandCatalogBuilder::new("/nonexistent/flowctl-build");

        let err = builder.build(&request(dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/flowctl-build"));
    }
}
