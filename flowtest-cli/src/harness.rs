//! Harness orchestration.
//!
//! Acquisition order, each step pushing a teardown guard:
//!
//! 1. workspace
//! 2. catalog build (nothing to release)
//! 3. metadata store process and client
//! 4. compute worker process
//! 5. catalog specs applied to the store
//! 6. runtime cluster, shards, execution graph, test loop
//!
//! Teardown runs in reverse on every path, including an interrupt during
//! setup. A cluster-stop failure is the only teardown error that can become
//! the harness error.

use std::future::Future;
use std::path::PathBuf;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use flowtest_cluster::{
    CatalogEngine, ClusterConfig, ClusterError, ExecutionGraph, RuntimeCluster, WorkerLambdas,
    apply_catalog_to_store, apply_derivation_shards,
};
use flowtest_core::catalog::BuiltCatalog;
use flowtest_core::config::FlowtestConfig;
use flowtest_core::error::{FlowtestError, SetupError};
use flowtest_core::journal::testing_override_rule;
use flowtest_core::metrics as m;
use flowtest_core::result::Summary;
use flowtest_store::StoreClient;
use flowtest_supervisor::{WorkspaceHandle, start_compute_worker, start_metadata_store};

use crate::builder::{BuildRequest, CatalogBuilder, CommandCatalogBuilder};
use crate::reporter::Reporter;
use crate::runner::run_tests;
use crate::teardown::{GuardPolicy, TeardownStack};

/// What to build and test.
#[derive(Debug, Clone)]
pub struct TestRequest {
    pub source: String,
    pub directory: PathBuf,
}

/// One harness run per [`Harness::run`] call.
pub struct Harness<B> {
    config: FlowtestConfig,
    builder: B,
    workspace_parent: Option<PathBuf>,
}

impl Harness<CommandCatalogBuilder> {
    /// Harness building through the configured compiler command.
    pub fn from_config(config: FlowtestConfig) -> Self {
        let builder = CommandCatalogBuilder::new(&config.builder.program);
        Self::new(config, builder)
    }
}

impl<B: CatalogBuilder> Harness<B> {
    pub fn new(config: FlowtestConfig, builder: B) -> Self {
        Self {
            config,
            builder,
            workspace_parent: None,
        }
    }

    /// Creates workspaces under `parent` instead of the system temp directory.
    pub fn workspace_in(mut self, parent: impl Into<PathBuf>) -> Self {
        self.workspace_parent = Some(parent.into());
        self
    }

    pub fn config(&self) -> &FlowtestConfig {
        &self.config
    }

    /// Provisions the cluster, runs every test, and tears everything down.
    ///
    /// Returns the summary, or the harness error: a setup failure, an
    /// interrupt, or a cluster-stop failure when nothing else failed.
    /// `interrupt` is watched from the first setup step to the last test.
    pub async fn run<R, I>(
        &self,
        request: &TestRequest,
        reporter: &mut R,
        interrupt: I,
    ) -> Result<Summary, FlowtestError>
    where
        R: Reporter + ?Sized,
        I: Future<Output = String>,
    {
        let mut interrupt = pin!(interrupt);
        let mut stack = TeardownStack::new();
        let result = self
            .provision_and_run(request, reporter, interrupt.as_mut(), &mut stack)
            .await;
        if let Err(e) = &result
            && e.is_setup_failure()
        {
            metrics::counter!(m::SETUP_FAILURES_TOTAL).increment(1);
        }
        stack.finish(result).await
    }

    async fn provision_and_run<R, I>(
        &self,
        request: &TestRequest,
        reporter: &mut R,
        mut interrupt: Pin<&mut I>,
        stack: &mut TeardownStack,
    ) -> Result<Summary, FlowtestError>
    where
        R: Reporter + ?Sized,
        I: Future<Output = String>,
    {
        // On interrupt only the guards pushed so far run.
        let (cluster, catalog, worker_socket) = tokio::select! {
            biased;
            signal = interrupt.as_mut() => return Err(interrupted_during_setup(signal)),
            provisioned = self.provision(request, stack) => provisioned?,
        };

        let outcome = self
            .exercise(&cluster, &catalog, worker_socket, reporter, interrupt)
            .await;
        stack.push("cluster", GuardPolicy::Surface, move || async move {
            let mut cluster = cluster;
            cluster.stop().await.map_err(ClusterError::into_teardown)
        });
        outcome
    }

    /// Acquires every resource up to a running cluster, pushing a guard for each.
    async fn provision(
        &self,
        request: &TestRequest,
        stack: &mut TeardownStack,
    ) -> Result<(RuntimeCluster<StoreClient>, Arc<BuiltCatalog>, PathBuf), FlowtestError> {
        let workspace = Arc::new(match &self.workspace_parent {
            Some(parent) => WorkspaceHandle::create_in(parent)?,
            None => WorkspaceHandle::create()?,
        });
        info!(workspace = %workspace.path().display(), "workspace created");
        let guarded = Arc::clone(&workspace);
        stack.push("workspace", GuardPolicy::Log, move || async move {
            match Arc::try_unwrap(guarded) {
                Ok(workspace) => workspace.close().map_err(FlowtestError::from),
                Err(shared) => {
                    warn!("workspace still referenced at teardown; removing on drop");
                    drop(shared);
                    Ok(())
                }
            }
        });

        let catalog = Arc::new(self.build_catalog(request, &workspace).await?);

        let (mut store_process, client) =
            start_metadata_store(&workspace, &self.config.store).await?;
        let guarded = Arc::clone(&client);
        stack.push("metadata-store", GuardPolicy::Log, move || async move {
            guarded.close();
            store_process.stop().await.map_err(FlowtestError::from)
        });

        let worker_socket = workspace.worker_socket();
        let mut worker =
            start_compute_worker(&request.directory, &worker_socket, &self.config.worker).await?;
        stack.push("compute-worker", GuardPolicy::Log, move || async move {
            worker.stop().await.map_err(FlowtestError::from)
        });

        let cluster_config = self.cluster_config(&workspace);
        let prefixes = cluster_config.prefixes()?;
        apply_catalog_to_store(client.as_ref(), &prefixes.catalog, &catalog, &worker_socket)
            .await
            .map_err(apply_failed)?;

        let cluster = RuntimeCluster::new(Arc::clone(&catalog), client, cluster_config).await?;
        Ok((cluster, catalog, worker_socket))
    }

    async fn build_catalog(
        &self,
        request: &TestRequest,
        workspace: &WorkspaceHandle,
    ) -> Result<BuiltCatalog, FlowtestError> {
        let build = BuildRequest {
            source: request.source.clone(),
            directory: request.directory.clone(),
            catalog_path: workspace.catalog_path(),
            rules_path: workspace.journal_rules_path(),
            extra_journal_rules: vec![testing_override_rule()],
            typescript_compile: self.config.builder.typescript_compile,
            typescript_package: self.config.builder.typescript_package,
        };
        Ok(self.builder.build(&build).await?)
    }

    fn cluster_config(&self, workspace: &WorkspaceHandle) -> ClusterConfig {
        let settings = &self.config.cluster;
        ClusterConfig {
            root_prefix: settings.prefix.clone(),
            run_id: uuid::Uuid::new_v4().simple().to_string(),
            zone: settings.zone.clone(),
            disable_clock_ticks: settings.disable_clock_ticks,
            tick_interval: Duration::from_millis(settings.tick_interval_ms),
            fragment_root: workspace.fragment_root(),
        }
    }

    async fn exercise<R, I>(
        &self,
        cluster: &RuntimeCluster<StoreClient>,
        catalog: &BuiltCatalog,
        worker_socket: PathBuf,
        reporter: &mut R,
        mut interrupt: Pin<&mut I>,
    ) -> Result<Summary, FlowtestError>
    where
        R: Reporter + ?Sized,
        I: Future<Output = String>,
    {
        tokio::select! {
            biased;
            signal = interrupt.as_mut() => return Err(interrupted_during_setup(signal)),
            applied = apply_derivation_shards(cluster) => {
                applied.map_err(apply_failed)?;
            }
        }
        let graph = ExecutionGraph::new(&catalog.derivations);
        let engine = CatalogEngine::new(WorkerLambdas::new(
            worker_socket,
            self.config.worker.call_timeout(),
        ));

        info!(tests = catalog.tests.len(), "running tests");
        run_tests(&engine, &graph, cluster, &catalog.tests, reporter, interrupt).await
    }
}

fn interrupted_during_setup(signal: String) -> FlowtestError {
    warn!(signal = %signal, "interrupted during setup");
    FlowtestError::Interrupted { signal }
}

fn apply_failed(err: ClusterError) -> FlowtestError {
    SetupError::ApplySpecs(err.to_string()).into()
}
