//! 스토어에 카탈로그 및 샤드 스펙 적용

use std::path::Path;

use flowtest_core::catalog::BuiltCatalog;
use flowtest_store::KvStore;
use serde_json::json;
use tracing::{debug, info};

use crate::cluster::RuntimeCluster;
use crate::error::ClusterError;
use crate::shards::ShardSpec;

/// 카탈로그 스펙을 `catalog_prefix` 아래에 기록합니다.
///
/// 기존 prefix 내용은 먼저 모두 삭제됩니다. 키 배치:
///
/// - `<prefix>/collections/<name>`
/// - `<prefix>/derivations/<name>` (워커 엔드포인트 포함)
/// - `<prefix>/tests/<순번>`
/// - `<prefix>/journal_rules/<rule>`
pub async fn apply_catalog_to_store<S: KvStore>(
    store: &S,
    catalog_prefix: &str,
    catalog: &BuiltCatalog,
    worker_endpoint: &Path,
) -> Result<(), ClusterError> {
    let removed = store.delete_prefix(&format!("{catalog_prefix}/")).await?;
    if removed > 0 {
        debug!(removed, prefix = catalog_prefix, "cleared previous catalog");
    }

    for collection in &catalog.collections {
        store
            .put(
                &format!("{catalog_prefix}/collections/{}", collection.name),
                serde_json::to_string(collection)?,
            )
            .await?;
    }

    let endpoint = format!("unix://{}", worker_endpoint.display());
    for derivation in &catalog.derivations {
        let value = json!({
            "spec": derivation,
            "worker_endpoint": endpoint,
        });
        store
            .put(
                &format!("{catalog_prefix}/derivations/{}", derivation.collection),
                value.to_string(),
            )
            .await?;
    }

    for (index, test) in catalog.tests.iter().enumerate() {
        store
            .put(
                &format!("{catalog_prefix}/tests/{index:04}"),
                serde_json::to_string(test)?,
            )
            .await?;
    }

    for rule in &catalog.journal_rules {
        store
            .put(
                &format!("{catalog_prefix}/journal_rules/{}", rule.rule),
                serde_json::to_string(rule)?,
            )
            .await?;
    }

    info!(
        prefix = catalog_prefix,
        collections = catalog.collections.len(),
        derivations = catalog.derivations.len(),
        tests = catalog.tests.len(),
        "catalog applied"
    );
    Ok(())
}

/// derivation마다 샤드 스펙을 컨슈머 prefix 아래에 기록합니다.
pub async fn apply_derivation_shards<S: KvStore + 'static>(
    cluster: &RuntimeCluster<S>,
) -> Result<Vec<ShardSpec>, ClusterError> {
    let consumer = &cluster.prefixes().consumer;
    let zone = &cluster.config().zone;
    let mut shards = Vec::with_capacity(cluster.catalog().derivations.len());

    for derivation in &cluster.catalog().derivations {
        let shard = ShardSpec::for_derivation(derivation, zone);
        cluster
            .store()
            .put(
                &format!("{consumer}/shards/{}", shard.id),
                serde_json::to_string(&shard)?,
            )
            .await?;
        shards.push(shard);
    }

    info!(shards = shards.len(), "derivation shards applied");
    Ok(shards)
}
