//! 시뮬레이션 런타임 클러스터
//!
//! 단일 노드, 단일 복제, 파일 기반 프래그먼트, 논리 시계로 동작하는 클러스터입니다.
//! 생성 시 브로커 저널 스펙과 멤버 키를 스토어에 등록하고, 정지 시 멤버 키를 해제합니다.
//!
//! # 네임스페이스
//! 관심사별 prefix는 `<root>/<run-id>/<concern>` 형식이며 서로 달라야 합니다.
//!
//! | 관심사 | 내용 |
//! |--------|------|
//! | catalog | 컬렉션, derivation, 테스트 스펙 |
//! | broker | 저널 스펙, 브로커 멤버 |
//! | consumer | 샤드 스펙, 체크포인트, 컨슈머 멤버 |

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flowtest_core::catalog::BuiltCatalog;
use flowtest_core::journal::{JournalSpec, resolve_journal};
use flowtest_store::KvStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::LogicalClock;
use crate::error::ClusterError;
use crate::fragment::FragmentStore;
use crate::shards::Registers;

/// 멤버 키에 기록되는 식별자
const MEMBER_ID: &str = "flowtest";

/// 클러스터 생성 설정
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// 네임스페이스 루트 (예: `/flowctl-test`)
    pub root_prefix: String,
    /// 실행 ID. 실행 간 키 충돌을 막습니다.
    pub run_id: String,
    /// 존 이름
    pub zone: String,
    /// 참이면 벽시계 틱이 없습니다.
    pub disable_clock_ticks: bool,
    /// 틱 활성화 시 간격
    pub tick_interval: Duration,
    /// 프래그먼트 저장소 루트
    pub fragment_root: PathBuf,
}

impl ClusterConfig {
    /// 관심사별 prefix를 계산하고 검증합니다.
    pub fn prefixes(&self) -> Result<Prefixes, ClusterError> {
        let root = self.root_prefix.trim_end_matches('/');
        if root.is_empty() || !root.starts_with('/') {
            return Err(ClusterError::InvalidConfig(format!(
                "root prefix '{}' must be a non-empty absolute key",
                self.root_prefix
            )));
        }
        if self.run_id.is_empty() || self.run_id.contains('/') {
            return Err(ClusterError::InvalidConfig(format!(
                "run id '{}' must be a non-empty single path segment",
                self.run_id
            )));
        }
        if self.zone.is_empty() {
            return Err(ClusterError::InvalidConfig("zone must not be empty".to_owned()));
        }
        if !self.disable_clock_ticks && self.tick_interval.is_zero() {
            return Err(ClusterError::InvalidConfig(
                "tick interval must be positive when ticks are enabled".to_owned(),
            ));
        }

        let base = format!("{root}/{}", self.run_id);
        let prefixes = Prefixes {
            catalog: format!("{base}/catalog"),
            broker: format!("{base}/broker"),
            consumer: format!("{base}/consumer"),
        };
        prefixes.validate()?;
        Ok(prefixes)
    }
}

/// 관심사별 키 prefix (끝에 `/` 없음)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefixes {
    pub catalog: String,
    pub broker: String,
    pub consumer: String,
}

impl Prefixes {
    /// 비어 있지 않고, 서로 다르며, 어느 것도 다른 것의 하위가 아님을 확인합니다.
    pub fn validate(&self) -> Result<(), ClusterError> {
        let all = [&self.catalog, &self.broker, &self.consumer];
        for (i, a) in all.iter().enumerate() {
            if a.is_empty() {
                return Err(ClusterError::InvalidConfig("empty prefix".to_owned()));
            }
            for b in all.iter().skip(i + 1) {
                let (a_dir, b_dir) = (format!("{a}/"), format!("{b}/"));
                if a == b || a_dir.starts_with(&b_dir) || b_dir.starts_with(&a_dir) {
                    return Err(ClusterError::InvalidConfig(format!(
                        "prefixes '{a}' and '{b}' overlap"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// 실행 중인 시뮬레이션 클러스터
pub struct RuntimeCluster<S: KvStore> {
    store: Arc<S>,
    catalog: Arc<BuiltCatalog>,
    config: ClusterConfig,
    prefixes: Prefixes,
    clock: Arc<LogicalClock>,
    fragments: FragmentStore,
    registers: Registers,
    journals: BTreeMap<String, JournalSpec>,
    member_keys: Vec<String>,
    ticker: Option<(CancellationToken, JoinHandle<()>)>,
    stopped: bool,
}

impl<S: KvStore> std::fmt::Debug for RuntimeCluster<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeCluster")
            .field("prefixes", &self.prefixes)
            .field("journals", &self.journals.len())
            .field("clock", &self.clock.now())
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl<S: KvStore + 'static> RuntimeCluster<S> {
    /// 클러스터를 생성합니다.
    ///
    /// 컬렉션마다 저널 규칙을 적용한 저널 스펙을 등록하고, 브로커와 컨슈머의
    /// 멤버 키를 기록합니다. 중간에 실패하면 이미 기록한 멤버 키를 되돌립니다.
    pub async fn new(
        catalog: Arc<BuiltCatalog>,
        store: Arc<S>,
        config: ClusterConfig,
    ) -> Result<Self, ClusterError> {
        let prefixes = config.prefixes()?;
        let fragments = FragmentStore::new(&config.fragment_root)?;

        let mut journals = BTreeMap::new();
        for collection in &catalog.collections {
            let spec = resolve_journal(&catalog.journal_rules, &collection.name);
            fragments.register(&spec)?;
            store
                .put(
                    &format!("{}/journals/{}", prefixes.broker, spec.name),
                    serde_json::to_string(&spec)?,
                )
                .await?;
            debug!(
                journal = %spec.name,
                replication = spec.replication,
                codec = %spec.compression_codec,
                "journal registered"
            );
            journals.insert(spec.name.clone(), spec);
        }

        let mut cluster = Self {
            registers: Registers::new(&catalog.derivations),
            store,
            catalog,
            prefixes,
            clock: Arc::new(LogicalClock::new()),
            fragments,
            journals,
            member_keys: Vec::new(),
            ticker: None,
            stopped: false,
            config,
        };

        if let Err(e) = cluster.announce_members().await {
            if let Err(release_err) = cluster.release_members().await {
                warn!(error = %release_err, "failed to release member keys after construction failure");
            }
            cluster.stopped = true;
            return Err(e);
        }

        if !cluster.config.disable_clock_ticks {
            cluster.ticker = Some(spawn_ticker(
                cluster.clock.clone(),
                cluster.config.tick_interval,
            ));
        }

        info!(
            prefix = %cluster.config.root_prefix,
            run_id = %cluster.config.run_id,
            journals = cluster.journals.len(),
            ticks = !cluster.config.disable_clock_ticks,
            "cluster started"
        );
        Ok(cluster)
    }

    async fn announce_members(&mut self) -> Result<(), ClusterError> {
        let zone = &self.config.zone;
        for concern in [&self.prefixes.broker, &self.prefixes.consumer] {
            let key = format!("{concern}/members/{zone}#{MEMBER_ID}");
            self.store
                .put(
                    &key,
                    serde_json::json!({ "zone": zone, "id": MEMBER_ID }).to_string(),
                )
                .await?;
            self.member_keys.push(key);
        }
        Ok(())
    }

    async fn release_members(&mut self) -> Result<(), ClusterError> {
        while let Some(key) = self.member_keys.pop() {
            self.store.delete_prefix(&key).await?;
        }
        Ok(())
    }

    /// 클러스터를 정지합니다. 두 번째 호출부터는 아무 일도 하지 않습니다.
    pub async fn stop(&mut self) -> Result<(), ClusterError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        if let Some((token, handle)) = self.ticker.take() {
            token.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "clock ticker task failed");
            }
        }
        self.release_members().await?;
        info!(clock = self.clock.now(), "cluster stopped");
        Ok(())
    }
}

impl<S: KvStore> RuntimeCluster<S> {
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn catalog(&self) -> &BuiltCatalog {
        &self.catalog
    }

    pub fn prefixes(&self) -> &Prefixes {
        &self.prefixes
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn clock(&self) -> &LogicalClock {
        &self.clock
    }

    pub fn fragments(&self) -> &FragmentStore {
        &self.fragments
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// 컬렉션의 저널 스펙
    pub fn journal(&self, collection: &str) -> Option<&JournalSpec> {
        self.journals.get(collection)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl<S: KvStore> Drop for RuntimeCluster<S> {
    fn drop(&mut self) {
        if let Some((token, _)) = self.ticker.take() {
            token.cancel();
        }
        if !self.stopped {
            warn!("cluster dropped without stop");
        }
    }
}

fn spawn_ticker(clock: Arc<LogicalClock>, every: Duration) -> (CancellationToken, JoinHandle<()>) {
    let token = CancellationToken::new();
    let cancelled = token.clone();
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancelled.cancelled() => break,
                _ = interval.tick() => {
                    clock.advance(1);
                }
            }
        }
    });
    (token, handle)
}
