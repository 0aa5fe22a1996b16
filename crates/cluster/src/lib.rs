//! flowtest-cluster: 시뮬레이션 런타임 클러스터
//!
//! 메타데이터 스토어 위에서 동작하는 단일 노드 클러스터와 테스트 실행 엔진을 제공합니다.
//!
//! # 모듈 구성
//! - [`cluster`]: 클러스터 생성, 정지, 네임스페이스
//! - [`apply`]: 카탈로그 및 샤드 스펙 적용
//! - [`fragment`]: 파일 기반 저널 프래그먼트
//! - [`graph`]: derivation 실행 그래프
//! - [`shards`]: 샤드 스펙과 레지스터
//! - [`engine`]: 테스트 스텝 실행
//! - [`clock`]: 논리 시계

pub mod apply;
pub mod clock;
pub mod cluster;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod graph;
pub mod shards;

pub use apply::{apply_catalog_to_store, apply_derivation_shards};
pub use clock::LogicalClock;
pub use cluster::{ClusterConfig, Prefixes, RuntimeCluster};
pub use engine::{
    CatalogEngine, LambdaRequest, LambdaResponse, Lambdas, RegisterReset, TestEngine,
    WorkerLambdas,
};
pub use error::{ClusterError, EngineError, StepFailure};
pub use graph::ExecutionGraph;
pub use shards::{Registers, ShardSpec};
