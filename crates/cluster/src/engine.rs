//! 테스트 실행 엔진
//!
//! [`TestEngine`]은 테스트 케이스 하나를 클러스터에 대해 실행하고,
//! [`RegisterReset`]은 테스트 사이의 레지스터 재설정을 담당합니다.
//! 실행 루프는 이 두 trait에만 의존하므로 테스트에서 가짜 구현으로 대체할 수 있습니다.
//!
//! [`CatalogEngine`]의 스텝 의미:
//! - `ingest`: 논리 시계를 한 틱 진행하고, 문서를 컬렉션 저널에 추가한 뒤,
//!   그 컬렉션을 읽는 derivation으로 전파합니다 (람다 호출 → 파생 저널에 추가 → 재귀).
//! - `verify`: 테스트 시작 이후 컬렉션에 기록된 문서를 키 기준으로 축약(마지막 값 유지)하고
//!   키 순서로 정렬한 뒤, 기대 문서가 순서대로 부분 일치하는지 확인합니다.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use flowtest_core::catalog::{CollectionSpec, TestCase, TestStep};
use flowtest_store::KvStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::cluster::RuntimeCluster;
use crate::error::{EngineError, StepFailure};
use crate::graph::ExecutionGraph;

/// 파생 전파 최대 깊이
pub const DEFAULT_CASCADE_LIMIT: usize = 64;

/// 테스트 케이스 실행기
pub trait TestEngine<C>: Send + Sync {
    /// 테스트를 실행합니다. 성공 시 마지막 스텝의 선언 위치를 반환합니다.
    fn run_test_case(
        &self,
        graph: &ExecutionGraph,
        cluster: &C,
        test: &TestCase,
    ) -> impl Future<Output = Result<String, StepFailure>> + Send;
}

/// 테스트 간 공유 레지스터 재설정
pub trait RegisterReset {
    fn clear_registers_for_test(&self);
}

impl<S: KvStore> RegisterReset for RuntimeCluster<S> {
    fn clear_registers_for_test(&self) {
        self.registers().clear_for_test();
    }
}

/// 람다 호출 요청
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaRequest {
    pub derivation: String,
    pub transform: String,
    pub register: Value,
    pub documents: Vec<Value>,
}

/// 람다 호출 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaResponse {
    /// 파생 컬렉션에 추가할 문서
    pub documents: Vec<Value>,
    /// 갱신된 레지스터
    pub register: Value,
}

/// transform 람다 호출 경로
pub trait Lambdas: Send + Sync {
    fn invoke(
        &self,
        request: LambdaRequest,
    ) -> impl Future<Output = Result<LambdaResponse, EngineError>> + Send;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorkerReply {
    Failed { error: String },
    Ok(LambdaResponse),
}

/// 컴퓨트 워커 소켓으로 람다를 호출합니다. 호출마다 연결 하나를 사용합니다.
#[derive(Debug, Clone)]
pub struct WorkerLambdas {
    socket: PathBuf,
    call_timeout: Duration,
}

impl WorkerLambdas {
    pub fn new(socket: impl Into<PathBuf>, call_timeout: Duration) -> Self {
        Self {
            socket: socket.into(),
            call_timeout,
        }
    }

    async fn call(&self, request: &LambdaRequest) -> Result<LambdaResponse, String> {
        let stream = UnixStream::connect(&self.socket)
            .await
            .map_err(|e| format!("connect {}: {e}", self.socket.display()))?;
        let (reader, mut writer) = stream.into_split();

        let mut line = serde_json::to_string(request).map_err(|e| e.to_string())?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| format!("write: {e}"))?;

        let mut lines = BufReader::new(reader).lines();
        let reply = lines
            .next_line()
            .await
            .map_err(|e| format!("read: {e}"))?
            .ok_or_else(|| "worker closed the connection".to_owned())?;
        match serde_json::from_str::<WorkerReply>(&reply) {
            Ok(WorkerReply::Ok(response)) => Ok(response),
            Ok(WorkerReply::Failed { error }) => Err(error),
            Err(e) => Err(format!("malformed reply: {e}")),
        }
    }
}

impl Lambdas for WorkerLambdas {
    async fn invoke(&self, request: LambdaRequest) -> Result<LambdaResponse, EngineError> {
        let lambda_error = |reason: String| EngineError::Lambda {
            derivation: request.derivation.clone(),
            transform: request.transform.clone(),
            reason,
        };
        match timeout(self.call_timeout, self.call(&request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(reason)) => Err(lambda_error(reason)),
            Err(_) => Err(lambda_error(format!(
                "timed out after {}s",
                self.call_timeout.as_secs()
            ))),
        }
    }
}

/// 카탈로그 스텝을 실행하는 기본 엔진
#[derive(Debug, Clone)]
pub struct CatalogEngine<L> {
    lambdas: L,
    cascade_limit: usize,
}

impl<L: Lambdas> CatalogEngine<L> {
    pub fn new(lambdas: L) -> Self {
        Self {
            lambdas,
            cascade_limit: DEFAULT_CASCADE_LIMIT,
        }
    }

    pub fn with_cascade_limit(mut self, limit: usize) -> Self {
        self.cascade_limit = limit;
        self
    }

    async fn ingest<S: KvStore + 'static>(
        &self,
        graph: &ExecutionGraph,
        cluster: &RuntimeCluster<S>,
        collection: &str,
        documents: &[Value],
    ) -> Result<(), EngineError> {
        let clock = cluster.clock().advance(1);
        append(cluster, collection, clock, documents)?;

        let mut pending: VecDeque<(String, Vec<Value>, usize)> = VecDeque::new();
        pending.push_back((collection.to_owned(), documents.to_vec(), 0));

        while let Some((source, docs, depth)) = pending.pop_front() {
            if docs.is_empty() {
                continue;
            }
            for reader in graph.readers_of(&source) {
                if depth >= self.cascade_limit {
                    return Err(EngineError::CascadeLimit {
                        collection: reader.derivation.clone(),
                        limit: self.cascade_limit,
                    });
                }
                let request = LambdaRequest {
                    derivation: reader.derivation.clone(),
                    transform: reader.transform.clone(),
                    register: cluster.registers().get(&reader.derivation),
                    documents: docs.clone(),
                };
                trace!(derivation = %reader.derivation, transform = %reader.transform, docs = docs.len(), "invoking lambda");
                let response = self.lambdas.invoke(request).await?;
                cluster
                    .registers()
                    .set(&reader.derivation, response.register);

                let end = append(cluster, &reader.derivation, clock, &response.documents)?;
                cluster
                    .store()
                    .put(
                        &format!(
                            "{}/checkpoints/derive/{}",
                            cluster.prefixes().consumer,
                            reader.derivation
                        ),
                        end.to_string(),
                    )
                    .await?;
                pending.push_back((reader.derivation.clone(), response.documents, depth + 1));
            }
        }
        Ok(())
    }

    fn verify<S: KvStore>(
        &self,
        cluster: &RuntimeCluster<S>,
        collection: &str,
        expected: &[Value],
        from: u64,
    ) -> Result<(), EngineError> {
        let spec = cluster
            .catalog()
            .collection(collection)
            .ok_or_else(|| EngineError::UnknownCollection(collection.to_owned()))?;
        let written = cluster.fragments().read(collection, from)?;
        let actual = reduce_by_key(spec, written);
        let expected = sort_by_key(spec, expected.to_vec());

        let mismatch = |reason: String| EngineError::Mismatch {
            collection: collection.to_owned(),
            reason,
        };
        if actual.len() != expected.len() {
            return Err(mismatch(format!(
                "expected {} documents, found {}: {}",
                expected.len(),
                actual.len(),
                Value::Array(actual.clone())
            )));
        }
        for (index, (want, got)) in expected.iter().zip(&actual).enumerate() {
            if !is_subset(want, got) {
                return Err(mismatch(format!(
                    "document {index}: expected {want} to be contained in {got}"
                )));
            }
        }
        Ok(())
    }
}

impl<S, L> TestEngine<RuntimeCluster<S>> for CatalogEngine<L>
where
    S: KvStore + 'static,
    L: Lambdas,
{
    async fn run_test_case(
        &self,
        graph: &ExecutionGraph,
        cluster: &RuntimeCluster<S>,
        test: &TestCase,
    ) -> Result<String, StepFailure> {
        // 이전 테스트의 문서는 검증 대상이 아님
        let mut start: HashMap<&str, u64> = HashMap::new();
        for collection in &cluster.catalog().collections {
            let offset = cluster
                .fragments()
                .end_offset(&collection.name)
                .map_err(|e| StepFailure::new(test.test.clone(), e))?;
            start.insert(collection.name.as_str(), offset);
        }

        let mut last_scope = test.test.clone();
        for step in &test.steps {
            let result = match step {
                TestStep::Ingest {
                    collection,
                    documents,
                    ..
                } => self.ingest(graph, cluster, collection, documents).await,
                TestStep::Verify {
                    collection,
                    documents,
                    ..
                } => {
                    let from = start.get(collection.as_str()).copied().unwrap_or(0);
                    self.verify(cluster, collection, documents, from)
                }
            };
            result.map_err(|e| StepFailure::new(step.scope(), e))?;
            debug!(test = %test.test, scope = step.scope(), "step passed");
            last_scope = step.scope().to_owned();
        }
        Ok(last_scope)
    }
}

fn append<S: KvStore>(
    cluster: &RuntimeCluster<S>,
    collection: &str,
    clock: u64,
    documents: &[Value],
) -> Result<u64, EngineError> {
    if cluster.journal(collection).is_none() {
        return Err(EngineError::UnknownCollection(collection.to_owned()));
    }
    Ok(cluster.fragments().append(collection, clock, documents)?)
}

/// 같은 키의 문서는 마지막 것만 남기고 키 순서로 정렬합니다.
fn reduce_by_key(spec: &CollectionSpec, documents: Vec<Value>) -> Vec<Value> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut reduced: Vec<(Vec<Value>, Value)> = Vec::new();
    for doc in documents {
        let key = spec.extract_key(&doc);
        let fingerprint = Value::Array(key.clone()).to_string();
        match index.get(&fingerprint) {
            Some(&i) => reduced[i].1 = doc,
            None => {
                index.insert(fingerprint, reduced.len());
                reduced.push((key, doc));
            }
        }
    }
    reduced.sort_by(|a, b| compare_keys(&a.0, &b.0));
    reduced.into_iter().map(|(_, doc)| doc).collect()
}

fn sort_by_key(spec: &CollectionSpec, documents: Vec<Value>) -> Vec<Value> {
    let mut keyed: Vec<(Vec<Value>, Value)> = documents
        .into_iter()
        .map(|doc| (spec.extract_key(&doc), doc))
        .collect();
    keyed.sort_by(|a, b| compare_keys(&a.0, &b.0));
    keyed.into_iter().map(|(_, doc)| doc).collect()
}

fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = compare_values(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// null < bool < number < string < array < object
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => compare_keys(x, y),
        _ => rank(a).cmp(&rank(b)).then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

/// `expected`의 모든 속성이 `actual`에 같은 값으로 있는지 확인합니다.
/// 객체는 부분 일치, 그 외는 완전 일치입니다.
fn is_subset(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(want), Value::Object(got)) => want
            .iter()
            .all(|(k, v)| got.get(k).is_some_and(|g| is_subset(v, g))),
        (Value::Array(want), Value::Array(got)) => {
            want.len() == got.len() && want.iter().zip(got).all(|(w, g)| is_subset(w, g))
        }
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => expected == actual,
    }
}
