//! 메타데이터 스토어 Unix 소켓 클라이언트
//!
//! 생성 시 연결 하나를 열고 모든 호출에 재사용합니다.
//! [`StoreClient::close`] 또는 [`StoreClient::closer`] 토큰 취소 후에는 진행 중인
//! 호출과 이후 호출이 [`StoreError::Closed`]로 실패합니다. 프로세스 감시자는
//! 스토어가 종료되면 이를 이용해 즉시 실패시킵니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::KvStore;
use crate::error::StoreError;
use crate::protocol::{
    KeyValue, PROTOCOL_VERSION, Request, Response, check_server_version, encode_line,
};

const DIAL_RETRY_INTERVAL: Duration = Duration::from_millis(25);

struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Connection {
    fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn roundtrip(&mut self, request: &Request) -> Result<Response, StoreError> {
        self.writer
            .write_all(encode_line(request)?.as_bytes())
            .await?;
        let line = self.lines.next_line().await?.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "store closed the connection",
            )
        })?;
        Ok(serde_json::from_str(&line)?)
    }
}

/// 연결된 스토어 클라이언트
pub struct StoreClient {
    socket: PathBuf,
    conn: Mutex<Option<Connection>>,
    closed: CancellationToken,
    server_version: semver::Version,
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("socket", &self.socket)
            .field("server_version", &self.server_version)
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

impl StoreClient {
    /// `socket`에 연결하고 버전 핸드셰이크를 수행합니다.
    ///
    /// 서버 프로세스 직후에는 소켓이 아직 없을 수 있으므로 `dial_timeout`이
    /// 지날 때까지 연결을 재시도합니다.
    pub async fn connect(
        socket: impl AsRef<Path>,
        dial_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let socket = socket.as_ref().to_path_buf();
        let stream = dial(&socket, dial_timeout).await?;
        let mut conn = Connection::new(stream);

        let hello = Request::Hello {
            client_version: PROTOCOL_VERSION.to_owned(),
        };
        let response = timeout(dial_timeout, conn.roundtrip(&hello))
            .await
            .map_err(|_| StoreError::Handshake("no hello response".to_owned()))??;
        let server_version = match response {
            Response::Hello { server_version } => check_server_version(&server_version)?,
            Response::Error { message } => return Err(StoreError::Handshake(message)),
            other => {
                return Err(StoreError::Handshake(format!(
                    "unexpected response: {other:?}"
                )));
            }
        };
        debug!(socket = %socket.display(), %server_version, "store client connected");

        Ok(Self {
            socket,
            conn: Mutex::new(Some(conn)),
            closed: CancellationToken::new(),
            server_version,
        })
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn server_version(&self) -> &semver::Version {
        &self.server_version
    }

    /// 취소하면 이 클라이언트를 닫는 토큰
    pub fn closer(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// 클라이언트를 닫습니다. 여러 번 호출해도 안전합니다.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    async fn call(&self, request: Request) -> Result<Response, StoreError> {
        if self.closed.is_cancelled() {
            return Err(StoreError::Closed);
        }
        let mut guard = tokio::select! {
            _ = self.closed.cancelled() => return Err(StoreError::Closed),
            guard = self.conn.lock() => guard,
        };
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;

        trace!(?request, "store call");
        let result = tokio::select! {
            _ = self.closed.cancelled() => Err(StoreError::Closed),
            result = conn.roundtrip(&request) => result,
        };
        if matches!(&result, Err(e) if e.is_connectivity()) {
            // 요청/응답이 중간에 끊기면 스트림을 더 쓸 수 없음
            *guard = None;
        }

        match result? {
            Response::Error { message } => Err(StoreError::Server(message)),
            response => Ok(response),
        }
    }
}

async fn dial(socket: &Path, dial_timeout: Duration) -> Result<UnixStream, StoreError> {
    let mut last_error: Option<String> = None;
    let attempt = async {
        loop {
            match UnixStream::connect(socket).await {
                Ok(stream) => return stream,
                Err(e) => {
                    trace!(socket = %socket.display(), error = %e, "dial attempt failed");
                    last_error = Some(e.to_string());
                    sleep(DIAL_RETRY_INTERVAL).await;
                }
            }
        }
    };
    match timeout(dial_timeout, attempt).await {
        Ok(stream) => Ok(stream),
        Err(_) => Err(StoreError::DialTimeout {
            socket: socket.display().to_string(),
            timeout_ms: u64::try_from(dial_timeout.as_millis()).unwrap_or(u64::MAX),
            reason: last_error.unwrap_or_else(|| "no connection attempt completed".to_owned()),
        }),
    }
}

fn unexpected(response: Response) -> StoreError {
    StoreError::Protocol(format!("unexpected response: {response:?}"))
}

impl KvStore for StoreClient {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self
            .call(Request::Get {
                key: key.to_owned(),
            })
            .await?
        {
            Response::Value { value } => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        match self
            .call(Request::Put {
                key: key.to_owned(),
                value,
            })
            .await?
        {
            Response::Value { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn range(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError> {
        match self
            .call(Request::Range {
                prefix: prefix.to_owned(),
            })
            .await?
        {
            Response::Entries { entries } => Ok(entries),
            other => Err(unexpected(other)),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        match self
            .call(Request::DeletePrefix {
                prefix: prefix.to_owned(),
            })
            .await?
        {
            Response::Deleted { count } => Ok(count),
            other => Err(unexpected(other)),
        }
    }
}
