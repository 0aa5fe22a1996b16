//! 참조 스토어 서버
//!
//! Unix 소켓 연결을 받아 공유 [`MemoryStore`]로 프로토콜 요청에 응답합니다.
//! 종료 토큰이 취소될 때까지 실행됩니다.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::protocol::{Request, Response, encode_line};

/// `socket`에 리스너를 바인드합니다. 남아 있던 소켓 파일은 교체됩니다.
pub fn bind(socket: &Path) -> Result<UnixListener, StoreError> {
    match std::fs::remove_file(socket) {
        Ok(()) => debug!(socket = %socket.display(), "removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(UnixListener::bind(socket)?)
}

/// `shutdown`이 취소될 때까지 연결을 처리합니다.
pub async fn serve(
    listener: UnixListener,
    store: Arc<MemoryStore>,
    shutdown: CancellationToken,
) -> Result<(), StoreError> {
    info!("metadata store listening");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("metadata store shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let store = Arc::clone(&store);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, store, shutdown).await {
                                warn!(error = %e, "connection error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    store: Arc<MemoryStore>,
    shutdown: CancellationToken,
) -> Result<(), StoreError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("client disconnected");
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                debug!(?request, "request");
                store.handle(request).await
            }
            Err(e) => Response::Error {
                message: format!("malformed request: {e}"),
            },
        };
        writer.write_all(encode_line(&response)?.as_bytes()).await?;
    }
}
