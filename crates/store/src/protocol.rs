//! 와이어 프로토콜
//!
//! 양방향 모두 한 줄에 JSON 객체 하나입니다. 모든 요청은 같은 연결에서
//! 순서대로 정확히 하나의 응답을 받습니다.
//!
//! ```text
//! -> {"op":"hello","client_version":"0.1.0"}
//! <- {"kind":"hello","server_version":"0.1.0"}
//! -> {"op":"get","key":"test-key"}
//! <- {"kind":"value","value":null}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// 이 빌드의 서버와 클라이언트가 보고하는 버전
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 클라이언트가 허용하는 최소 서버 버전
pub const MIN_SERVER_VERSION: &str = "0.1.0";

/// 키/값 쌍
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// 클라이언트 → 서버 메시지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Hello { client_version: String },
    Get { key: String },
    Put { key: String, value: String },
    Range { prefix: String },
    DeletePrefix { prefix: String },
}

/// 서버 → 클라이언트 메시지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Hello { server_version: String },
    Value { value: Option<String> },
    Entries { entries: Vec<KeyValue> },
    Deleted { count: u64 },
    Error { message: String },
}

/// 메시지를 개행으로 끝나는 한 줄로 인코딩합니다.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, StoreError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// `server_version`이 [`MIN_SERVER_VERSION`] 이상인지 확인합니다.
pub fn check_server_version(server_version: &str) -> Result<semver::Version, StoreError> {
    let minimum = semver::Version::parse(MIN_SERVER_VERSION)
        .map_err(|e| StoreError::Handshake(format!("bad minimum version: {e}")))?;
    let server = semver::Version::parse(server_version).map_err(|e| {
        StoreError::Handshake(format!("unparseable server version '{server_version}': {e}"))
    })?;
    if server < minimum {
        return Err(StoreError::IncompatibleVersion {
            server: server.to_string(),
            minimum: minimum.to_string(),
        });
    }
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_format() {
        let line = encode_line(&Request::DeletePrefix {
            prefix: "/a/".to_owned(),
        })
        .unwrap();
        assert_eq!(line, "{\"op\":\"delete_prefix\",\"prefix\":\"/a/\"}\n");
    }

    #[test]
    fn response_wire_format() {
        let resp: Response = serde_json::from_str(r#"{"kind":"value","value":null}"#).unwrap();
        assert_eq!(resp, Response::Value { value: None });
        let resp: Response =
            serde_json::from_str(r#"{"kind":"deleted","count":3}"#).unwrap();
        assert_eq!(resp, Response::Deleted { count: 3 });
    }

    #[test]
    fn accepts_current_and_newer_servers() {
        check_server_version(PROTOCOL_VERSION).unwrap();
        check_server_version("9.0.0").unwrap();
    }

    #[test]
    fn rejects_older_server() {
        let err = check_server_version("0.0.9").unwrap_err();
        assert!(matches!(err, StoreError::IncompatibleVersion { .. }));
    }

    #[test]
    fn rejects_garbage_version() {
        let err = check_server_version("latest").unwrap_err();
        assert!(matches!(err, StoreError::Handshake(_)));
    }
}
