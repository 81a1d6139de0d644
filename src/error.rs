//! 에러 타입 정의

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// LFP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 서버 소켓 바인딩 실패 (서버 프로세스에 치명적인 유일한 에러)
    #[error("바인딩 실패: {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// 메시지 라인이 없거나 잘못됨
    #[error("프레이밍 에러: {0}")]
    Framing(String),

    #[error("파일 접근 실패: {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 예상하지 못한 명령, 잘못된 ACK 토큰, 남은 길이를 넘는 청크
    #[error("프로토콜 위반: {0}")]
    ProtocolViolation(String),

    #[error("전송 미완료: expected {expected} bytes, got {received} bytes")]
    ShortTransfer { expected: u64, received: u64 },

    #[error("체크섬 불일치: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// 상대방이 보낸 `error` 메시지
    #[error("원격 에러: {0}")]
    Remote(String),

    #[error("타임아웃: {0}")]
    Timeout(String),
}

impl Error {
    /// 상대방에게 `error: <reason>` 으로 보낼 사유
    pub fn reason(&self) -> String {
        match self {
            Error::FileAccess { source, .. } => source.to_string(),
            Error::ProtocolViolation(msg) | Error::Framing(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
