//! 프로토콜 설정

use std::path::PathBuf;
use std::time::Duration;

use crate::{CHUNK_SIZE, DEFAULT_PORT};

/// LFP 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 청크 크기 (바이트)
    /// 다른 구현과 상호운용하려면 1024 고정
    pub chunk_size: usize,

    /// 서버 포트 (TCP/UDP 공용)
    pub port: u16,

    /// 서버 파일 루트 디렉터리
    pub root: PathBuf,

    /// TCP 연결 타임아웃 (밀리초)
    pub connect_timeout_ms: u64,

    /// UDP ACK/청크 대기 타임아웃 (밀리초)
    pub ack_timeout_ms: u64,

    /// accept/recv 루프가 종료 플래그를 확인하는 주기 (밀리초)
    pub poll_interval_ms: u64,

    /// UDP 수신 버퍼 크기
    pub recv_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            port: DEFAULT_PORT,
            root: PathBuf::from("."),
            connect_timeout_ms: 5000,     // 5초
            ack_timeout_ms: 5000,         // 5초
            poll_interval_ms: 10,         // 10ms
            recv_buffer_size: 64 * 1024,  // 64KB
        }
    }
}

impl Config {
    /// 지정한 루트 디렉터리를 사용하는 설정
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정 (긴 타임아웃)
    ///
    /// 재전송이 없으므로 타임아웃만 늘린다.
    pub fn lossy_network() -> Self {
        Self {
            connect_timeout_ms: 15000,
            ack_timeout_ms: 15000,
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
