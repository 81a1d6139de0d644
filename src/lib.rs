//! # LFP (Line Framed Protocol)
//!
//! TCP/UDP 공용 get/put 파일 전송 프로토콜
//!
//! ## 핵심 특징
//! - **한 줄 프레이밍**: 모든 제어 메시지는 `command[: parameter]\n`
//! - **TCP**: 연결당 요청 하나, 파일 전체를 스트림으로 전송
//! - **UDP**: 피어 주소별 세션, 청크마다 ACK 하는 stop-and-wait
//! - **검증 모드**: `-v` 로 MD5 다이제스트 비교
//! - **단일 전송 엔진**: 두 전송 계층이 같은 청크 루프를 공유

pub mod client;
pub mod config;
pub mod datagram;
pub mod digest;
pub mod error;
pub mod message;
pub mod server;
pub mod storage;
pub mod tcp;
pub mod transfer;
pub mod udp;

pub use client::{Checksum, Client, GetOutcome, PutOutcome, Transport};
pub use config::Config;
pub use datagram::DatagramStream;
pub use digest::ContentHasher;
pub use error::{Error, Result};
pub use message::{Ack, LengthHeader, Message, Request, TransferSpec};
pub use server::{Server, ServerHandle};
pub use storage::FileStore;
pub use transfer::{FlowControl, TransferEngine, TransferOutcome};
pub use udp::{Direction, UdpSession, UdpSessionManager};

/// 청크 크기 (바이트). 다른 구현과의 상호운용을 위해 고정.
pub const CHUNK_SIZE: usize = 1024;

/// 기본 포트
pub const DEFAULT_PORT: u16 = 8081;
