//! 클라이언트 (get/put 요청자)
//!
//! 요청을 보내고 응답 헤더를 읽은 뒤 나머지는 전송 엔진에 맡긴다.
//! UDP 에서는 청크마다 ACK 를 주고받는다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::datagram::DatagramStream;
use crate::digest::ContentHasher;
use crate::message::{
    read_message, write_message, Ack, LengthHeader, Message, Request, TransferSpec, CMD_ERROR,
    CMD_LENGTH, CMD_OK,
};
use crate::transfer::{TransferEngine, TransferOutcome};
use crate::{Config, Error, Result};

/// 전송 계층
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

/// 다운로드 검증 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    /// `-v` 없이 받음
    NotRequested,

    /// 서버 다이제스트와 일치
    Match(String),

    /// 데이터 손상. 전송 자체는 끝난 것으로 본다.
    Mismatch { expected: String, actual: String },

    /// 서버가 다이제스트를 보내지 않음
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    pub checksum: Checksum,
}

impl GetOutcome {
    /// 체크섬 불일치를 에러로 바꿈
    pub fn verify(&self) -> Result<()> {
        match &self.checksum {
            Checksum::Mismatch { expected, actual } => Err(Error::ChecksumMismatch {
                expected: expected.clone(),
                actual: actual.clone(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub file_name: String,
    pub bytes: u64,
}

/// 연결 하나
enum Connection {
    Tcp(BufReader<TcpStream>),
    Udp(DatagramStream),
}

impl Connection {
    async fn send(&mut self, message: &Message) -> Result<()> {
        match self {
            Connection::Tcp(stream) => write_message(stream, message).await,
            Connection::Udp(stream) => stream.send(message.encode().as_bytes()).await,
        }
    }

    /// 응답 메시지 하나. UDP 는 데이터그램 하나가 메시지 하나.
    async fn recv(&mut self, timeout: Duration) -> Result<Message> {
        match self {
            Connection::Tcp(stream) => read_message(stream).await,
            Connection::Udp(stream) => {
                let mut buf = vec![0u8; 2048];
                let n = tokio::time::timeout(timeout, stream.recv(&mut buf))
                    .await
                    .map_err(|_| Error::Timeout("서버 응답 없음".into()))??;
                Message::from_datagram(&buf[..n])
            }
        }
    }
}

pub struct Client {
    config: Config,
    host: String,
    transport: Transport,
}

impl Client {
    /// `config.port` 를 서버 포트로 사용
    pub fn new(config: Config, host: impl Into<String>, transport: Transport) -> Self {
        Self {
            config,
            host: host.into(),
            transport,
        }
    }

    async fn connect(&self) -> Result<Connection> {
        let port = self.config.port;
        info!(
            "Connecting to {}:{} ({:?})",
            self.host, port, self.transport
        );

        match self.transport {
            Transport::Tcp => {
                let connect = TcpStream::connect((self.host.as_str(), port));
                let stream = tokio::time::timeout(self.config.connect_timeout(), connect)
                    .await
                    .map_err(|_| Error::Timeout(format!("{}:{} 연결", self.host, port)))??;
                Ok(Connection::Tcp(BufReader::new(stream)))
            }
            Transport::Udp => Ok(Connection::Udp(
                DatagramStream::connect(&self.host, port).await?,
            )),
        }
    }

    fn engine(&self, ack: Ack) -> TransferEngine {
        match self.transport {
            Transport::Tcp => TransferEngine::stream(self.config.chunk_size),
            Transport::Udp => {
                TransferEngine::stop_and_wait(self.config.chunk_size, ack, self.config.ack_timeout())
            }
        }
    }

    /// 서버의 `file_name` 을 `dest` 로 다운로드
    pub async fn get(&self, file_name: &str, dest: &Path, verify: bool) -> Result<GetOutcome> {
        let mut conn = self.connect().await?;

        let request = Request::Get(TransferSpec::get(file_name, verify));
        conn.send(&request.to_message()).await?;

        let reply = conn.recv(self.config.ack_timeout()).await?;
        let header = match reply.command.as_str() {
            CMD_LENGTH => LengthHeader::parse(&reply.parameter)?,
            CMD_ERROR => return Err(Error::Remote(reply.parameter)),
            other => {
                return Err(Error::Framing(format!(
                    "예상하지 못한 메시지 타입 '{}'",
                    other
                )))
            }
        };

        info!("Status OK, starting transfer of {} bytes", header.length);

        let mut file = File::create(dest).await.map_err(|source| Error::FileAccess {
            path: dest.to_path_buf(),
            source,
        })?;

        let engine = self.engine(Ack::Get);
        let hasher = verify.then(ContentHasher::new);
        let outcome = match &mut conn {
            Connection::Tcp(stream) => {
                engine
                    .receive_file(stream, &mut file, header.length, hasher)
                    .await?
            }
            Connection::Udp(stream) => {
                engine
                    .receive_file(stream, &mut file, header.length, hasher)
                    .await?
            }
        };

        if outcome.bytes < header.length {
            return Err(Error::ShortTransfer {
                expected: header.length,
                received: outcome.bytes,
            });
        }

        let checksum = compare_digest(verify, header.digest, outcome.digest);
        info!("Transfer complete ({} bytes)", outcome.bytes);

        Ok(GetOutcome {
            path: dest.to_path_buf(),
            bytes: outcome.bytes,
            checksum,
        })
    }

    /// 로컬 파일을 서버에 같은 이름(기본 이름)으로 업로드
    pub async fn put(&self, source: &Path) -> Result<PutOutcome> {
        let access = |source_err| Error::FileAccess {
            path: source.to_path_buf(),
            source: source_err,
        };

        let file_name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                access(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "파일 이름이 없음",
                ))
            })?
            .to_owned();

        let mut file = File::open(source).await.map_err(access)?;
        let length = file.metadata().await.map_err(access)?.len();

        let mut conn = self.connect().await?;
        let request = Request::Put(TransferSpec::put(file_name.as_str(), length));
        conn.send(&request.to_message()).await?;

        let engine = self.engine(Ack::Put);
        let outcome: TransferOutcome = match &mut conn {
            Connection::Tcp(stream) => {
                expect_ok(read_message(stream).await?)?;
                info!("Status OK, starting transfer of {} bytes", length);

                let outcome = engine.send_file(&mut file, stream, None).await?;

                // 서버가 다 받았다는 확인
                expect_ok(read_message(stream).await?)?;
                outcome
            }
            Connection::Udp(stream) => {
                // UDP 에는 ok 헤더가 없고 첫 데이터그램이 곧 시작
                engine.send_file(&mut file, stream, None).await?
            }
        };

        if outcome.bytes != length {
            debug!("파일 크기 변경: 선언 {} / 전송 {}", length, outcome.bytes);
            return Err(Error::ShortTransfer {
                expected: length,
                received: outcome.bytes,
            });
        }

        info!("Transfer complete ({} bytes)", outcome.bytes);
        Ok(PutOutcome {
            file_name,
            bytes: outcome.bytes,
        })
    }
}

fn expect_ok(message: Message) -> Result<()> {
    match message.command.as_str() {
        CMD_OK => Ok(()),
        CMD_ERROR => Err(Error::Remote(message.parameter)),
        other => Err(Error::Framing(format!(
            "예상하지 못한 메시지 타입 '{}'",
            other
        ))),
    }
}

fn compare_digest(verify: bool, expected: Option<String>, actual: Option<String>) -> Checksum {
    if !verify {
        return Checksum::NotRequested;
    }

    match (expected, actual) {
        (Some(expected), Some(actual)) if expected.is_empty() || actual.is_empty() => {
            Checksum::Unavailable
        }
        (Some(expected), Some(actual)) if expected == actual => Checksum::Match(actual),
        (Some(expected), Some(actual)) => Checksum::Mismatch { expected, actual },
        _ => Checksum::Unavailable,
    }
}
