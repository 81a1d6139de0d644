//! TCP 세션 처리 (서버측)
//!
//! 연결 하나당 태스크 하나:
//! 요청 한 줄 읽기 → get/put 분기 → 파일 전체 전송 → 종료.
//! 파일과 연결은 세션이 단독 소유하며 어떤 경로로 끝나든 한 번만 닫힌다.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::message::{read_message, write_message, LengthHeader, Message, Request, TransferSpec};
use crate::storage::FileStore;
use crate::transfer::TransferEngine;
use crate::{Config, Error, Result};

/// 진행 중인 TCP 전송 상태
struct TcpTransferContext {
    connection: BufReader<TcpStream>,
    file: File,
    spec: TransferSpec,
    bytes_transferred: u64,
}

impl TcpTransferContext {
    /// 파일 → 연결. 길이와 다이제스트는 이미 헤더로 보냈으므로 해셔 없이 보낸다.
    async fn send(&mut self, engine: &TransferEngine) -> Result<()> {
        let outcome = engine
            .send_file(&mut self.file, &mut self.connection, None)
            .await?;
        self.bytes_transferred = outcome.bytes;

        if self.bytes_transferred != self.spec.length {
            warn!(
                "'{}': 헤더 길이 {} 와 보낸 바이트 {} 가 다름",
                self.spec.file_name, self.spec.length, self.bytes_transferred
            );
        }
        Ok(())
    }

    /// 연결 → 파일, 끝나면 `ok`
    async fn receive(&mut self, engine: &TransferEngine) -> Result<()> {
        let outcome = engine
            .receive_file(&mut self.connection, &mut self.file, self.spec.length, None)
            .await?;
        self.bytes_transferred = outcome.bytes;

        write_message(&mut self.connection, &Message::ok()).await?;

        if self.bytes_transferred < self.spec.length {
            return Err(Error::ShortTransfer {
                expected: self.spec.length,
                received: self.bytes_transferred,
            });
        }
        Ok(())
    }

    async fn close(mut self) {
        if let Err(e) = self.connection.shutdown().await {
            debug!("연결 종료 에러: {}", e);
        }
    }
}

/// 연결 하나의 요청/응답 처리기
pub struct TcpSession {
    connection: BufReader<TcpStream>,
    peer: SocketAddr,
    store: Arc<FileStore>,
    engine: TransferEngine,
}

impl TcpSession {
    pub fn new(stream: TcpStream, peer: SocketAddr, store: Arc<FileStore>, config: &Config) -> Self {
        Self {
            connection: BufReader::new(stream),
            peer,
            store,
            engine: TransferEngine::stream(config.chunk_size),
        }
    }

    /// 세션 실행. 에러는 이 연결에서 끝나고 로그만 남긴다.
    pub async fn run(self) {
        let peer = self.peer;
        match self.serve().await {
            Ok(()) => debug!("{}: 세션 종료", peer),
            Err(e) => warn!("{}: 세션 중단: {}", peer, e),
        }
    }

    async fn serve(mut self) -> Result<()> {
        // AwaitRequest
        let message = read_message(&mut self.connection).await?;

        let request = match Request::from_message(&message) {
            Ok(request) => request,
            Err(e) => {
                self.reply_error(&e).await;
                return Err(e);
            }
        };

        match request {
            Request::Get(spec) => self.handle_get(spec).await,
            Request::Put(spec) => self.handle_put(spec).await,
        }
    }

    async fn handle_get(mut self, mut spec: TransferSpec) -> Result<()> {
        info!("{}: Request for file '{}'", self.peer, spec.file_name);

        let (mut file, length) = match self.store.open_read(&spec.file_name).await {
            Ok(opened) => opened,
            Err(e) => {
                self.reply_error(&e).await;
                return Err(e);
            }
        };

        // 다이제스트는 검증 모드에서만 미리 계산
        if spec.verify {
            match self.store.digest(&mut file).await {
                Ok(digest) => spec.expected_hash = Some(digest),
                Err(e) => {
                    self.reply_error(&e).await;
                    return Err(e);
                }
            }
        }
        spec.length = length;

        let header = LengthHeader::new(length, spec.expected_hash.clone());
        write_message(&mut self.connection, &header.to_message()).await?;

        let mut context = TcpTransferContext {
            connection: self.connection,
            file,
            spec,
            bytes_transferred: 0,
        };
        let result = context.send(&self.engine).await;
        if result.is_ok() {
            info!(
                "{}: Transfer completed ('{}', {} bytes)",
                self.peer, context.spec.file_name, context.bytes_transferred
            );
        }
        context.close().await;
        result
    }

    async fn handle_put(mut self, spec: TransferSpec) -> Result<()> {
        info!(
            "{}: Receive file '{}' (length = {})",
            self.peer, spec.file_name, spec.length
        );

        let file = match self.store.open_write(&spec.file_name).await {
            Ok(file) => file,
            Err(e) => {
                self.reply_error(&e).await;
                return Err(e);
            }
        };

        write_message(&mut self.connection, &Message::ok()).await?;

        let mut context = TcpTransferContext {
            connection: self.connection,
            file,
            spec,
            bytes_transferred: 0,
        };
        let result = context.receive(&self.engine).await;
        if result.is_ok() {
            info!(
                "{}: Transfer completed ('{}', {} bytes)",
                self.peer, context.spec.file_name, context.bytes_transferred
            );
        }
        context.close().await;
        result
    }

    /// 응답 채널이 살아 있을 때 `error: <reason>` 전송
    async fn reply_error(&mut self, error: &Error) {
        let reply = Message::error(error.reason());
        if let Err(e) = write_message(&mut self.connection, &reply).await {
            debug!("{}: error 응답 실패: {}", self.peer, e);
        }
    }
}
