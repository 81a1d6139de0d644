//! 전송 엔진
//!
//! - 파일을 고정 크기 청크로 채널에 흘려보내거나 채널에서 받아 파일에 쓴다
//! - 선택적으로 다이제스트를 같이 누적한다
//! - TCP 는 `FlowControl::Stream`, UDP 는 `FlowControl::StopAndWait` 로 같은 루프를 쓴다

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::digest::ContentHasher;
use crate::message::{Ack, Message, CMD_ERROR};
use crate::{Error, Result};

/// 흐름 제어 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    /// 전송 계층이 순서와 도착을 보장 (TCP)
    Stream,

    /// 청크마다 ACK 하나, 전송 중인 청크는 항상 하나 (UDP)
    StopAndWait { ack: Ack, timeout: Duration },
}

/// 전송 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// 실제로 옮긴 바이트 수
    pub bytes: u64,

    /// 해셔를 넘긴 경우의 hex 다이제스트
    pub digest: Option<String>,
}

/// 파일 ↔ 채널 청크 전송기
#[derive(Debug, Clone)]
pub struct TransferEngine {
    chunk_size: usize,
    flow: FlowControl,
}

impl TransferEngine {
    pub fn new(chunk_size: usize, flow: FlowControl) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            flow,
        }
    }

    pub fn stream(chunk_size: usize) -> Self {
        Self::new(chunk_size, FlowControl::Stream)
    }

    pub fn stop_and_wait(chunk_size: usize, ack: Ack, timeout: Duration) -> Self {
        Self::new(chunk_size, FlowControl::StopAndWait { ack, timeout })
    }

    /// 파일 끝까지 청크 단위로 전송
    ///
    /// stop-and-wait 에서는 청크를 보낸 뒤 ACK 를 받아야 다음 청크를 보낸다.
    pub async fn send_file<R, S>(
        &self,
        file: &mut R,
        sink: &mut S,
        mut hasher: Option<ContentHasher>,
    ) -> Result<TransferOutcome>
    where
        R: AsyncRead + Unpin,
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; self.chunk_size];
        let mut sent = 0u64;

        loop {
            let n = read_chunk(file, &mut buf).await?;
            if n == 0 {
                break;
            }

            sink.write_all(&buf[..n]).await?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&buf[..n]);
            }
            sent += n as u64;

            if let FlowControl::StopAndWait { ack, timeout } = self.flow {
                self.await_ack(sink, ack, timeout).await?;
            }
        }

        sink.flush().await?;
        debug!("send_file: {} bytes", sent);

        Ok(TransferOutcome {
            bytes: sent,
            digest: hasher.map(ContentHasher::finalize_hex),
        })
    }

    /// 선언된 길이만큼 받거나 채널이 먼저 끝날 때까지 수신
    ///
    /// 스트림에서는 남은 길이보다 많이 읽지 않는다. 뒤따르는 메시지를 삼키지 않기 위함.
    pub async fn receive_file<S, W>(
        &self,
        source: &mut S,
        file: &mut W,
        total_length: u64,
        mut hasher: Option<ContentHasher>,
    ) -> Result<TransferOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; self.chunk_size];
        let mut received = 0u64;

        while received < total_length {
            let remaining = total_length - received;
            let want = match self.flow {
                FlowControl::Stream => remaining.min(self.chunk_size as u64) as usize,
                FlowControl::StopAndWait { .. } => self.chunk_size,
            };

            let read = source.read(&mut buf[..want]);
            let n = match self.flow {
                FlowControl::Stream => read.await?,
                FlowControl::StopAndWait { timeout, .. } => tokio::time::timeout(timeout, read)
                    .await
                    .map_err(|_| Error::Timeout(format!("{}ms 동안 청크 없음", timeout.as_millis())))??,
            };

            if n == 0 {
                debug!("receive_file: 채널 조기 종료 ({}/{})", received, total_length);
                break;
            }

            if n as u64 > remaining {
                return Err(Error::ProtocolViolation(format!(
                    "청크 {} bytes 가 남은 길이 {} 초과",
                    n, remaining
                )));
            }

            file.write_all(&buf[..n]).await?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&buf[..n]);
            }
            received += n as u64;

            if let FlowControl::StopAndWait { ack, .. } = self.flow {
                source.write_all(ack.token().as_bytes()).await?;
            }
        }

        file.flush().await?;

        Ok(TransferOutcome {
            bytes: received,
            digest: hasher.map(ContentHasher::finalize_hex),
        })
    }

    /// 기대하는 ACK 가 올 때까지 대기
    ///
    /// `error` 메시지는 원격 에러로 끝내고, 그 밖의 데이터그램은 무시한다.
    async fn await_ack<S>(&self, channel: &mut S, expected: Ack, timeout: Duration) -> Result<()>
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            let n = tokio::time::timeout(timeout, channel.read(&mut buf))
                .await
                .map_err(|_| Error::Timeout(format!("{} 대기", expected.token())))??;

            if n == 0 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} 전에 채널 종료", expected.token()),
                )));
            }

            let data = &buf[..n];
            if Ack::from_datagram(data) == Some(expected) {
                return Ok(());
            }

            match Message::from_datagram(data) {
                Ok(message) if message.is(CMD_ERROR) => {
                    return Err(Error::Remote(message.parameter));
                }
                _ => warn!(
                    "{} 대신 예상하지 못한 데이터그램 ({} bytes), 무시",
                    expected.token(),
                    n
                ),
            }
        }
    }
}

/// 버퍼가 가득 차거나 EOF 일 때까지 읽기
///
/// 파일 중간에서 짧은 read 가 짧은 청크가 되지 않도록 한다.
pub async fn read_chunk<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
