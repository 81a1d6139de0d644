//! UDP 세션 관리자 (서버측)
//!
//! - 수신 루프 하나가 피어 주소 → 세션 맵을 단독 소유
//! - 세션 상태는 이 루프에서만 바뀌므로 락이 필요 없음
//! - 피어마다 전송 중인 청크는 항상 하나 (stop-and-wait)

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::message::{Ack, LengthHeader, Message, Request, TransferSpec};
use crate::storage::FileStore;
use crate::transfer::read_chunk;
use crate::{Config, Error, Result};

/// 세션 방향 (서버 기준)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// get: 서버가 청크를 보내고 `get-ack` 를 기다림
    Send,

    /// put: 서버가 청크를 받고 `put-ack` 로 응답
    Receive,
}

/// 피어 하나의 진행 중인 전송
#[derive(Debug)]
pub struct UdpSession {
    direction: Direction,
    file: File,
    spec: TransferSpec,

    /// 남은 바이트. 0 을 넘어 줄어들 수 없다.
    remaining: u64,
}

impl UdpSession {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn file_name(&self) -> &str {
        &self.spec.file_name
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    /// 다음 청크 읽기 (Send 방향)
    async fn next_chunk(&mut self, chunk_size: usize) -> Result<Option<Bytes>> {
        let want = self.remaining.min(chunk_size as u64) as usize;
        if want == 0 {
            return Ok(None);
        }

        let mut buf = vec![0u8; want];
        let n = read_chunk(&mut self.file, &mut buf).await?;
        if n == 0 {
            return Err(Error::ShortTransfer {
                expected: self.spec.length,
                received: self.spec.length - self.remaining,
            });
        }

        buf.truncate(n);
        self.remaining -= n as u64;
        Ok(Some(Bytes::from(buf)))
    }

    /// 받은 청크 쓰기 (Receive 방향)
    async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        if data.len() as u64 > self.remaining {
            return Err(Error::ProtocolViolation(format!(
                "청크 {} bytes 가 남은 길이 {} 초과",
                data.len(),
                self.remaining
            )));
        }

        self.file.write_all(data).await?;
        self.file.flush().await?;
        self.remaining -= data.len() as u64;
        Ok(())
    }
}

/// 데이터그램 역다중화 루프
///
/// Send 세션은 마지막 청크를 보낸 뒤에도 `remaining == 0` 으로 맵에 남아
/// 마지막 `get-ack` 를 기다린다. 유휴 타임아웃이 없으므로 그 ACK 가 유실되면
/// 세션과 열린 파일은 해제되지 않는다.
pub struct UdpSessionManager {
    socket: Arc<UdpSocket>,
    store: Arc<FileStore>,
    config: Arc<Config>,
    sessions: HashMap<SocketAddr, UdpSession>,
}

impl UdpSessionManager {
    pub fn new(socket: Arc<UdpSocket>, store: Arc<FileStore>, config: Arc<Config>) -> Self {
        Self {
            socket,
            store,
            config,
            sessions: HashMap::new(),
        }
    }

    pub fn session(&self, peer: &SocketAddr) -> Option<&UdpSession> {
        self.sessions.get(peer)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// `running` 이 false 가 될 때까지 수신 루프 실행
    pub async fn run(mut self, running: Arc<AtomicBool>) {
        let mut buf = vec![0u8; self.config.recv_buffer_size];
        let poll_interval = self.config.poll_interval();

        while running.load(Ordering::SeqCst) {
            match tokio::time::timeout(poll_interval, self.socket.recv_from(&mut buf)).await {
                Ok(Ok((len, peer))) => {
                    if let Err(e) = self.handle_datagram(&buf[..len], peer).await {
                        warn!("{}: 데이터그램 처리 에러: {}", peer, e);
                    }
                }
                Ok(Err(e)) => {
                    warn!("수신 에러: {}", e);
                }
                Err(_) => {
                    // 타임아웃, 계속
                }
            }
        }

        info!("UDP session manager stopped ({} open sessions)", self.sessions.len());
    }

    /// 데이터그램 하나 처리
    ///
    /// 에러가 나도 세션은 이전 상태 그대로 두거나(프로토콜 위반) 제거한다(I/O 실패).
    pub async fn handle_datagram(&mut self, data: &[u8], peer: SocketAddr) -> Result<()> {
        let Some(direction) = self.sessions.get(&peer).map(UdpSession::direction) else {
            return self.handle_request(data, peer).await;
        };

        match direction {
            Direction::Send => self.handle_ack(data, peer).await,
            Direction::Receive => self.handle_chunk(data, peer).await,
        }
    }

    /// 세션이 없는 피어: 요청 한 줄
    async fn handle_request(&mut self, data: &[u8], peer: SocketAddr) -> Result<()> {
        if Ack::from_datagram(data).is_some() {
            debug!("{}: 세션 없는 ACK 무시", peer);
            return Ok(());
        }

        let message = Message::from_datagram(data)?;
        let request = match Request::from_message(&message) {
            Ok(request) => request,
            Err(e) => {
                self.reply(&Message::error(e.reason()), peer).await;
                return Err(e);
            }
        };

        let session = match self.open_session(request).await {
            Ok(session) => session,
            Err(e) => {
                self.reply(&Message::error(e.reason()), peer).await;
                return Err(e);
            }
        };

        match session.direction {
            Direction::Send => {
                info!("{}: Request for file '{}' (UDP)", peer, session.file_name());
                let header = LengthHeader::new(session.spec.length, session.spec.expected_hash.clone());
                self.socket
                    .send_to(header.to_message().encode().as_bytes(), peer)
                    .await?;

                self.sessions.insert(peer, session);
                self.send_next_chunk(peer).await
            }
            Direction::Receive => {
                info!(
                    "{}: Receiving file '{}' (UDP, length = {})",
                    peer,
                    session.file_name(),
                    session.remaining
                );
                if session.is_complete() {
                    info!("{}: Transfer completed ('{}', 0 bytes)", peer, session.file_name());
                } else {
                    self.sessions.insert(peer, session);
                }
                Ok(())
            }
        }
    }

    async fn open_session(&self, request: Request) -> Result<UdpSession> {
        match request {
            Request::Get(mut spec) => {
                let (mut file, length) = self.store.open_read(&spec.file_name).await?;
                if spec.verify {
                    spec.expected_hash = Some(self.store.digest(&mut file).await?);
                }
                spec.length = length;

                Ok(UdpSession {
                    direction: Direction::Send,
                    file,
                    remaining: length,
                    spec,
                })
            }
            Request::Put(spec) => {
                let file = self.store.open_write(&spec.file_name).await?;

                Ok(UdpSession {
                    direction: Direction::Receive,
                    file,
                    remaining: spec.length,
                    spec,
                })
            }
        }
    }

    /// Send 세션: `get-ack` 만 다음 청크를 진행시킨다
    async fn handle_ack(&mut self, data: &[u8], peer: SocketAddr) -> Result<()> {
        if Ack::from_datagram(data) != Some(Ack::Get) {
            return Err(Error::ProtocolViolation(format!(
                "{} 를 기대했으나 {} bytes 데이터그램 수신",
                Ack::Get.token(),
                data.len()
            )));
        }

        self.send_next_chunk(peer).await
    }

    /// 다음 청크 전송, 남은 바이트가 없으면 세션 종료
    async fn send_next_chunk(&mut self, peer: SocketAddr) -> Result<()> {
        let chunk_size = self.config.chunk_size;
        let Some(session) = self.sessions.get_mut(&peer) else {
            return Ok(());
        };

        let chunk = match session.next_chunk(chunk_size).await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                self.complete(peer);
                return Ok(());
            }
            Err(e) => {
                self.sessions.remove(&peer);
                return Err(e);
            }
        };

        if let Err(e) = self.socket.send_to(&chunk, peer).await {
            self.sessions.remove(&peer);
            return Err(e.into());
        }
        Ok(())
    }

    /// Receive 세션: 데이터 청크 쓰고 `put-ack`
    async fn handle_chunk(&mut self, data: &[u8], peer: SocketAddr) -> Result<()> {
        let Some(session) = self.sessions.get_mut(&peer) else {
            return Ok(());
        };

        match session.write_chunk(data).await {
            Ok(()) => {}
            Err(e @ Error::ProtocolViolation(_)) => return Err(e),
            Err(e) => {
                self.sessions.remove(&peer);
                return Err(e);
            }
        }
        let complete = session.is_complete();

        self.socket
            .send_to(Ack::Put.token().as_bytes(), peer)
            .await?;

        if complete {
            self.complete(peer);
        }
        Ok(())
    }

    fn complete(&mut self, peer: SocketAddr) {
        if let Some(session) = self.sessions.remove(&peer) {
            info!(
                "{}: Transfer completed ('{}', {} bytes, UDP)",
                peer,
                session.file_name(),
                session.spec.length
            );
        }
    }

    async fn reply(&self, message: &Message, peer: SocketAddr) {
        if let Err(e) = self.socket.send_to(message.encode().as_bytes(), peer).await {
            debug!("{}: 응답 실패: {}", peer, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::ContentHasher;
    use std::time::Duration;

    struct Harness {
        manager: UdpSessionManager,
        client: UdpSocket,
        client_addr: SocketAddr,
        dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(socket.local_addr().unwrap()).await.unwrap();
        let client_addr = client.local_addr().unwrap();

        let manager = UdpSessionManager::new(
            socket,
            Arc::new(FileStore::new(dir.path())),
            Arc::new(Config::default()),
        );

        Harness {
            manager,
            client,
            client_addr,
            dir,
        }
    }

    async fn recv(client: &UdpSocket) -> Vec<u8> {
        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(Duration::from_secs(5), client.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        buf.truncate(n);
        buf
    }

    async fn nothing_pending(client: &UdpSocket) -> bool {
        let mut buf = [0u8; 16];
        tokio::time::timeout(Duration::from_millis(50), client.recv(&mut buf))
            .await
            .is_err()
    }

    #[tokio::test]
    async fn test_put_single_chunk() {
        let mut h = harness().await;

        h.manager
            .handle_datagram(b"put: notes.txt 10\n", h.client_addr)
            .await
            .unwrap();
        let session = h.manager.session(&h.client_addr).unwrap();
        assert_eq!(session.direction(), Direction::Receive);
        assert_eq!(session.remaining(), 10);
        // UDP put 에는 ok 헤더가 없음
        assert!(nothing_pending(&h.client).await);

        h.manager
            .handle_datagram(b"helloworld", h.client_addr)
            .await
            .unwrap();

        assert_eq!(recv(&h.client).await, b"put-ack");
        assert!(h.manager.session(&h.client_addr).is_none());
        assert_eq!(
            std::fs::read(h.dir.path().join("notes.txt")).unwrap(),
            b"helloworld"
        );
    }

    #[tokio::test]
    async fn test_datagram_after_completion_starts_fresh() {
        let mut h = harness().await;

        h.manager
            .handle_datagram(b"put: a.txt 3", h.client_addr)
            .await
            .unwrap();
        h.manager.handle_datagram(b"abc", h.client_addr).await.unwrap();
        assert_eq!(recv(&h.client).await, b"put-ack");
        assert_eq!(h.manager.session_count(), 0);

        // 끝난 세션을 이어가지 않고 새 요청으로 해석
        let result = h.manager.handle_datagram(b"xyz", h.client_addr).await;
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
        let reply = Message::from_datagram(&recv(&h.client).await).unwrap();
        assert!(reply.is("error"));

        assert_eq!(h.manager.session_count(), 0);
        assert_eq!(std::fs::read(h.dir.path().join("a.txt")).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_get_waits_for_final_ack_before_closing() {
        let mut h = harness().await;
        std::fs::write(h.dir.path().join("small.txt"), b"tiny").unwrap();

        h.manager
            .handle_datagram(b"get: small.txt", h.client_addr)
            .await
            .unwrap();
        assert_eq!(
            Message::from_datagram(&recv(&h.client).await).unwrap(),
            Message::new("length", "4")
        );
        assert_eq!(recv(&h.client).await, b"tiny");

        // 모든 바이트를 보냈어도 ACK 전까지는 세션 유지
        assert_eq!(h.manager.session(&h.client_addr).unwrap().remaining(), 0);

        h.manager.handle_datagram(b"get-ack", h.client_addr).await.unwrap();
        assert!(h.manager.session(&h.client_addr).is_none());
        assert!(nothing_pending(&h.client).await);
    }

    #[tokio::test]
    async fn test_put_oversized_chunk_is_rejected() {
        let mut h = harness().await;

        h.manager
            .handle_datagram(b"put: notes.txt 4", h.client_addr)
            .await
            .unwrap();

        let result = h.manager.handle_datagram(b"helloworld", h.client_addr).await;
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));

        // 세션은 그대로, ACK 없음
        assert_eq!(h.manager.session(&h.client_addr).unwrap().remaining(), 4);
        assert!(nothing_pending(&h.client).await);

        h.manager.handle_datagram(b"hell", h.client_addr).await.unwrap();
        assert_eq!(recv(&h.client).await, b"put-ack");
        assert_eq!(h.manager.session_count(), 0);
    }

    #[tokio::test]
    async fn test_get_stop_and_wait() {
        let mut h = harness().await;
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 253) as u8).collect();
        std::fs::write(h.dir.path().join("report.txt"), &data).unwrap();

        h.manager
            .handle_datagram(b"get: report.txt -v\n", h.client_addr)
            .await
            .unwrap();

        let header = Message::from_datagram(&recv(&h.client).await).unwrap();
        assert_eq!(
            header,
            Message::new("length", format!("2500 {}", ContentHasher::digest(&data)))
        );

        let mut received = recv(&h.client).await;
        assert_eq!(received.len(), 1024);
        assert_eq!(h.manager.session(&h.client_addr).unwrap().remaining(), 1476);

        // ACK 없이는 다음 청크 없음
        assert!(nothing_pending(&h.client).await);

        while h.manager.session(&h.client_addr).is_some() {
            h.manager.handle_datagram(b"get-ack", h.client_addr).await.unwrap();
            // 마지막 청크 뒤의 ACK 는 세션만 닫는다
            if h.manager.session(&h.client_addr).is_some() {
                received.extend(recv(&h.client).await);
            }
        }

        assert_eq!(received, data);
        assert_eq!(h.manager.session_count(), 0);
        assert!(nothing_pending(&h.client).await);
    }

    #[tokio::test]
    async fn test_get_wrong_ack_leaves_session() {
        let mut h = harness().await;
        std::fs::write(h.dir.path().join("a.bin"), vec![1u8; 2048]).unwrap();

        h.manager.handle_datagram(b"get: a.bin", h.client_addr).await.unwrap();
        recv(&h.client).await; // header
        recv(&h.client).await; // chunk 1

        let result = h.manager.handle_datagram(b"put-ack", h.client_addr).await;
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
        assert_eq!(h.manager.session(&h.client_addr).unwrap().remaining(), 1024);
        assert!(nothing_pending(&h.client).await);
    }

    #[tokio::test]
    async fn test_get_missing_file_replies_error() {
        let mut h = harness().await;

        let result = h.manager.handle_datagram(b"get: nope.txt", h.client_addr).await;
        assert!(matches!(result, Err(Error::FileAccess { .. })));

        let reply = Message::from_datagram(&recv(&h.client).await).unwrap();
        assert_eq!(reply.command, "error");
        assert_eq!(h.manager.session_count(), 0);
    }

    #[tokio::test]
    async fn test_get_empty_file_completes_immediately() {
        let mut h = harness().await;
        std::fs::write(h.dir.path().join("empty"), b"").unwrap();

        h.manager.handle_datagram(b"get: empty", h.client_addr).await.unwrap();

        assert_eq!(recv(&h.client).await, b"length: 0\n");
        assert_eq!(h.manager.session_count(), 0);
    }

    #[tokio::test]
    async fn test_garbage_from_new_peer() {
        let mut h = harness().await;

        assert!(matches!(
            h.manager.handle_datagram(&[0xff, 0x00], h.client_addr).await,
            Err(Error::Framing(_))
        ));
        assert!(nothing_pending(&h.client).await);

        // 세션 없는 ACK 는 조용히 무시
        h.manager.handle_datagram(b"get-ack", h.client_addr).await.unwrap();
        assert!(nothing_pending(&h.client).await);

        assert!(h.manager.handle_datagram(b"list", h.client_addr).await.is_err());
        assert!(String::from_utf8(recv(&h.client).await).unwrap().starts_with("error: "));
    }

    #[tokio::test]
    async fn test_peers_are_independent() {
        let mut h = harness().await;
        let other = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let other_addr = other.local_addr().unwrap();

        h.manager.handle_datagram(b"put: a.txt 3", h.client_addr).await.unwrap();
        h.manager.handle_datagram(b"put: b.txt 3", other_addr).await.unwrap();
        assert_eq!(h.manager.session_count(), 2);

        h.manager.handle_datagram(b"bbb", other_addr).await.unwrap();
        assert_eq!(h.manager.session_count(), 1);
        assert_eq!(h.manager.session(&h.client_addr).unwrap().remaining(), 3);

        h.manager.handle_datagram(b"aaa", h.client_addr).await.unwrap();
        assert_eq!(h.manager.session_count(), 0);
        assert_eq!(std::fs::read(h.dir.path().join("a.txt")).unwrap(), b"aaa");
        assert_eq!(std::fs::read(h.dir.path().join("b.txt")).unwrap(), b"bbb");
    }
}
