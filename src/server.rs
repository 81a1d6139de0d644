//! 서버
//!
//! 같은 포트에 TCP 리스너와 UDP 소켓을 바인딩한다.
//! - TCP: 연결마다 독립 태스크
//! - UDP: 세션 관리자 태스크 하나

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, UdpSocket};
use tracing::{info, warn};

use crate::storage::FileStore;
use crate::tcp::TcpSession;
use crate::udp::UdpSessionManager;
use crate::{Config, Error, Result};

/// 실행 중인 서버를 멈추는 핸들
#[derive(Debug, Clone)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
}

impl ServerHandle {
    /// 새 연결/요청 수락 중지. 이미 진행 중인 TCP 전송은 끝까지 간다.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub struct Server {
    config: Arc<Config>,
    store: Arc<FileStore>,
    listener: TcpListener,
    socket: Arc<UdpSocket>,
    running: Arc<AtomicBool>,
}

impl Server {
    /// 모든 인터페이스의 `config.port` 에 바인딩
    pub async fn bind(config: Config) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
        Self::bind_addr(config, addr).await
    }

    /// 지정 주소에 바인딩. 포트 0 이면 TCP 가 고른 포트를 UDP 도 쓴다.
    pub async fn bind_addr(config: Config, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let tcp_addr = listener.local_addr()?;

        let socket = UdpSocket::bind(tcp_addr)
            .await
            .map_err(|source| Error::Bind {
                addr: tcp_addr,
                source,
            })?;

        info!("Accepting TCP connections ({})", tcp_addr);
        info!("Accepting UDP connections ({})", tcp_addr);
        info!("Serving files from {:?}", config.root);

        Ok(Self {
            store: Arc::new(FileStore::new(config.root.clone())),
            config: Arc::new(config),
            listener,
            socket: Arc::new(socket),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            running: self.running.clone(),
        }
    }

    /// 멈출 때까지 실행
    pub async fn run(self) -> Result<()> {
        let manager = UdpSessionManager::new(
            self.socket.clone(),
            self.store.clone(),
            self.config.clone(),
        );
        let udp_task = tokio::spawn(manager.run(self.running.clone()));

        let poll_interval = self.config.poll_interval();
        while self.running.load(Ordering::SeqCst) {
            match tokio::time::timeout(poll_interval, self.listener.accept()).await {
                Ok(Ok((stream, peer))) => {
                    info!("Accepted connection from {}", peer);
                    let session = TcpSession::new(stream, peer, self.store.clone(), &self.config);
                    tokio::spawn(session.run());
                }
                Ok(Err(e)) => {
                    warn!("accept 에러: {}", e);
                }
                Err(_) => {
                    // 타임아웃, 계속
                }
            }
        }

        // 리스너는 여기서 닫힘
        drop(self.listener);
        if let Err(e) = udp_task.await {
            warn!("UDP 태스크 비정상 종료: {}", e);
        }

        info!("Server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpStream;

    fn local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_bind_conflict_is_bind_error() {
        let first = Server::bind_addr(Config::default(), local()).await.unwrap();
        let taken = first.local_addr().unwrap();

        let second = Server::bind_addr(Config::default(), taken).await;
        assert!(matches!(second, Err(Error::Bind { .. })));
    }

    #[tokio::test]
    async fn test_stop_closes_listener() {
        let server = Server::bind_addr(Config::default(), local()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        let task = tokio::spawn(server.run());

        assert!(TcpStream::connect(addr).await.is_ok());

        handle.stop();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!handle.is_running());
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
