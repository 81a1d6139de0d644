//! 연결된 UDP 소켓을 바이트 채널로 감싼 것
//!
//! 한 번의 read 는 데이터그램 하나, 한 번의 write 는 데이터그램 하나에 대응한다.
//! 전송 엔진이 TCP 스트림과 같은 인터페이스로 UDP 를 다룰 수 있게 해준다.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{lookup_host, UdpSocket};
use tracing::debug;

use crate::{Error, Result};

/// 상대 주소 하나에 연결된 UDP 소켓
#[derive(Debug)]
pub struct DatagramStream {
    socket: UdpSocket,
}

impl DatagramStream {
    /// 임의 로컬 포트로 바인딩 후 원격 주소에 연결
    ///
    /// 이름이 여러 주소로 풀리면 IPv4 부터 차례로 시도한다.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let mut addrs: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();
        prefer_ipv4(&mut addrs);

        let mut last_err = None;
        for remote in addrs {
            match Self::connect_addr(remote).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("{}: UDP 연결 실패: {}", remote, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("주소를 찾을 수 없음: {}:{}", host, port),
            ))
        }))
    }

    pub async fn connect_addr(remote: SocketAddr) -> Result<Self> {
        let local: SocketAddr = match remote {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.peer_addr()?)
    }

    pub async fn send(&self, data: &[u8]) -> Result<()> {
        self.socket.send(data).await?;
        Ok(())
    }

    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.socket.recv(buf).await?)
    }
}

/// 서버는 IPv4 와일드카드에만 바인딩하므로 `localhost` 가 `::1` 로 먼저 풀려도
/// IPv4 주소를 앞에 둔다. 같은 계열 안의 순서는 유지.
fn prefer_ipv4(addrs: &mut [SocketAddr]) {
    addrs.sort_by_key(SocketAddr::is_ipv6);
}

impl AsyncRead for DatagramStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        // 버퍼보다 긴 데이터그램은 잘린다
        self.socket.poll_recv(cx, buf)
    }
}

impl AsyncWrite for DatagramStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.socket.poll_send(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
