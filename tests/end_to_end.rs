//! 실제 서버 + 클라이언트 왕복 테스트 (TCP, UDP)

use std::net::SocketAddr;
use std::path::Path;

use rand::RngCore;
use tokio::task::JoinHandle;

use lfp::{Checksum, Client, Config, ContentHasher, Error, Result, Server, ServerHandle, Transport};

struct Running {
    handle: ServerHandle,
    task: JoinHandle<Result<()>>,
    port: u16,
}

impl Running {
    fn client(&self, transport: Transport) -> Client {
        self.client_for("127.0.0.1", transport)
    }

    fn client_for(&self, host: &str, transport: Transport) -> Client {
        let config = Config {
            port: self.port,
            ..Config::default()
        };
        Client::new(config, host, transport)
    }

    async fn shutdown(self) {
        self.handle.stop();
        self.task.await.unwrap().unwrap();
    }
}

async fn start_server(root: &Path) -> Running {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let server = Server::bind_addr(Config::with_root(root), addr).await.unwrap();
    let port = server.local_addr().unwrap().port();
    let handle = server.handle();
    let task = tokio::spawn(server.run());

    Running { handle, task, port }
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

#[tokio::test]
async fn test_tcp_get_with_verify() {
    let root = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let data = random_bytes(2500);
    std::fs::write(root.path().join("report.txt"), &data).unwrap();

    let server = start_server(root.path()).await;
    let dest = local.path().join("report.txt");

    let outcome = server
        .client(Transport::Tcp)
        .get("report.txt", &dest, true)
        .await
        .unwrap();

    assert_eq!(outcome.bytes, 2500);
    assert_eq!(outcome.checksum, Checksum::Match(ContentHasher::digest(&data)));
    assert!(outcome.verify().is_ok());
    assert_eq!(std::fs::read(&dest).unwrap(), data);

    server.shutdown().await;
}

#[tokio::test]
async fn test_tcp_put() {
    let root = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let data = random_bytes(4097);
    let source = local.path().join("upload.bin");
    std::fs::write(&source, &data).unwrap();

    let server = start_server(root.path()).await;
    let outcome = server.client(Transport::Tcp).put(&source).await.unwrap();

    assert_eq!(outcome.file_name, "upload.bin");
    assert_eq!(outcome.bytes, 4097);
    // 클라이언트는 마지막 ok 를 받은 뒤에 반환하므로 파일은 이미 완성됨
    assert_eq!(std::fs::read(root.path().join("upload.bin")).unwrap(), data);

    server.shutdown().await;
}

#[tokio::test]
async fn test_udp_get_with_verify() {
    let root = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let data = random_bytes(3 * 1024 + 17);
    std::fs::write(root.path().join("image.raw"), &data).unwrap();

    let server = start_server(root.path()).await;
    let dest = local.path().join("image.raw");

    let outcome = server
        .client(Transport::Udp)
        .get("image.raw", &dest, true)
        .await
        .unwrap();

    assert_eq!(outcome.bytes, data.len() as u64);
    assert!(matches!(outcome.checksum, Checksum::Match(_)));
    assert_eq!(std::fs::read(&dest).unwrap(), data);

    server.shutdown().await;
}

#[tokio::test]
async fn test_udp_put() {
    let root = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let source = local.path().join("notes.txt");
    std::fs::write(&source, b"helloworld").unwrap();

    let server = start_server(root.path()).await;
    let outcome = server.client(Transport::Udp).put(&source).await.unwrap();
    assert_eq!(outcome.bytes, 10);

    // 마지막 put-ack 는 파일 플러시 뒤에 나감
    assert_eq!(
        std::fs::read(root.path().join("notes.txt")).unwrap(),
        b"helloworld"
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_get_missing_file_over_both_transports() {
    let root = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let server = start_server(root.path()).await;

    for transport in [Transport::Tcp, Transport::Udp] {
        let dest = local.path().join("missing.txt");
        let result = server
            .client(transport)
            .get("missing.txt", &dest, false)
            .await;

        assert!(
            matches!(result, Err(Error::Remote(_))),
            "{:?}: {:?}",
            transport,
            result
        );
        // 헤더를 받기 전에는 로컬 파일을 만들지 않음
        assert!(!dest.exists());
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_put_then_get_empty_file() {
    let root = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let source = local.path().join("empty.txt");
    std::fs::write(&source, b"").unwrap();

    let server = start_server(root.path()).await;

    for transport in [Transport::Tcp, Transport::Udp] {
        let client = server.client(transport);
        let put = client.put(&source).await.unwrap();
        assert_eq!(put.bytes, 0);

        let dest = local.path().join("fetched.txt");
        let get = client.get("empty.txt", &dest, true).await.unwrap();
        assert_eq!(get.bytes, 0);
        assert_eq!(
            get.checksum,
            Checksum::Match("d41d8cd98f00b204e9800998ecf8427e".into())
        );
        assert_eq!(std::fs::read(&dest).unwrap(), b"");
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_tcp_and_udp_clients() {
    let root = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let data = random_bytes(8 * 1024);
    std::fs::write(root.path().join("shared.bin"), &data).unwrap();

    let server = start_server(root.path()).await;

    let tcp_dest = local.path().join("tcp.bin");
    let udp_dest = local.path().join("udp.bin");
    let tcp_client = server.client(Transport::Tcp);
    let udp_client = server.client(Transport::Udp);

    let (tcp, udp) = tokio::join!(
        tcp_client.get("shared.bin", &tcp_dest, true),
        udp_client.get("shared.bin", &udp_dest, true),
    );

    assert!(tcp.unwrap().verify().is_ok());
    assert!(udp.unwrap().verify().is_ok());
    assert_eq!(std::fs::read(&tcp_dest).unwrap(), data);
    assert_eq!(std::fs::read(&udp_dest).unwrap(), data);

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_by_host_name_over_both_transports() {
    let root = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let data = random_bytes(1500);
    std::fs::write(root.path().join("named.bin"), &data).unwrap();

    // 서버는 IPv4 에만 바인딩, localhost 가 ::1 로 먼저 풀려도 도달해야 함
    let server = start_server(root.path()).await;

    for transport in [Transport::Tcp, Transport::Udp] {
        let dest = local.path().join("named.bin");
        let outcome = server
            .client_for("localhost", transport)
            .get("named.bin", &dest, true)
            .await
            .unwrap();

        assert!(outcome.verify().is_ok(), "{:?}", transport);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    server.shutdown().await;
}
