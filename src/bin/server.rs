//! LFP 서버 - Line Framed Protocol
//!
//! 같은 포트에서 TCP 와 UDP 로 get/put 요청을 받는다.
//! 표준 입력에 `exit` 또는 `quit` 을 입력하거나 Ctrl-C 로 종료.
//!
//! 사용법:
//!   cargo run --release --bin lfp-server -- [OPTIONS]
//!
//! 예시:
//!   # 현재 디렉터리를 8081 포트로 공개
//!   cargo run --release --bin lfp-server
//!
//!   # 다른 포트, 다른 루트
//!   cargo run --release --bin lfp-server -- --port 9000 --root /srv/files

use std::path::PathBuf;
use std::str::FromStr;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lfp::{Config, Server};

fn parse_value<T: FromStr>(args: &[String], i: usize, flag: &str) -> T {
    match args.get(i + 1).map(|s| s.parse::<T>()) {
        Some(Ok(value)) => value,
        _ => {
            eprintln!("{} 에 유효한 값이 필요합니다", flag);
            std::process::exit(2);
        }
    }
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                config.port = parse_value(&args, i, "--port");
                i += 1;
            }
            "--root" | "-r" => {
                config.root = parse_value::<PathBuf>(&args, i, "--root");
                i += 1;
            }
            "--help" | "-h" => {
                println!(
                    r#"LFP Server - Line Framed Protocol 서버

TCP/UDP 공용 get/put 파일 전송 서버
- TCP: 연결당 요청 하나
- UDP: 피어별 stop-and-wait 세션

사용법:
  cargo run --release --bin lfp-server -- [OPTIONS]

옵션:
  -p, --port <PORT>    TCP/UDP 포트 (기본: 8081)
  -r, --root <DIR>     파일 루트 디렉터리 (기본: .)
  -h, --help           이 도움말 출력

종료:
  표준 입력에 exit 또는 quit, 또는 Ctrl-C
"#
                );
                std::process::exit(0);
            }
            other => {
                eprintln!("알 수 없는 옵션: {}", other);
                std::process::exit(2);
            }
        }
        i += 1;
    }

    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정 (RUST_LOG 로 덮어쓰기 가능)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = parse_args();

    info!("LFP Server starting...");
    info!("Port: {}", config.port);
    info!("Chunk size: {} bytes", config.chunk_size);

    // 바인딩 실패는 복구 불가
    let server = Server::bind(config).await?;
    let handle = server.handle();
    let server_task = tokio::spawn(server.run());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let command = line.trim().to_lowercase();
                    if command == "exit" || command == "quit" {
                        println!("Bye!");
                        break;
                    }
                }
                None => {
                    // 표준 입력이 닫히면 Ctrl-C 만 기다림
                    tokio::signal::ctrl_c().await?;
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    handle.stop();
    server_task.await??;

    Ok(())
}
