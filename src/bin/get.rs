//! LFP 다운로드 클라이언트
//!
//! 사용법:
//!   cargo run --release --bin lfp-get -- [OPTIONS] <FILE>
//!
//! 예시:
//!   # TCP 로 받고 체크섬 검증
//!   cargo run --release --bin lfp-get -- -v report.txt
//!
//!   # UDP (stop-and-wait)
//!   cargo run --release --bin lfp-get -- --host 192.168.1.100 --udp report.txt

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lfp::{Checksum, Client, Config, Error, Transport};

/// 클라이언트 설정
struct GetArgs {
    host: String,
    transport: Transport,
    verify: bool,
    file: Option<String>,
    config: Config,
}

impl Default for GetArgs {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            transport: Transport::Tcp,
            verify: false,
            file: None,
            config: Config::default(),
        }
    }
}

fn parse_value<T: FromStr>(args: &[String], i: usize, flag: &str) -> T {
    match args.get(i + 1).map(|s| s.parse::<T>()) {
        Some(Ok(value)) => value,
        _ => {
            eprintln!("{} 에 유효한 값이 필요합니다", flag);
            std::process::exit(2);
        }
    }
}

fn parse_args() -> GetArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = GetArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                parsed.host = parse_value(&args, i, "--host");
                i += 1;
            }
            "--port" | "-p" => {
                parsed.config.port = parse_value(&args, i, "--port");
                i += 1;
            }
            "--udp" | "-u" => {
                parsed.transport = Transport::Udp;
            }
            "--lossy" => {
                // 포트는 이미 지정된 값 유지
                let port = parsed.config.port;
                parsed.config = Config::lossy_network();
                parsed.config.port = port;
            }
            "-v" | "--verify" => {
                parsed.verify = true;
            }
            "--help" | "-h" => {
                println!(
                    r#"LFP Get - 파일 다운로드

사용법:
  cargo run --release --bin lfp-get -- [OPTIONS] <FILE>

옵션:
  --host <HOST>        서버 주소 (기본: localhost)
  -p, --port <PORT>    서버 포트 (기본: 8081)
  -u, --udp            UDP 사용 (기본: TCP)
  --lossy              불안정한 네트워크용 긴 타임아웃 (15초)
  -v, --verify         체크섬 검증
  -h, --help           이 도움말 출력

받은 파일은 현재 디렉터리에 같은 이름으로 저장된다.
"#
                );
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("알 수 없는 옵션: {}", other);
                std::process::exit(2);
            }
            other => {
                parsed.file = Some(other.to_string());
            }
        }
        i += 1;
    }

    parsed
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args();
    let Some(file) = args.file else {
        eprintln!("Please specify a file");
        std::process::exit(2);
    };

    let Some(local_name) = Path::new(&file).file_name() else {
        eprintln!("유효하지 않은 파일 경로: {}", file);
        std::process::exit(2);
    };
    let dest = PathBuf::from(local_name);

    info!(
        "Download file '{}' on '{}:{}' to '{}'",
        file,
        args.host,
        args.config.port,
        dest.display()
    );

    let client = Client::new(args.config, args.host, args.transport);
    let outcome = match client.get(&file, &dest, args.verify).await {
        Ok(outcome) => outcome,
        Err(Error::ShortTransfer { expected, received }) => {
            error!(
                "Connection closed before transfer completed ({}/{} bytes). File contents are likely incomplete.",
                received, expected
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    match &outcome.checksum {
        Checksum::Match(_) => info!("Checksum OK"),
        Checksum::Unavailable => warn!("Checksum calculation failed"),
        Checksum::NotRequested => {}
        Checksum::Mismatch { .. } => {
            if let Err(e) = outcome.verify() {
                error!("Checksum failed; file is corrupt: {}", e);
            }
            std::process::exit(1);
        }
    }

    Ok(())
}
