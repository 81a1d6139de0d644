//! LFP 업로드 클라이언트
//!
//! 사용법:
//!   cargo run --release --bin lfp-put -- [OPTIONS] <FILE>
//!
//! 예시:
//!   cargo run --release --bin lfp-put -- --host 192.168.1.100 notes.txt
//!   cargo run --release --bin lfp-put -- --udp notes.txt

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lfp::{Client, Config, Transport};

/// 클라이언트 설정
struct PutArgs {
    host: String,
    transport: Transport,
    file: Option<PathBuf>,
    config: Config,
}

impl Default for PutArgs {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            transport: Transport::Tcp,
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

fn parse_args() -> PutArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = PutArgs::default();

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
            "--help" | "-h" => {
                println!(
                    r#"LFP Put - 파일 업로드

사용법:
  cargo run --release --bin lfp-put -- [OPTIONS] <FILE>

옵션:
  --host <HOST>        서버 주소 (기본: localhost)
  -p, --port <PORT>    서버 포트 (기본: 8081)
  -u, --udp            UDP 사용 (기본: TCP)
  --lossy              불안정한 네트워크용 긴 타임아웃 (15초)
  -h, --help           이 도움말 출력

서버에는 파일의 기본 이름으로 저장된다.
"#
                );
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("알 수 없는 옵션: {}", other);
                std::process::exit(2);
            }
            other => {
                parsed.file = Some(PathBuf::from(other));
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

    info!(
        "Upload file '{}' to '{}:{}'",
        file.display(),
        args.host,
        args.config.port
    );

    let client = Client::new(args.config, args.host, args.transport);
    match client.put(&file).await {
        Ok(outcome) => {
            info!("Uploaded '{}' ({} bytes)", outcome.file_name, outcome.bytes);
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
