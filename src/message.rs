//! 프로토콜 메시지 정의
//!
//! 모든 메시지는 `command` 또는 `command: parameter` 형태의 ASCII 한 줄이며
//! `\n` 으로 끝난다. UDP ACK 토큰(`get-ack`, `put-ack`)만 예외로 콜론 프레이밍을
//! 쓰지 않는다.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

/// 다운로드 요청 (클라이언트 → 서버)
pub const CMD_GET: &str = "get";

/// 업로드 요청 (클라이언트 → 서버)
pub const CMD_PUT: &str = "put";

/// 다운로드 크기 응답 (서버 → 클라이언트)
pub const CMD_LENGTH: &str = "length";

/// 수신 준비 / 수신 완료 (서버 → 클라이언트, TCP put)
pub const CMD_OK: &str = "ok";

/// 실패 통보 (양방향)
pub const CMD_ERROR: &str = "error";

/// 검증 모드 옵션
pub const VERIFY_FLAG: &str = "-v";

/// 명령과 파라미터 사이 구분자
const SEPARATOR: &str = ": ";

/// 한 줄 메시지
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub command: String,
    pub parameter: String,
}

impl Message {
    pub fn new(command: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            parameter: parameter.into(),
        }
    }

    /// 파라미터 없는 메시지
    pub fn bare(command: impl Into<String>) -> Self {
        Self::new(command, "")
    }

    pub fn ok() -> Self {
        Self::bare(CMD_OK)
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(CMD_ERROR, reason)
    }

    pub fn is(&self, command: &str) -> bool {
        self.command == command
    }

    /// `command[: parameter]\n` 로 인코딩
    pub fn encode(&self) -> String {
        if self.parameter.is_empty() {
            format!("{}\n", self.command)
        } else {
            format!("{}{}{}\n", self.command, SEPARATOR, self.parameter)
        }
    }

    /// 한 줄을 디코딩
    ///
    /// 끝의 개행 하나를 제거하고 첫 번째 콜론에서 나눈다. 콜론 뒤의 공백은
    /// 정확히 하나만 구분자로 취급한다.
    pub fn decode(line: &str) -> Self {
        let line = line.strip_suffix('\n').unwrap_or(line);

        match line.split_once(':') {
            Some((command, rest)) => {
                let parameter = rest.strip_prefix(' ').unwrap_or(rest);
                Self::new(command, parameter)
            }
            None => Self::bare(line),
        }
    }

    /// 데이터그램 페이로드를 메시지로 디코딩
    pub fn from_datagram(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Framing("빈 데이터그램".into()));
        }

        let line = std::str::from_utf8(data)
            .map_err(|_| Error::Framing("UTF-8 이 아닌 요청".into()))?;

        Ok(Self::decode(line))
    }
}

/// 스트림에서 메시지 한 줄 읽기
///
/// 한 바이트도 읽지 못하고 스트림이 끝나면 프레이밍 에러
pub async fn read_message<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line).await?;

    if n == 0 {
        return Err(Error::Framing("메시지 전에 스트림 종료".into()));
    }

    let line = String::from_utf8(line)
        .map_err(|_| Error::Framing("UTF-8 이 아닌 메시지".into()))?;

    Ok(Message::decode(&line))
}

/// 스트림에 메시지 한 줄 쓰기
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(message.encode().as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// 전송 명세
///
/// 요청 파싱 시 생성되며 전송이 시작되면 바뀌지 않는다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSpec {
    pub file_name: String,

    /// 선언된 길이 (get 요청 시점에는 0, 파일을 연 뒤 결정)
    pub length: u64,

    /// 다이제스트 검증 요청 여부
    pub verify: bool,

    /// 헤더로 받은 다이제스트
    pub expected_hash: Option<String>,
}

impl TransferSpec {
    pub fn get(file_name: impl Into<String>, verify: bool) -> Self {
        Self {
            file_name: file_name.into(),
            length: 0,
            verify,
            expected_hash: None,
        }
    }

    pub fn put(file_name: impl Into<String>, length: u64) -> Self {
        Self {
            file_name: file_name.into(),
            length,
            verify: false,
            expected_hash: None,
        }
    }
}

/// 클라이언트 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get(TransferSpec),
    Put(TransferSpec),
}

impl Request {
    pub fn from_message(message: &Message) -> Result<Self> {
        match message.command.as_str() {
            CMD_GET => Self::parse_get(&message.parameter),
            CMD_PUT => Self::parse_put(&message.parameter),
            other => Err(Error::ProtocolViolation(format!(
                "알 수 없는 명령 '{}'",
                other
            ))),
        }
    }

    /// `fileName [-v]`
    fn parse_get(parameter: &str) -> Result<Self> {
        let mut args = parameter.split_whitespace();
        let file_name = args
            .next()
            .ok_or_else(|| Error::ProtocolViolation("get: 파일 이름 누락".into()))?;

        let mut verify = false;
        for arg in args {
            if arg == VERIFY_FLAG {
                verify = true;
            } else {
                return Err(Error::ProtocolViolation(format!(
                    "get: 알 수 없는 옵션 '{}'",
                    arg
                )));
            }
        }

        Ok(Request::Get(TransferSpec::get(file_name, verify)))
    }

    /// `fileName length`
    fn parse_put(parameter: &str) -> Result<Self> {
        let args: Vec<&str> = parameter.split_whitespace().collect();
        let [file_name, length] = args.as_slice() else {
            return Err(Error::ProtocolViolation(format!(
                "put: 'fileName length' 형식이 아님: '{}'",
                parameter
            )));
        };

        let length = length.parse::<u64>().map_err(|_| {
            Error::ProtocolViolation(format!("put: 유효하지 않은 길이 '{}'", length))
        })?;

        Ok(Request::Put(TransferSpec::put(*file_name, length)))
    }

    pub fn spec(&self) -> &TransferSpec {
        match self {
            Request::Get(spec) | Request::Put(spec) => spec,
        }
    }

    pub fn to_message(&self) -> Message {
        match self {
            Request::Get(spec) if spec.verify => Message::new(
                CMD_GET,
                format!("{} {}", spec.file_name, VERIFY_FLAG),
            ),
            Request::Get(spec) => Message::new(CMD_GET, spec.file_name.clone()),
            Request::Put(spec) => {
                Message::new(CMD_PUT, format!("{} {}", spec.file_name, spec.length))
            }
        }
    }
}

/// `length: byteSize[ digestHex]` 응답
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthHeader {
    pub length: u64,
    pub digest: Option<String>,
}

impl LengthHeader {
    pub fn new(length: u64, digest: Option<String>) -> Self {
        Self { length, digest }
    }

    pub fn parse(parameter: &str) -> Result<Self> {
        let mut args = parameter.split_whitespace();

        let length = args
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| {
                Error::ProtocolViolation(format!("유효하지 않은 length 헤더 '{}'", parameter))
            })?;
        let digest = args.next().map(str::to_owned);

        Ok(Self { length, digest })
    }

    pub fn to_message(&self) -> Message {
        match &self.digest {
            Some(digest) => Message::new(CMD_LENGTH, format!("{} {}", self.length, digest)),
            None => Message::new(CMD_LENGTH, self.length.to_string()),
        }
    }
}

/// UDP 흐름 제어 ACK
///
/// 와이어에는 리터럴 토큰으로 나가지만 내부에서는 열거형으로 다룬다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// 다운로드 청크 수신 확인 (클라이언트 → 서버)
    Get,

    /// 업로드 청크 수신 확인 (서버 → 클라이언트)
    Put,
}

impl Ack {
    pub const fn token(self) -> &'static str {
        match self {
            Ack::Get => "get-ack",
            Ack::Put => "put-ack",
        }
    }

    /// 데이터그램이 정확히 ACK 토큰인 경우만 인식
    pub fn from_datagram(data: &[u8]) -> Option<Self> {
        [Ack::Get, Ack::Put]
            .into_iter()
            .find(|ack| ack.token().as_bytes() == data)
    }
}
