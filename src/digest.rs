//! 파일 내용 다이제스트 (MD5, 소문자 hex)

use std::io::SeekFrom;

use md5::{Digest, Md5};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::Result;

/// 순서에 민감한 단일 패스 다이제스트 누적기
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Md5,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// 누적된 바이트의 hex 다이제스트
    pub fn finalize_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }

    /// 한 번에 계산
    pub fn digest(data: &[u8]) -> String {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize_hex()
    }
}

/// 읽기 핸들의 전체 내용 다이제스트
///
/// 처음부터 끝까지 읽은 뒤 원래 위치로 되돌린다.
pub async fn digest_reader<R>(reader: &mut R, chunk_size: usize) -> Result<String>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let position = reader.stream_position().await?;
    reader.seek(SeekFrom::Start(0)).await?;

    let mut hasher = ContentHasher::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    reader.seek(SeekFrom::Start(position)).await?;
    Ok(hasher.finalize_hex())
}
