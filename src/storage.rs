//! 파일 저장소
//!
//! 서버가 요청받은 파일 이름을 루트 디렉터리 기준으로 해석하고 연다.
//! 각 핸들은 호출한 태스크가 단독으로 소유한다.

use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::fs::{File, OpenOptions};

use crate::digest::digest_reader;
use crate::{Error, Result, CHUNK_SIZE};

/// 루트 디렉터리에 묶인 파일 저장소
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 파일 이름을 루트 아래 경로로 해석
    ///
    /// 절대 경로와 `..` 는 거부한다.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if name.is_empty() || escapes {
            return Err(Error::FileAccess {
                path: relative.to_path_buf(),
                source: io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("'{}' 는 허용되지 않는 경로", name),
                ),
            });
        }

        Ok(self.root.join(relative))
    }

    /// 읽기 전용으로 열고 길이를 함께 반환
    pub async fn open_read(&self, name: &str) -> Result<(File, u64)> {
        let path = self.resolve(name)?;
        let access = |source| Error::FileAccess {
            path: path.clone(),
            source,
        };

        let file = File::open(&path).await.map_err(access)?;
        let metadata = file.metadata().await.map_err(access)?;
        if !metadata.is_file() {
            return Err(access(io::Error::new(
                io::ErrorKind::InvalidInput,
                "일반 파일이 아님",
            )));
        }

        Ok((file, metadata.len()))
    }

    /// 읽기/쓰기로 열기 (없으면 생성, 있으면 비움)
    pub async fn open_write(&self, name: &str) -> Result<File> {
        let path = self.resolve(name)?;

        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|source| Error::FileAccess { path, source })
    }

    /// 전체 내용 다이제스트 (현재 위치 유지)
    pub async fn digest(&self, file: &mut File) -> Result<String> {
        digest_reader(file, CHUNK_SIZE).await
    }
}
