//! JSON 파일 저장 헬퍼.
//!
//! 모든 산출물은 임시 파일에 쓴 뒤 rename으로 교체합니다.
//! 중간에 프로세스가 죽어도 기존 파일이 부분적으로 덮어써지지 않습니다.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// 임시 파일 확장자.
pub const TMP_SUFFIX: &str = ".tmp";

/// `path` 옆에 둘 임시 파일 경로.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

/// JSON을 원자적으로 저장 (임시 파일 쓰기 → rename).
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let raw = serde_json::to_vec_pretty(value)?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, raw).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// JSON 파일 읽기.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&raw)?)
}
