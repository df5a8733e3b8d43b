//! 수집 실패 로그.
//!
//! `{data_dir}/failures/failures_{YYYYMMDD}.txt`에 사람이 읽을 수 있는 한 줄씩 추가합니다.
//! 로그 기록 실패는 경고만 남기고 실행을 막지 않습니다.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use harvest_exchange::Key;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// 실패 로그 디렉토리 이름
pub const FAILURES_DIR: &str = "failures";

/// 재시도 소진 후 남기는 실패 기록.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub timestamp: DateTime<Utc>,
    pub key: Key,
    pub error: String,
}

impl FailureRecord {
    pub fn new(key: Key, error: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            key,
            error: error.into(),
        }
    }

    /// 로그 한 줄 (`<timestamp>: Failed to collect <key> - <error>`).
    pub fn line(&self) -> String {
        format!(
            "{}: Failed to collect {} - {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.key,
            self.error
        )
    }
}

/// 추가 전용 실패 로그.
#[derive(Debug, Clone)]
pub struct FailureLog {
    dir: PathBuf,
}

impl FailureLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join(FAILURES_DIR),
        }
    }

    /// 기록 날짜의 로그 파일 경로.
    pub fn path_for(&self, timestamp: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("failures_{}.txt", timestamp.format("%Y%m%d")))
    }

    /// 한 줄 추가.
    pub async fn append(&self, record: &FailureRecord) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(record.timestamp))
            .await?;
        file.write_all(format!("{}\n", record.line()).as_bytes())
            .await?;
        file.flush().await
    }

    /// 한 줄 추가 (실패해도 경고만 남김).
    pub async fn record(&self, record: &FailureRecord) {
        if let Err(e) = self.append(record).await {
            warn!(key = %record.key, error = %e, "실패 로그 기록 실패");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_line_format() {
        let record = FailureRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 11, 5, 12, 30, 0).unwrap(),
            key: Key::from("PRES-2024"),
            error: "Network error: reset".to_string(),
        };
        assert_eq!(
            record.line(),
            "2024-11-05T12:30:00Z: Failed to collect PRES-2024 - Network error: reset"
        );
    }

    #[tokio::test]
    async fn test_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLog::new(dir.path());
        let first = FailureRecord::new(Key::from("A"), "boom");
        let second = FailureRecord::new(Key::from("B"), "again");

        log.append(&first).await.unwrap();
        log.append(&second).await.unwrap();

        let content = tokio::fs::read_to_string(log.path_for(first.timestamp))
            .await
            .unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("Failed to collect A - boom"));
        assert!(lines[1].ends_with("Failed to collect B - again"));
    }
}
