//! 워크플로우 진행 상태 관리 모듈.
//!
//! 장시간 실행되는 키별 수집 루프의 진행 상황을 `progress.json`에 기록합니다.
//!
//! # 주요 기능
//!
//! - **진행 상태 저장**: N개 처리마다 마지막 키와 누적 처리 수 저장
//! - **중단 표시**: 취소/에러로 끝난 실행을 `interrupted`로 마킹
//! - **상태 조회**: `checkpoints` 명령에서 모든 워크플로우 상태 출력
//!
//! 이 파일은 참고용입니다. 키를 건너뛸지 여부는 항상 산출물 디렉토리로 판단합니다.
//!
//! # 사용 예
//!
//! ```rust,ignore
//! let progress = ProgressStore::new(&data_dir);
//!
//! // 처리 중 (10개마다)
//! progress.save_progress("markets", key.as_str(), processed, CheckpointStatus::Running).await?;
//!
//! // 완료 시
//! progress.save_progress("markets", "", total, CheckpointStatus::Completed).await?;
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::storage::write_json_atomic;
use crate::Result;

/// 진행 상태 파일 이름
pub const PROGRESS_FILE: &str = "progress.json";

/// 진행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// 실행 중
    Running,
    /// 중단됨 (재개 가능)
    Interrupted,
    /// 완료됨
    Completed,
    /// 유휴 상태
    Idle,
}

impl CheckpointStatus {
    /// 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Interrupted => "interrupted",
            Self::Completed => "completed",
            Self::Idle => "idle",
        }
    }
}

/// 워크플로우 하나의 진행 상태
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    pub workflow: String,
    /// 마지막 처리된 키 (완료 시 None)
    pub last_key: Option<String>,
    pub total_processed: usize,
    pub status: CheckpointStatus,
    pub updated_at: DateTime<Utc>,
}

/// `progress.json` 저장소.
///
/// 쓰기는 sink 태스크 또는 실행 전후의 오케스트레이터에서만 일어납니다.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PROGRESS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 전체 진행 상태 읽기 (없거나 손상되면 빈 맵).
    async fn read_all(&self) -> BTreeMap<String, RunProgress> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "진행 상태 파일 읽기 실패");
                return BTreeMap::new();
            }
        };

        serde_json::from_slice(&raw).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "진행 상태 파일 손상, 무시");
            BTreeMap::new()
        })
    }

    /// 진행 상태 저장.
    ///
    /// # Arguments
    /// * `workflow` - 워크플로우 이름 (e.g., "events", "markets")
    /// * `last_key` - 마지막 처리된 키 (완료 시 빈 문자열)
    /// * `total_processed` - 총 처리된 수
    /// * `status` - 현재 상태
    pub async fn save_progress(
        &self,
        workflow: &str,
        last_key: &str,
        total_processed: usize,
        status: CheckpointStatus,
    ) -> Result<()> {
        let mut all = self.read_all().await;
        all.insert(
            workflow.to_string(),
            RunProgress {
                workflow: workflow.to_string(),
                last_key: Some(last_key.to_string()).filter(|k| !k.is_empty()),
                total_processed,
                status,
                updated_at: Utc::now(),
            },
        );
        write_json_atomic(&self.path, &all).await
    }

    /// 워크플로우의 진행 상태.
    pub async fn load_progress(&self, workflow: &str) -> Option<RunProgress> {
        self.read_all().await.remove(workflow)
    }

    /// 중단된 워크플로우의 마지막 키.
    ///
    /// # Returns
    /// * `Some(key)` - 중단된 지점의 마지막 키
    /// * `None` - 중단점이 없거나 완료된 상태
    pub async fn resume_point(&self, workflow: &str) -> Option<String> {
        self.load_progress(workflow)
            .await
            .filter(|p| p.status == CheckpointStatus::Interrupted)
            .and_then(|p| p.last_key)
    }

    /// 실행 중인 워크플로우를 "interrupted"로 마킹.
    ///
    /// 취소나 치명적 에러로 실행이 끝날 때 호출합니다.
    pub async fn mark_interrupted(&self, workflow: &str) -> Result<()> {
        let mut all = self.read_all().await;
        let Some(progress) = all
            .get_mut(workflow)
            .filter(|p| p.status == CheckpointStatus::Running)
        else {
            return Ok(());
        };
        progress.status = CheckpointStatus::Interrupted;
        progress.updated_at = Utc::now();
        write_json_atomic(&self.path, &all).await
    }

    /// 워크플로우 진행 상태 삭제.
    pub async fn clear_progress(&self, workflow: &str) -> Result<()> {
        let mut all = self.read_all().await;
        if all.remove(workflow).is_some() {
            write_json_atomic(&self.path, &all).await?;
        }
        Ok(())
    }

    /// 모든 워크플로우의 진행 상태 (이름순).
    pub async fn list_progress(&self) -> Vec<RunProgress> {
        self.read_all().await.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        assert!(store.load_progress("markets").await.is_none());

        store
            .save_progress("markets", "EVT-10", 10, CheckpointStatus::Running)
            .await
            .unwrap();
        let progress = store.load_progress("markets").await.unwrap();
        assert_eq!(progress.last_key.as_deref(), Some("EVT-10"));
        assert_eq!(progress.total_processed, 10);
        assert_eq!(progress.status, CheckpointStatus::Running);

        // 완료 시 빈 키는 None
        store
            .save_progress("markets", "", 12, CheckpointStatus::Completed)
            .await
            .unwrap();
        assert!(store.load_progress("markets").await.unwrap().last_key.is_none());
    }

    #[tokio::test]
    async fn test_mark_interrupted_only_affects_running() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        store
            .save_progress("markets", "EVT-3", 3, CheckpointStatus::Running)
            .await
            .unwrap();
        store
            .save_progress("events", "", 50, CheckpointStatus::Completed)
            .await
            .unwrap();

        store.mark_interrupted("markets").await.unwrap();
        store.mark_interrupted("events").await.unwrap();

        assert_eq!(store.resume_point("markets").await.as_deref(), Some("EVT-3"));
        assert_eq!(
            store.load_progress("events").await.unwrap().status,
            CheckpointStatus::Completed
        );
        assert!(store.resume_point("events").await.is_none());
    }

    #[tokio::test]
    async fn test_list_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        store
            .save_progress("markets", "B", 2, CheckpointStatus::Running)
            .await
            .unwrap();
        store
            .save_progress("events", "", 5, CheckpointStatus::Idle)
            .await
            .unwrap();

        let names: Vec<String> = store
            .list_progress()
            .await
            .into_iter()
            .map(|p| p.workflow)
            .collect();
        assert_eq!(names, vec!["events", "markets"]);

        store.clear_progress("markets").await.unwrap();
        assert_eq!(store.list_progress().await.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        tokio::fs::write(store.path(), b"[oops").await.unwrap();
        assert!(store.list_progress().await.is_empty());
    }
}
