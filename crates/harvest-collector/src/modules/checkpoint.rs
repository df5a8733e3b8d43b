//! 수집 이력 체크포인트 관리 모듈.
//!
//! 수집 도메인(이벤트, 마켓)마다 JSON 파일 하나에 실행 기록을 순서대로 쌓습니다.
//!
//! # 주요 기능
//!
//! - **이력 로드**: 파일이 없거나 손상되면 빈 이력으로 시작 (손상 파일은 `.bak`으로 격리)
//! - **변경 계산**: 직전 기록의 스냅샷 대비 추가/삭제된 키
//! - **기록 추가**: 직전 기록 대비 `total_change`, 같은 날 기록 대비 `intraday_change` 계산
//!
//! `output_file`은 데이터 디렉토리 기준 상대 경로로 저장하므로 작업 디렉토리와 무관합니다.
//!
//! 기록 추가(`append`)만이 파일을 바꾸는 유일한 경로이며 단일 writer를 전제로 합니다.
//! 여러 프로세스가 동시에 같은 이력 파일에 추가하는 경우는 지원하지 않습니다.
//!
//! # 사용 예
//!
//! ```rust,ignore
//! let store = CheckpointStore::new(&data_dir, CheckpointDomain::Events);
//! let previous = store.previous_event_items().await;
//! let diff = CheckpointStore::diff(&current_keys, &previous_keys);
//! store.append(CollectionRecord::new(now, total, output_file, diff)).await?;
//! ```

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use harvest_exchange::{Item, Key};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::artifacts::EventsSnapshot;
use super::storage::{read_json, write_json_atomic};
use crate::Result;

/// 수집 도메인.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointDomain {
    Events,
    Markets,
}

impl CheckpointDomain {
    /// 이력 파일 이름.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Events => "events_collection_history.json",
            Self::Markets => "markets_collection_history.json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Markets => "markets",
        }
    }
}

/// 실행 종료 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// 끝까지 완료
    Completed,
    /// 취소, 에러 등으로 중간에 종료 (다음 실행에서 이어서 처리)
    Interrupted,
    /// 실행당 처리 상한에 걸림 (남은 키는 다음 실행에서 처리)
    Capped,
}

/// 두 스냅샷 사이의 키 변경.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub added: Vec<Key>,
    pub removed: Vec<Key>,
    pub total_added: usize,
    pub total_removed: usize,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// 실행 하나의 수집 기록.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    /// 실행 날짜 (YYYYMMDD)
    pub date: String,
    pub timestamp: DateTime<Utc>,
    /// 실행 시각 (HH:MM:SS)
    pub time: String,
    pub total_items: usize,
    pub output_file: PathBuf,
    pub changes: Diff,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_change: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intraday_change: Option<i64>,
}

impl CollectionRecord {
    /// 새 기록 생성 (변화량 필드는 `append`에서 채움).
    pub fn new(
        timestamp: DateTime<Utc>,
        total_items: usize,
        output_file: impl Into<PathBuf>,
        changes: Diff,
    ) -> Self {
        Self {
            date: timestamp.format("%Y%m%d").to_string(),
            timestamp,
            time: timestamp.format("%H:%M:%S").to_string(),
            total_items,
            output_file: output_file.into(),
            changes,
            status: RunStatus::Completed,
            previous_count: None,
            total_change: None,
            previous_time: None,
            intraday_change: None,
        }
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = status;
        self
    }
}

/// 도메인별 이력 전체.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub collections: Vec<CollectionRecord>,
}

impl Checkpoint {
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn latest(&self) -> Option<&CollectionRecord> {
        self.collections.last()
    }
}

/// 이력 파일 저장소.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    data_dir: PathBuf,
    path: PathBuf,
    domain: CheckpointDomain,
}

impl CheckpointStore {
    pub fn new(data_dir: &Path, domain: CheckpointDomain) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            path: data_dir.join(domain.file_name()),
            domain,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 손상 파일 격리 경로.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// 이력 로드.
    ///
    /// 에러를 반환하지 않습니다. 체크포인트를 잃으면 "처음부터 시작"으로 처리합니다.
    pub async fn load(&self) -> Checkpoint {
        match self.read().await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(
                    domain = self.domain.as_str(),
                    path = %self.path.display(),
                    error = %e,
                    "체크포인트를 읽을 수 없음, 빈 이력으로 시작"
                );
                Checkpoint::default()
            }
        }
    }

    /// 기록된 `output_file`의 실제 경로.
    pub fn resolve(&self, output_file: &Path) -> PathBuf {
        if output_file.is_absolute() {
            output_file.to_path_buf()
        } else {
            self.data_dir.join(output_file)
        }
    }

    /// 가장 최근 기록.
    pub async fn latest(&self) -> Option<CollectionRecord> {
        self.load().await.collections.pop()
    }

    /// 이력 파일 읽기.
    ///
    /// 없거나 비어 있으면 빈 이력, 형식이 깨졌으면 `.bak`으로 옮기고 빈 이력을 반환합니다.
    /// 그 밖의 I/O 에러만 호출자에게 전달합니다.
    async fn read(&self) -> std::io::Result<Checkpoint> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(domain = self.domain.as_str(), "체크포인트 파일 없음, 새로 시작");
                return Ok(Checkpoint::default());
            }
            Err(e) => return Err(e),
        };

        if raw.iter().all(u8::is_ascii_whitespace) {
            info!(domain = self.domain.as_str(), "체크포인트 파일이 비어 있음, 새로 시작");
            return Ok(Checkpoint::default());
        }

        match serde_json::from_slice(&raw) {
            Ok(checkpoint) => Ok(checkpoint),
            Err(e) => {
                let backup = self.backup_path();
                tokio::fs::rename(&self.path, &backup).await?;
                warn!(
                    domain = self.domain.as_str(),
                    error = %e,
                    backup = %backup.display(),
                    "손상된 체크포인트를 격리했습니다"
                );
                Ok(Checkpoint::default())
            }
        }
    }

    /// 키 집합 비교 (키 동일성만 비교, O(n)).
    ///
    /// `added`는 현재 순서, `removed`는 이전 순서를 유지하며 중복 키는 한 번만 셉니다.
    pub fn diff<'a, C, P>(current: C, previous: P) -> Diff
    where
        C: IntoIterator<Item = &'a Key>,
        P: IntoIterator<Item = &'a Key>,
    {
        let current: Vec<&Key> = current.into_iter().collect();
        let previous: Vec<&Key> = previous.into_iter().collect();
        let current_set: HashSet<&Key> = current.iter().copied().collect();
        let previous_set: HashSet<&Key> = previous.iter().copied().collect();

        let added = unique_missing(&current, &previous_set);
        let removed = unique_missing(&previous, &current_set);

        Diff {
            total_added: added.len(),
            total_removed: removed.len(),
            added,
            removed,
        }
    }

    /// 기록 추가 후 원자적으로 저장.
    ///
    /// 채워진 기록을 반환합니다.
    pub async fn append(&self, mut record: CollectionRecord) -> Result<CollectionRecord> {
        let mut checkpoint = self.read().await?;

        if let Ok(relative) = record.output_file.strip_prefix(&self.data_dir) {
            record.output_file = relative.to_path_buf();
        }

        if let Some(previous) = checkpoint.latest() {
            record.previous_count = Some(previous.total_items);
            record.total_change = Some(record.total_items as i64 - previous.total_items as i64);
        }

        if let Some(same_day) = checkpoint
            .collections
            .iter()
            .rev()
            .find(|c| c.date == record.date)
        {
            record.previous_time = Some(same_day.time.clone());
            record.intraday_change =
                Some(record.total_items as i64 - same_day.total_items as i64);
        }

        checkpoint.collections.push(record.clone());
        write_json_atomic(&self.path, &checkpoint).await?;

        info!(
            domain = self.domain.as_str(),
            total = record.total_items,
            added = record.changes.total_added,
            removed = record.changes.total_removed,
            total_change = ?record.total_change,
            intraday_change = ?record.intraday_change,
            "체크포인트 기록 추가"
        );

        Ok(record)
    }

    /// 직전 기록의 이벤트 스냅샷.
    ///
    /// `total_change`와 같은 기록을 기준으로 삼습니다. 중단된 실행의 부분 스냅샷도 포함.
    /// 스냅샷을 읽을 수 없으면 경고 후 빈 목록을 반환합니다.
    pub async fn previous_event_items(&self) -> Vec<Item> {
        match self.latest().await {
            Some(record) => self.snapshot_items(&record).await,
            None => Vec::new(),
        }
    }

    /// 기록이 가리키는 이벤트 스냅샷의 항목.
    pub async fn snapshot_items(&self, record: &CollectionRecord) -> Vec<Item> {
        let file = self.resolve(&record.output_file);
        match read_json::<EventsSnapshot>(&file).await {
            Ok(snapshot) => snapshot.events,
            Err(e) => {
                warn!(
                    file = %file.display(),
                    error = %e,
                    "이전 스냅샷을 읽을 수 없음"
                );
                Vec::new()
            }
        }
    }
}

/// `keys` 중 `other`에 없는 키를 순서대로, 중복 없이.
fn unique_missing(keys: &[&Key], other: &HashSet<&Key>) -> Vec<Key> {
    let mut seen = HashSet::new();
    keys.iter()
        .filter(|k| !other.contains(*k) && seen.insert(**k))
        .map(|k| (*k).clone())
        .collect()
}
