//! 수집 산출물과 처리 완료 키 집합.
//!
//! # 디렉토리 구조
//!
//! ```text
//! {data_dir}/
//! ├── events/events_{stamp}.json          이벤트 스냅샷
//! ├── markets/all_markets_{stamp}.json    실행별 집계
//! └── markets/by_event/{key}.json         키별 산출물
//! ```
//!
//! 키별 산출물 파일의 존재 여부가 "이미 처리됨"의 유일한 근거입니다.
//! 메모리 상의 집합은 시작 시 디렉토리를 스캔해 만들고, 파일을 쓴 직후에만 갱신합니다.

use std::borrow::Cow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use harvest_exchange::{open_markets, Item, Key};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::storage::{read_json, write_json_atomic, TMP_SUFFIX};
use crate::Result;

/// 이벤트 스냅샷 디렉토리 이름
pub const EVENTS_DIR: &str = "events";
/// 마켓 산출물 디렉토리 이름
pub const MARKETS_DIR: &str = "markets";
/// 키별 산출물 하위 디렉토리 이름
pub const BY_EVENT_DIR: &str = "by_event";

/// 이벤트 목록 스냅샷.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_events: usize,
    pub events: Vec<Item>,
}

impl EventsSnapshot {
    pub fn new(timestamp: DateTime<Utc>, events: Vec<Item>) -> Self {
        Self {
            timestamp,
            total_events: events.len(),
            events,
        }
    }
}

/// 키(이벤트) 하나의 마켓 산출물.
///
/// 마켓이 없어도 빈 목록으로 저장합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyArtifact {
    pub event_ticker: Key,
    pub timestamp: DateTime<Utc>,
    pub total_markets: usize,
    #[serde(default)]
    pub total_open_markets: usize,
    pub markets: Vec<Item>,
    /// `status == "active"`인 마켓
    #[serde(default)]
    pub open_markets: Vec<Item>,
}

impl KeyArtifact {
    pub fn new(event_ticker: Key, timestamp: DateTime<Utc>, markets: Vec<Item>) -> Self {
        let open = open_markets(&markets);
        Self {
            event_ticker,
            timestamp,
            total_markets: markets.len(),
            total_open_markets: open.len(),
            markets,
            open_markets: open,
        }
    }
}

/// 실행 하나의 집계 산출물.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateArtifact {
    pub timestamp: DateTime<Utc>,
    pub total_markets: usize,
    #[serde(default)]
    pub total_open_markets: usize,
    pub markets: Vec<Item>,
    #[serde(default)]
    pub open_markets: Vec<Item>,
    pub events_processed: usize,
}

impl AggregateArtifact {
    pub fn new(timestamp: DateTime<Utc>, markets: Vec<Item>, events_processed: usize) -> Self {
        let open = open_markets(&markets);
        Self {
            timestamp,
            total_markets: markets.len(),
            total_open_markets: open.len(),
            markets,
            open_markets: open,
            events_processed,
        }
    }
}

/// 파일명에 쓰는 타임스탬프 (같은 초 안의 연속 실행도 구분).
pub fn file_stamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%d_%H%M%S%3f").to_string()
}

/// 이벤트 스냅샷 경로.
pub fn events_snapshot_path(data_dir: &Path, timestamp: DateTime<Utc>) -> PathBuf {
    data_dir
        .join(EVENTS_DIR)
        .join(format!("events_{}.json", file_stamp(timestamp)))
}

/// 집계 산출물 경로.
pub fn aggregate_path(data_dir: &Path, timestamp: DateTime<Utc>) -> PathBuf {
    data_dir
        .join(MARKETS_DIR)
        .join(format!("all_markets_{}.json", file_stamp(timestamp)))
}

/// 파일명에 그대로 쓰는 문자: `[A-Za-z0-9._-]`
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'_').remove(b'-');

/// 키를 파일명으로 인코딩 (퍼센트 인코딩, 역변환 가능).
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

/// 파일명을 키로 디코딩 (UTF-8이 아니면 `None`).
pub fn decode_key(name: &str) -> Option<String> {
    percent_decode_str(name)
        .decode_utf8()
        .ok()
        .map(Cow::into_owned)
}

/// 복구 요약 (디스크 산출물 기준).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    /// 처리 완료 키 수
    pub keys: usize,
    /// 산출물에 담긴 마켓 수 합계
    pub total_markets: usize,
    /// 읽지 못한 산출물 수
    pub unreadable: usize,
}

/// 키별 산출물 저장소 (ProcessedKeySet).
///
/// 단일 writer 전제입니다. 여러 프로세스가 같은 디렉토리에 동시에 쓰는 경우는 지원하지 않습니다.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    processed: HashSet<Key>,
}

impl ArtifactStore {
    /// 데이터 루트 기준 기본 위치로 열기.
    pub async fn open_in(data_dir: &Path) -> Result<Self> {
        Self::open(data_dir.join(MARKETS_DIR).join(BY_EVENT_DIR)).await
    }

    /// 디렉토리를 스캔해 처리 완료 키 집합 구성.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut processed = HashSet::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            match decode_key(stem) {
                Some(key) => {
                    processed.insert(Key::new(key));
                }
                None => warn!(file = name, "키로 해석할 수 없는 산출물 파일"),
            }
        }

        debug!(dir = %dir.display(), processed = processed.len(), "처리 완료 키 로드");
        Ok(Self { dir, processed })
    }

    /// 키별 산출물 경로.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }

    /// 이미 처리된 키인지 확인.
    pub fn contains(&self, key: &str) -> bool {
        self.processed.contains(key)
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    /// 처리 완료 키 목록 (정렬됨).
    pub fn keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.processed.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// 산출물 저장 후 처리 완료로 표시.
    ///
    /// 파일 쓰기가 끝난 뒤에만 집합에 추가합니다.
    pub async fn save(
        &mut self,
        key: &Key,
        markets: &[Item],
        timestamp: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let path = self.path_for(key.as_str());
        let artifact = KeyArtifact::new(key.clone(), timestamp, markets.to_vec());

        write_json_atomic(&path, &artifact).await?;
        self.processed.insert(key.clone());
        Ok(path)
    }

    /// 키별 산출물 읽기.
    pub async fn load(&self, key: &str) -> Result<KeyArtifact> {
        read_json(&self.path_for(key)).await
    }

    /// 디스크의 산출물을 모두 읽어 요약.
    pub async fn recover(&self) -> RecoverySummary {
        let mut summary = RecoverySummary::default();
        for key in self.keys() {
            match self.load(key.as_str()).await {
                Ok(artifact) => {
                    summary.keys += 1;
                    summary.total_markets += artifact.total_markets;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "산출물 읽기 실패");
                    summary.unreadable += 1;
                }
            }
        }
        summary
    }
}
