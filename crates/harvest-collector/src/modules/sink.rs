//! 수집 결과 기록 태스크.
//!
//! 작업자들은 결과를 채널로 보내기만 하고, 파일 쓰기는 이 태스크 하나가 전담합니다.
//! 산출물 저장, 처리 완료 표시, 실패 로그, 진행 상태 저장이 모두 같은 순서로 직렬화됩니다.

use chrono::Utc;
use harvest_exchange::{Item, Key};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::artifacts::ArtifactStore;
use super::failures::{FailureLog, FailureRecord};
use super::progress::{CheckpointStatus, ProgressStore};

/// 완료 채널 버퍼 크기
pub const COMPLETION_BUFFER: usize = 64;

/// 작업자가 보내는 키 하나의 결과.
#[derive(Debug)]
pub enum Completion {
    Collected { key: Key, items: Vec<Item> },
    Failed(FailureRecord),
}

/// 채널이 닫힌 뒤 반환되는 기록 결과.
#[derive(Debug)]
pub struct SinkSummary {
    /// 갱신된 처리 완료 키 집합
    pub store: ArtifactStore,
    /// 이번 실행에서 새로 처리된 키 (도착 순서)
    pub collected: Vec<Key>,
    /// 이번 실행에서 수집된 마켓 전체
    pub markets: Vec<Item>,
    /// 재시도 소진으로 실패한 키 수
    pub failed: usize,
    /// 산출물 저장에 실패한 키 수
    pub write_errors: usize,
    /// 마지막으로 처리한 키
    pub last_key: Option<Key>,
}

impl SinkSummary {
    /// 처리한 결과 수 (성공 + 실패).
    pub fn handled(&self) -> usize {
        self.collected.len() + self.failed + self.write_errors
    }
}

/// 단일 writer 기록 태스크.
pub struct CollectionSink {
    workflow: String,
    failures: FailureLog,
    progress: ProgressStore,
    checkpoint_every: usize,
    summary: SinkSummary,
}

impl CollectionSink {
    pub fn new(
        workflow: impl Into<String>,
        store: ArtifactStore,
        failures: FailureLog,
        progress: ProgressStore,
        checkpoint_every: usize,
    ) -> Self {
        Self {
            workflow: workflow.into(),
            failures,
            progress,
            checkpoint_every: checkpoint_every.max(1),
            summary: SinkSummary {
                store,
                collected: Vec::new(),
                markets: Vec::new(),
                failed: 0,
                write_errors: 0,
                last_key: None,
            },
        }
    }

    /// 태스크 시작.
    ///
    /// 반환된 송신자를 모두 drop하면 태스크가 끝나고 요약을 돌려줍니다.
    pub fn spawn(self) -> (mpsc::Sender<Completion>, JoinHandle<SinkSummary>) {
        let (tx, rx) = mpsc::channel(COMPLETION_BUFFER);
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    /// 채널이 닫힐 때까지 결과 기록.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Completion>) -> SinkSummary {
        while let Some(completion) = rx.recv().await {
            self.handle(completion).await;

            let handled = self.summary.handled();
            if handled % self.checkpoint_every == 0 {
                self.save_progress(CheckpointStatus::Running).await;
            }
        }

        debug!(
            workflow = %self.workflow,
            collected = self.summary.collected.len(),
            failed = self.summary.failed,
            "기록 태스크 종료"
        );
        self.summary
    }

    async fn handle(&mut self, completion: Completion) {
        match completion {
            Completion::Collected { key, items } => {
                match self.summary.store.save(&key, &items, Utc::now()).await {
                    Ok(path) => {
                        info!(
                            key = %key,
                            markets = items.len(),
                            file = %path.display(),
                            "산출물 저장 완료"
                        );
                        self.summary.markets.extend(items);
                        self.summary.collected.push(key.clone());
                    }
                    Err(e) => {
                        // 파일이 없으므로 다음 실행에서 다시 수집됨
                        error!(key = %key, error = %e, "산출물 저장 실패");
                        self.summary.write_errors += 1;
                    }
                }
                self.summary.last_key = Some(key);
            }
            Completion::Failed(record) => {
                self.failures.record(&record).await;
                self.summary.failed += 1;
                self.summary.last_key = Some(record.key);
            }
        }
    }

    async fn save_progress(&self, status: CheckpointStatus) {
        let last_key = self
            .summary
            .last_key
            .as_ref()
            .map(Key::as_str)
            .unwrap_or_default();
        let total = self.summary.handled();
        match self
            .progress
            .save_progress(&self.workflow, last_key, total, status)
            .await
        {
            Ok(()) => info!(workflow = %self.workflow, total, last_key, "진행 상태 저장"),
            Err(e) => error!(workflow = %self.workflow, error = %e, "진행 상태 저장 실패"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn sink_in(dir: &std::path::Path, every: usize) -> CollectionSink {
        let store = ArtifactStore::open_in(dir).await.unwrap();
        CollectionSink::new(
            "markets",
            store,
            FailureLog::new(dir),
            ProgressStore::new(dir),
            every,
        )
    }

    #[tokio::test]
    async fn test_collected_and_failed_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, handle) = sink_in(dir.path(), 10).await.spawn();

        tx.send(Completion::Collected {
            key: Key::from("A"),
            items: vec![Item::from(json!({ "ticker": "A-1" }))],
        })
        .await
        .unwrap();
        let failure = FailureRecord::new(Key::from("B"), "boom");
        let failure_file = FailureLog::new(dir.path()).path_for(failure.timestamp);
        tx.send(Completion::Failed(failure)).await.unwrap();
        drop(tx);

        let summary = handle.await.unwrap();
        assert_eq!(summary.collected, vec![Key::from("A")]);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.markets.len(), 1);
        assert!(summary.store.contains("A"));
        assert!(!summary.store.contains("B"));

        let log = tokio::fs::read_to_string(failure_file).await.unwrap();
        assert!(log.contains("Failed to collect B - boom"));
    }

    #[tokio::test]
    async fn test_progress_is_saved_every_n() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, handle) = sink_in(dir.path(), 2).await.spawn();

        for key in ["A", "B", "C"] {
            tx.send(Completion::Collected {
                key: Key::from(key),
                items: vec![Item::from(json!({ "ticker": key }))],
            })
            .await
            .unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        let progress = ProgressStore::new(dir.path())
            .load_progress("markets")
            .await
            .unwrap();
        assert_eq!(progress.total_processed, 2);
        assert_eq!(progress.last_key.as_deref(), Some("B"));
        assert_eq!(progress.status, CheckpointStatus::Running);
    }
}
