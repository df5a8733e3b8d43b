//! 수집 워크플로우 오케스트레이터.
//!
//! # 실행 단계
//!
//! ```text
//! Init → Paginate → Diff → CollectLoop → Finalize → Done
//!            └─ 항목 0개 + 이전 체크포인트 없음 → Failed
//! ```
//!
//! - **Paginate**: 이벤트 목록 전체 조회, 스냅샷 저장, 이벤트 체크포인트 기록
//! - **Diff**: 직전 기록의 스냅샷 대비 추가/삭제된 키 계산 (`total_change`와 같은 기준)
//! - **CollectLoop**: 아직 산출물이 없는 키만 제한된 동시성으로 수집
//! - **Finalize**: 집계 산출물, 마켓 체크포인트, 진행 상태 기록
//!
//! Finalize는 취소나 인증 에러로 루프가 끝나도 항상 실행됩니다.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use harvest_exchange::{
    derive_key, fetch_all, CatalogApi, ExchangeError, FetchOptions, Item, Key, StopReason,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::modules::artifacts::{aggregate_path, events_snapshot_path};
use crate::modules::storage::write_json_atomic;
use crate::modules::{
    AggregateArtifact, ArtifactStore, CheckpointDomain, CheckpointStatus, CheckpointStore,
    CollectOutcome, CollectionRecord, CollectionSink, Completion, Diff, EventsSnapshot,
    FailureLog, MarketCollector, ProgressStore, RecoverySummary, RetryPolicy, RunStatus,
};
use crate::{CollectionStats, CollectorConfig, CollectorError, Result};

/// 이벤트 워크플로우 이름
pub const EVENTS_WORKFLOW: &str = "events";
/// 마켓 워크플로우 이름
pub const MARKETS_WORKFLOW: &str = "markets";

/// 실행 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Paginate,
    Diff,
    CollectLoop,
    Finalize,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Paginate => "paginate",
            Self::Diff => "diff",
            Self::CollectLoop => "collect_loop",
            Self::Finalize => "finalize",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn enter(phase: RunPhase) {
    info!(phase = %phase, "단계 진입");
}

/// 이벤트 수집 결과
#[derive(Debug)]
pub struct EventsOutcome {
    /// 이번 실행의 이벤트 목록 (재사용 시 이전 스냅샷)
    pub items: Vec<Item>,
    pub snapshot_file: Option<PathBuf>,
    /// 기록된 체크포인트 (재사용 시 None)
    pub record: Option<CollectionRecord>,
    pub pages: usize,
    pub stop_reason: StopReason,
    /// 이전 스냅샷을 재사용했는지 여부
    pub reused: bool,
    pub stats: CollectionStats,
}

/// 마켓 수집 결과
#[derive(Debug)]
pub struct MarketsOutcome {
    pub status: RunStatus,
    /// 이번 실행에서 새로 처리된 키
    pub newly_processed: Vec<Key>,
    pub aggregate_file: Option<PathBuf>,
    pub record: Option<CollectionRecord>,
    pub stats: CollectionStats,
}

/// 전체 실행 결과
#[derive(Debug)]
pub struct RunReport {
    pub phase: RunPhase,
    pub events: EventsOutcome,
    pub markets: MarketsOutcome,
}

/// 수집 오케스트레이터.
pub struct CollectionOrchestrator {
    config: CollectorConfig,
    api: Arc<dyn CatalogApi>,
}

impl CollectionOrchestrator {
    pub fn new(config: CollectorConfig, api: Arc<dyn CatalogApi>) -> Self {
        Self { config, api }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// 전체 워크플로우 실행 (이벤트 → 마켓).
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport> {
        enter(RunPhase::Init);
        self.init().await;

        let events = match self.collect_events(cancel).await {
            Ok(events) => events,
            Err(e) => {
                enter(RunPhase::Failed);
                return Err(e);
            }
        };

        let markets = match self.collect_markets(&events.items, cancel).await {
            Ok(markets) => markets,
            Err(e) => {
                enter(RunPhase::Failed);
                return Err(e);
            }
        };

        enter(RunPhase::Done);
        Ok(RunReport {
            phase: RunPhase::Done,
            events,
            markets,
        })
    }

    /// 최신 이벤트 스냅샷 기준으로 마켓만 수집.
    pub async fn run_markets_only(&self, cancel: &CancellationToken) -> Result<MarketsOutcome> {
        enter(RunPhase::Init);
        self.init().await;

        let events = CheckpointStore::new(&self.config.data_dir, CheckpointDomain::Events)
            .previous_event_items()
            .await;
        if events.is_empty() {
            error!("이벤트 스냅샷이 없습니다. 먼저 이벤트를 수집하세요");
            enter(RunPhase::Failed);
            return Err(CollectorError::NoItems);
        }
        info!(events = events.len(), "최신 이벤트 스냅샷 로드");

        let markets = self.collect_markets(&events, cancel).await?;
        enter(RunPhase::Done);
        Ok(markets)
    }

    /// 이전 프로세스가 실행 중에 죽었으면 중단 상태로 정리.
    async fn init(&self) {
        info!(
            data_dir = %self.config.data_dir.display(),
            workers = self.config.markets.effective_workers(),
            max_new_keys = ?self.config.markets.max_new_keys,
            "수집 설정"
        );

        let progress = ProgressStore::new(&self.config.data_dir);
        if let Err(e) = progress.mark_interrupted(MARKETS_WORKFLOW).await {
            warn!(error = %e, "진행 상태 정리 실패");
        }
        if let Some(last_key) = progress.resume_point(MARKETS_WORKFLOW).await {
            info!(last_key = %last_key, "이전 실행이 중단됨, 처리되지 않은 키부터 이어서 수집");
        }
    }

    /// 이벤트 목록 수집 (Paginate + Diff).
    pub async fn collect_events(&self, cancel: &CancellationToken) -> Result<EventsOutcome> {
        enter(RunPhase::Paginate);
        let start = Instant::now();
        let mut stats = CollectionStats::new();
        let now = Utc::now();
        let reference_date = now.date_naive();

        let store = CheckpointStore::new(&self.config.data_dir, CheckpointDomain::Events);
        let latest = store.latest().await;
        // 새 스냅샷을 쓰기 전에 이전 스냅샷을 읽어 둠
        let previous = match &latest {
            Some(record) => store.snapshot_items(record).await,
            None => Vec::new(),
        };

        let api = self.api.clone();
        let status = self.config.events.status.clone();
        let result = fetch_all(
            move |cursor| {
                let api = api.clone();
                let status = status.clone();
                async move { api.list_events(cursor, status.as_deref()).await }
            },
            FetchOptions::default().with_page_cap(self.config.events.page_cap),
            cancel,
        )
        .await;

        let complete = result.is_complete();
        if let Some(e) = result.error {
            if e.is_fatal() {
                error!(error = %e, "이벤트 조회 중 치명적 에러");
                return Err(e.into());
            }
            warn!(error = %e, collected = result.items.len(), "이벤트 조회 중단, 부분 결과 사용");
        }

        info!(
            events = result.items.len(),
            pages = result.pages,
            stop_reason = ?result.stop_reason,
            "이벤트 조회 완료"
        );

        if result.items.is_empty() {
            let Some(latest) = latest else {
                error!("이벤트가 없고 이전 체크포인트도 없습니다");
                return Err(CollectorError::NoItems);
            };
            let previous_file = store.resolve(&latest.output_file);
            warn!(
                previous_file = %previous_file.display(),
                previous_events = previous.len(),
                "이벤트가 없어 이전 스냅샷을 재사용합니다"
            );
            stats.total = previous.len();
            stats.elapsed = start.elapsed();
            return Ok(EventsOutcome {
                items: previous,
                snapshot_file: Some(previous_file),
                record: None,
                pages: result.pages,
                stop_reason: result.stop_reason,
                reused: true,
                stats,
            });
        }

        let items = result.items;
        let snapshot_file = events_snapshot_path(&self.config.data_dir, now);
        write_json_atomic(&snapshot_file, &EventsSnapshot::new(now, items.clone())).await?;
        info!(file = %snapshot_file.display(), "이벤트 스냅샷 저장");

        enter(RunPhase::Diff);
        let diff = diff_items(&items, &previous, reference_date);
        log_diff(&diff, &items, reference_date);

        let run_status = if complete {
            RunStatus::Completed
        } else {
            RunStatus::Interrupted
        };
        let record = store
            .append(
                CollectionRecord::new(now, items.len(), &snapshot_file, diff)
                    .with_status(run_status),
            )
            .await?;

        stats.total = items.len();
        stats.success = items.len();
        stats.unkeyed = items
            .iter()
            .filter(|item| derive_key(item, reference_date).is_none())
            .count();
        stats.elapsed = start.elapsed();
        stats.log_summary("이벤트 수집");

        Ok(EventsOutcome {
            items,
            snapshot_file: Some(snapshot_file),
            record: Some(record),
            pages: result.pages,
            stop_reason: result.stop_reason,
            reused: false,
            stats,
        })
    }

    /// 키별 마켓 수집 (CollectLoop + Finalize).
    ///
    /// 인증 에러가 나면 진행 중인 작업을 취소하고 Finalize를 마친 뒤 에러를 반환합니다.
    pub async fn collect_markets(
        &self,
        events: &[Item],
        cancel: &CancellationToken,
    ) -> Result<MarketsOutcome> {
        enter(RunPhase::CollectLoop);
        let start = Instant::now();
        let mut stats = CollectionStats::new();
        let markets_config = &self.config.markets;
        let data_dir = &self.config.data_dir;

        let store = ArtifactStore::open_in(data_dir).await?;
        let keys_before = store.keys();

        let candidates = unique_keys(events, Utc::now().date_naive(), &mut stats);
        let mut pending: Vec<Key> = candidates
            .into_iter()
            .filter(|key| !store.contains(key.as_str()))
            .collect();
        stats.skipped = stats.total - pending.len();

        let capped = match markets_config.max_new_keys {
            Some(max) if pending.len() > max => {
                stats.deferred = pending.len() - max;
                pending.truncate(max);
                true
            }
            _ => false,
        };

        info!(
            candidates = stats.total,
            pending = pending.len(),
            skipped = stats.skipped,
            deferred = stats.deferred,
            unkeyed = stats.unkeyed,
            "수집 대상 결정"
        );

        let progress = ProgressStore::new(data_dir);
        if let Err(e) = progress
            .save_progress(MARKETS_WORKFLOW, "", 0, CheckpointStatus::Running)
            .await
        {
            warn!(error = %e, "진행 상태 저장 실패");
        }

        let (tx, sink) = CollectionSink::new(
            MARKETS_WORKFLOW,
            store,
            FailureLog::new(data_dir),
            progress.clone(),
            markets_config.effective_checkpoint_every(),
        )
        .spawn();

        let run_cancel = cancel.child_token();
        let collector = MarketCollector::new(
            self.api.clone(),
            RetryPolicy::from_config(markets_config),
        );
        let total = pending.len();
        let mut fatal: Option<ExchangeError> = None;

        let mut results = stream::iter(pending.into_iter().enumerate())
            .map(|(idx, key)| {
                let collector = collector.clone();
                let run_cancel = run_cancel.clone();
                async move {
                    let result = collector.collect(&key, &run_cancel).await;
                    (idx, key, result)
                }
            })
            .buffer_unordered(markets_config.effective_workers());

        while let Some((idx, key, result)) = results.next().await {
            let completion = match result {
                Ok(CollectOutcome::Collected(items)) => {
                    info!(
                        key = %key,
                        markets = items.len(),
                        progress = format!("{}/{}", idx + 1, total),
                        "마켓 수집"
                    );
                    Completion::Collected { key, items }
                }
                Ok(CollectOutcome::Failed(record)) => {
                    error!(
                        key = %key,
                        error = %record.error,
                        progress = format!("{}/{}", idx + 1, total),
                        "마켓 수집 실패"
                    );
                    Completion::Failed(record)
                }
                Ok(CollectOutcome::Cancelled) => continue,
                Err(e) => {
                    error!(key = %key, error = %e, "치명적 에러, 남은 작업 취소");
                    run_cancel.cancel();
                    fatal.get_or_insert(e);
                    continue;
                }
            };

            if tx.send(completion).await.is_err() {
                error!("기록 태스크가 종료되어 수집을 중단합니다");
                run_cancel.cancel();
                break;
            }
        }
        drop(results);
        drop(tx);

        enter(RunPhase::Finalize);
        let summary = sink.await?;

        let status = if run_cancel.is_cancelled() {
            RunStatus::Interrupted
        } else if capped {
            RunStatus::Capped
        } else {
            RunStatus::Completed
        };

        stats.success = summary.collected.len();
        stats.errors = summary.failed + summary.write_errors;
        stats.total_items = summary.markets.len();

        let now = Utc::now();
        let aggregate_file = aggregate_path(data_dir, now);
        let aggregate = AggregateArtifact::new(now, summary.markets, summary.collected.len());
        write_json_atomic(&aggregate_file, &aggregate).await?;
        info!(
            file = %aggregate_file.display(),
            markets = aggregate.total_markets,
            open_markets = aggregate.total_open_markets,
            events = aggregate.events_processed,
            "집계 산출물 저장"
        );

        let keys_after = summary.store.keys();
        let diff = CheckpointStore::diff(&keys_after, &keys_before);
        let record = CheckpointStore::new(data_dir, CheckpointDomain::Markets)
            .append(
                CollectionRecord::new(now, summary.store.len(), &aggregate_file, diff)
                    .with_status(status),
            )
            .await?;

        let handled = stats.success + stats.errors;
        let final_progress = match status {
            RunStatus::Interrupted => CheckpointStatus::Interrupted,
            RunStatus::Completed | RunStatus::Capped => CheckpointStatus::Completed,
        };
        let last_key = match final_progress {
            CheckpointStatus::Interrupted => summary.last_key.as_ref().map(Key::as_str),
            _ => None,
        };
        if let Err(e) = progress
            .save_progress(
                MARKETS_WORKFLOW,
                last_key.unwrap_or_default(),
                handled,
                final_progress,
            )
            .await
        {
            warn!(error = %e, "진행 상태 저장 실패");
        }

        stats.elapsed = start.elapsed();
        stats.log_summary("마켓 수집");
        info!(
            status = ?status,
            processed_total = summary.store.len(),
            "마켓 수집 종료"
        );

        if let Some(e) = fatal {
            return Err(e.into());
        }

        Ok(MarketsOutcome {
            status,
            newly_processed: summary.collected,
            aggregate_file: Some(aggregate_file),
            record: Some(record),
            stats,
        })
    }
}

/// 디스크의 키별 산출물로 마켓 진행 상태 재구성.
///
/// 산출물이 하나도 없으면 남아 있던 진행 상태를 지우고, 있으면 처리 수를 다시 기록합니다.
pub async fn recover_progress(data_dir: &Path) -> Result<RecoverySummary> {
    let store = ArtifactStore::open_in(data_dir).await?;
    let summary = store.recover().await;

    let progress = ProgressStore::new(data_dir);
    if summary.keys == 0 {
        progress.clear_progress(MARKETS_WORKFLOW).await?;
    } else {
        progress
            .save_progress(MARKETS_WORKFLOW, "", summary.keys, CheckpointStatus::Idle)
            .await?;
    }

    info!(
        keys = summary.keys,
        total_markets = summary.total_markets,
        unreadable = summary.unreadable,
        "산출물 기준 진행 상태 복구 완료"
    );
    Ok(summary)
}

/// 항목에서 키를 도출해 순서대로 중복 제거.
fn unique_keys(items: &[Item], reference_date: NaiveDate, stats: &mut CollectionStats) -> Vec<Key> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for item in items {
        match derive_key(item, reference_date) {
            Some(key) => {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
            None => stats.unkeyed += 1,
        }
    }
    stats.total = keys.len();
    keys
}

fn diff_items(current: &[Item], previous: &[Item], reference_date: NaiveDate) -> Diff {
    let current: Vec<Key> = current
        .iter()
        .filter_map(|item| derive_key(item, reference_date))
        .collect();
    let previous: Vec<Key> = previous
        .iter()
        .filter_map(|item| derive_key(item, reference_date))
        .collect();
    CheckpointStore::diff(&current, &previous)
}

/// 변경 요약 로그 (새 이벤트는 제목/카테고리 포함, 최대 10개).
fn log_diff(diff: &Diff, items: &[Item], reference_date: NaiveDate) {
    if diff.is_empty() {
        info!("이벤트 변경 없음");
        return;
    }
    info!(
        added = diff.total_added,
        removed = diff.total_removed,
        "이벤트 변경"
    );

    let added: HashSet<&Key> = diff.added.iter().collect();
    for item in items
        .iter()
        .filter(|item| {
            derive_key(item, reference_date).is_some_and(|key| added.contains(&key))
        })
        .take(10)
    {
        info!(title = item.title(), category = item.category(), "새 이벤트");
    }
}
