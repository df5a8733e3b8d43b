//! Catalog harvester CLI.

use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use harvest_collector::modules::{CheckpointDomain, CheckpointStore, ProgressStore};
use harvest_collector::{recover_progress, CollectionOrchestrator, CollectorConfig};
use harvest_exchange::KalshiClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "harvest-collector")]
#[command(about = "Resumable event/market catalog harvester", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 실행당 새로 처리할 최대 키 수
    #[arg(long, global = true)]
    max_keys: Option<usize>,

    /// 동시 작업자 수 (1-4)
    #[arg(long, global = true)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// 전체 워크플로우 실행 (이벤트 → 마켓)
    Run,

    /// 이벤트 목록만 수집
    Events,

    /// 최신 이벤트 스냅샷 기준으로 마켓만 수집
    Markets,

    /// 데몬 모드: 주기적으로 전체 워크플로우 실행
    Daemon,

    /// 체크포인트 이력과 진행 상태 출력
    Checkpoints,

    /// 디스크의 산출물로 마켓 진행 상태 재구성
    Recover,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "harvest_collector={0},harvest_exchange={0}",
                    cli.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Catalog Harvester 시작");

    // 자격 증명이 필요 없는 명령
    match cli.command {
        Commands::Checkpoints => {
            print_checkpoints(&CollectorConfig::data_dir_from_env()).await;
            return Ok(());
        }
        Commands::Recover => {
            recover(&CollectorConfig::data_dir_from_env()).await?;
            return Ok(());
        }
        _ => {}
    }

    // 설정 로드
    let mut config = CollectorConfig::from_env()?;
    if let Some(max_keys) = cli.max_keys {
        config.markets.max_new_keys = Some(max_keys).filter(|m| *m > 0);
    }
    if let Some(workers) = cli.workers {
        config.markets.workers = workers;
    }
    tracing::debug!(exchange = ?config.exchange, "설정 로드 완료");

    let client = KalshiClient::new(config.exchange.clone())?
        .with_page_limit(config.events.page_limit);
    tracing::info!(base_url = %config.exchange.rest_base_url(), "거래소 클라이언트 생성");

    let interval_minutes = config.daemon.interval_minutes;
    let interval_period = config.daemon.interval();
    let orchestrator = CollectionOrchestrator::new(config, Arc::new(client));

    // Ctrl-C → 실행 취소 (진행 중인 작업은 Finalize 후 종료)
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("종료 신호 수신, 정리 중...");
                cancel.cancel();
            }
        });
    }

    // 명령 실행
    match cli.command {
        Commands::Run => {
            let report = orchestrator.run(&cancel).await?;
            tracing::info!(
                phase = %report.phase,
                events = report.events.items.len(),
                markets_status = ?report.markets.status,
                newly_processed = report.markets.newly_processed.len(),
                "=== 전체 워크플로우 완료 ==="
            );
        }
        Commands::Events => {
            let events = orchestrator.collect_events(&cancel).await?;
            tracing::info!(
                events = events.items.len(),
                reused = events.reused,
                "이벤트 수집 종료"
            );
        }
        Commands::Markets => {
            let markets = orchestrator.run_markets_only(&cancel).await?;
            tracing::info!(
                status = ?markets.status,
                newly_processed = markets.newly_processed.len(),
                "마켓 수집 종료"
            );
        }
        Commands::Daemon => {
            tracing::info!("=== 데몬 모드 시작 (주기: {}분) ===", interval_minutes);

            let mut interval = tokio::time::interval(interval_period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("데몬 종료 중...");
                        break;
                    }
                    _ = interval.tick() => {
                        tracing::info!("=== 워크플로우 실행 시작 ===");

                        match orchestrator.run(&cancel).await {
                            Ok(report) => {
                                tracing::info!(
                                    markets_status = ?report.markets.status,
                                    newly_processed = report.markets.newly_processed.len(),
                                    "워크플로우 실행 완료"
                                );
                            }
                            Err(e) => {
                                tracing::error!("워크플로우 실행 실패: {}", e);
                            }
                        }

                        tracing::info!(
                            "=== 워크플로우 완료, 다음 실행: {}분 후 ===",
                            interval_minutes
                        );
                    }
                }
            }
        }
        Commands::Checkpoints | Commands::Recover => {}
    }

    tracing::info!("Catalog Harvester 종료");

    Ok(())
}

/// 체크포인트 이력과 진행 상태 출력.
async fn print_checkpoints(data_dir: &Path) {
    for domain in [CheckpointDomain::Events, CheckpointDomain::Markets] {
        let checkpoint = CheckpointStore::new(data_dir, domain).load().await;
        if checkpoint.is_empty() {
            println!("[{}] 기록 없음", domain.as_str());
            continue;
        }
        println!("[{}] {}개 기록", domain.as_str(), checkpoint.collections.len());
        for record in &checkpoint.collections {
            println!(
                "  {} {}  total={:<6} +{:<4} -{:<4} change={:<6} status={:?}  {}",
                record.date,
                record.time,
                record.total_items,
                record.changes.total_added,
                record.changes.total_removed,
                record
                    .total_change
                    .map(|c| format!("{:+}", c))
                    .unwrap_or_else(|| "-".to_string()),
                record.status,
                record.output_file.display()
            );
        }
    }

    let progress = ProgressStore::new(data_dir).list_progress().await;
    println!("[progress] {}개 워크플로우", progress.len());
    for p in progress {
        println!(
            "  {:<8} status={:<11} processed={:<6} last_key={}  ({})",
            p.workflow,
            p.status.as_str(),
            p.total_processed,
            p.last_key.as_deref().unwrap_or("-"),
            p.updated_at.to_rfc3339()
        );
    }
}

/// 산출물 디렉토리를 스캔해 마켓 진행 상태 재구성.
async fn recover(data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let summary = recover_progress(data_dir).await?;
    println!(
        "처리 완료 키 {}개, 마켓 {}개 (읽기 실패 {}개)",
        summary.keys, summary.total_markets, summary.unreadable
    );
    Ok(())
}
