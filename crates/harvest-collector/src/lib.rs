//! 카탈로그 수집기.
//!
//! 이 crate는 거래소 카탈로그(이벤트, 마켓)를 재개 가능하게 수집하는 바이너리를 제공합니다:
//! - 이벤트 목록 전체 조회 및 스냅샷 간 변경 추적
//! - 이벤트별 마켓 수집 (이미 처리된 키는 건너뜀)
//! - 수집 이력 체크포인트와 진행 상태 관리

pub mod config;
pub mod error;
pub mod modules;
pub mod orchestrator;
pub mod stats;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use orchestrator::{
    recover_progress, CollectionOrchestrator, EventsOutcome, MarketsOutcome, RunPhase, RunReport,
};
pub use stats::CollectionStats;
