//! 환경변수 기반 설정 모듈.

use std::path::PathBuf;
use std::time::Duration;

use harvest_exchange::KalshiConfig;

use crate::Result;

/// 기본 데이터 루트 디렉토리
pub const DEFAULT_DATA_DIR: &str = "historical_data";

/// 동시 작업자 수 상한 (원격 rate limit 때문에 보수적으로 유지)
pub const MAX_WORKERS: usize = 4;

/// Collector 전체 설정.
///
/// 실행 중에는 변경되지 않으며 오케스트레이터에 참조로 전달됩니다.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 데이터 루트 디렉토리
    pub data_dir: PathBuf,
    /// 거래소 연결 설정
    pub exchange: KalshiConfig,
    /// 이벤트 수집 설정
    pub events: EventCollectConfig,
    /// 마켓 수집 설정
    pub markets: MarketCollectConfig,
    /// 데몬 모드 설정
    pub daemon: DaemonConfig,
}

/// 이벤트 수집 설정
#[derive(Debug, Clone)]
pub struct EventCollectConfig {
    /// 상태 필터 (None이면 전체)
    pub status: Option<String>,
    /// 페이지 크기
    pub page_limit: u32,
    /// 최대 페이지 수
    pub page_cap: Option<usize>,
}

/// 마켓 수집 설정
#[derive(Debug, Clone)]
pub struct MarketCollectConfig {
    /// 실행당 새로 처리할 최대 키 수 (None이면 무제한)
    pub max_new_keys: Option<usize>,
    /// 키당 최대 시도 횟수
    pub retry_budget: u32,
    /// 지수 백오프 기본 간격 (밀리초)
    pub backoff_base_ms: u64,
    /// 빈 응답 재시도 간격 (밀리초)
    pub empty_retry_delay_ms: u64,
    /// N개 처리마다 진행 상태 저장
    pub checkpoint_every: usize,
    /// 동시 작업자 수 (1..=4)
    pub workers: usize,
}

/// 데몬 모드 설정
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// 워크플로우 실행 주기 (분 단위)
    pub interval_minutes: u64,
}

impl Default for EventCollectConfig {
    fn default() -> Self {
        Self {
            status: Some("open".to_string()),
            page_limit: 100,
            page_cap: None,
        }
    }
}

impl Default for MarketCollectConfig {
    fn default() -> Self {
        Self {
            max_new_keys: None,
            retry_budget: 3,
            backoff_base_ms: 1000,
            empty_retry_delay_ms: 1000,
            checkpoint_every: 10,
            workers: 1,
        }
    }
}

impl CollectorConfig {
    /// 기본값으로 생성.
    pub fn new(data_dir: impl Into<PathBuf>, exchange: KalshiConfig) -> Self {
        Self {
            data_dir: data_dir.into(),
            exchange,
            events: EventCollectConfig::default(),
            markets: MarketCollectConfig::default(),
            daemon: DaemonConfig {
                interval_minutes: 60,
            },
        }
    }

    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let exchange = KalshiConfig::from_env()?;

        let status = std::env::var("HARVEST_EVENT_STATUS").unwrap_or_else(|_| "open".to_string());

        Ok(Self {
            data_dir: Self::data_dir_from_env(),
            exchange,
            events: EventCollectConfig {
                status: Some(status).filter(|s| !s.is_empty()),
                page_limit: env_var_parse("HARVEST_PAGE_LIMIT", 100),
                page_cap: env_var_opt("HARVEST_PAGE_CAP"),
            },
            markets: MarketCollectConfig {
                max_new_keys: env_var_opt("HARVEST_MAX_NEW_KEYS"),
                retry_budget: env_var_parse("HARVEST_RETRY_BUDGET", 3),
                backoff_base_ms: env_var_parse("HARVEST_BACKOFF_BASE_MS", 1000),
                empty_retry_delay_ms: env_var_parse("HARVEST_EMPTY_RETRY_DELAY_MS", 1000),
                checkpoint_every: env_var_parse("HARVEST_CHECKPOINT_EVERY", 10),
                workers: env_var_parse("HARVEST_WORKERS", 1),
            },
            daemon: DaemonConfig {
                interval_minutes: env_var_parse("DAEMON_INTERVAL_MINUTES", 60),
            },
        })
    }

    /// 데이터 루트 디렉토리만 로드 (거래소 자격 증명이 필요 없는 명령용)
    pub fn data_dir_from_env() -> PathBuf {
        dotenvy::dotenv().ok();
        std::env::var("HARVEST_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR))
    }
}

impl MarketCollectConfig {
    /// 백오프 기본 간격을 Duration으로 반환
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// 빈 응답 재시도 간격을 Duration으로 반환
    pub fn empty_retry_delay(&self) -> Duration {
        Duration::from_millis(self.empty_retry_delay_ms)
    }

    /// 유효 범위로 제한한 작업자 수
    pub fn effective_workers(&self) -> usize {
        self.workers.clamp(1, MAX_WORKERS)
    }

    /// 유효 범위로 제한한 체크포인트 주기
    pub fn effective_checkpoint_every(&self) -> usize {
        self.checkpoint_every.max(1)
    }
}

impl DaemonConfig {
    /// 워크플로우 실행 주기를 Duration으로 반환
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 선택 값 파싱 (없거나 0이면 None)
fn env_var_opt(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workers_are_clamped() {
        let mut markets = MarketCollectConfig::default();
        markets.workers = 0;
        assert_eq!(markets.effective_workers(), 1);
        markets.workers = 16;
        assert_eq!(markets.effective_workers(), MAX_WORKERS);
        markets.workers = 3;
        assert_eq!(markets.effective_workers(), 3);
    }

    #[test]
    fn test_defaults() {
        let markets = MarketCollectConfig::default();
        assert_eq!(markets.retry_budget, 3);
        assert_eq!(markets.checkpoint_every, 10);
        assert_eq!(markets.backoff_base(), Duration::from_secs(1));

        let events = EventCollectConfig::default();
        assert_eq!(events.status.as_deref(), Some("open"));
        assert!(events.page_cap.is_none());
    }
}
