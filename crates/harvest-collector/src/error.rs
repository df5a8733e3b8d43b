//! 에러 타입 정의.

use harvest_exchange::ExchangeError;
use thiserror::Error;

/// Collector 에러 타입
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 파일 입출력 에러
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON 직렬화 에러
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// 거래소 에러 (인증 실패 등 치명적인 경우에만 전파)
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),
    /// 백그라운드 태스크 실패
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// 첫 실행에서 항목을 하나도 수집하지 못함
    #[error("No items collected and no previous checkpoint")]
    NoItems,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
