//! 거래소 카탈로그 연결.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - RequestSigner: RSA-PSS 요청 서명
//! - RateLimiter: 요청 간 최소 간격 게이트
//! - KalshiClient: 서명 + rate limiting이 적용된 REST 클라이언트
//! - CatalogApi trait: 수집 엔진이 사용하는 읽기 전용 인터페이스
//! - fetch_all: 커서 기반 페이지네이션

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod pagination;
pub mod rate_limiter;
pub mod traits;
pub mod types;

pub use auth::{AuthHeaders, RequestSigner};
pub use client::KalshiClient;
pub use config::{Environment, KalshiConfig};
pub use error::*;
pub use pagination::{fetch_all, FetchOptions, ItemFilter, PagedResult, StopReason};
pub use rate_limiter::RateLimiter;
pub use traits::*;
pub use types::{derive_key, open_markets, Item, Key, Page};
