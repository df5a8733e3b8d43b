//! 카탈로그 API trait 정의.

use async_trait::async_trait;

use crate::types::{Item, Page};
use crate::ExchangeError;

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 읽기 전용 카탈로그 인터페이스.
///
/// 수집 엔진이 원격 거래소에 요구하는 기능은 이 두 가지뿐입니다.
/// 테스트에서는 이 trait의 목(mock) 구현을 사용합니다.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// 이벤트 목록 한 페이지 조회.
    ///
    /// * `cursor` - 이전 페이지가 돌려준 커서 (첫 페이지는 `None`)
    /// * `status` - 상태 필터 (예: `"open"`)
    async fn list_events(&self, cursor: Option<String>, status: Option<&str>)
        -> ExchangeResult<Page>;

    /// 이벤트 하나에 속한 마켓 목록 조회.
    async fn list_markets(&self, event_ticker: &str) -> ExchangeResult<Vec<Item>>;
}
