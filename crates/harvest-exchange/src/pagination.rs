//! 커서 기반 페이지네이션.
//!
//! 목록 엔드포인트를 끝까지 순회하며 모든 항목을 도착 순서대로 모읍니다.
//!
//! # 종료 조건
//!
//! - 다음 커서가 없거나 빈 문자열
//! - 다음 커서가 현재 커서와 동일 (원격 버그로 인한 무한 루프 방지)
//! - 페이지 상한 도달
//! - 빈 페이지 수신
//! - 취소 신호
//! - 전송/프로토콜 에러 (그때까지 모은 항목은 에러와 함께 반환)

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{Item, Page};
use crate::ExchangeError;

/// 페이지네이션 종료 사유.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 다음 커서 없음
    Exhausted,
    /// 커서가 갱신되지 않음
    StagnantCursor,
    /// 페이지 상한 도달
    PageCap,
    /// 빈 페이지
    EmptyPage,
    /// 취소됨
    Cancelled,
    /// 에러로 중단
    Error,
}

/// 항목 필터.
pub type ItemFilter = dyn Fn(&Item) -> bool + Send + Sync;

/// 페이지네이션 옵션.
#[derive(Default)]
pub struct FetchOptions<'a> {
    /// 최대 페이지 수 (`None`이면 무제한)
    pub page_cap: Option<usize>,
    /// 포함할 항목 조건
    pub filter: Option<&'a ItemFilter>,
}

impl<'a> FetchOptions<'a> {
    pub fn with_page_cap(mut self, page_cap: Option<usize>) -> Self {
        self.page_cap = page_cap;
        self
    }

    pub fn with_filter(mut self, filter: &'a ItemFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// 페이지네이션 결과.
///
/// 에러가 나더라도 이전 페이지들의 항목은 버리지 않습니다.
/// 부분 결과를 받아들일지는 호출자가 결정합니다.
#[derive(Debug)]
pub struct PagedResult {
    pub items: Vec<Item>,
    /// 요청한 페이지 수
    pub pages: usize,
    pub stop_reason: StopReason,
    pub error: Option<ExchangeError>,
}

impl PagedResult {
    /// 에러 없이 끝났는지 확인.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.stop_reason != StopReason::Cancelled
    }
}

/// 목록 엔드포인트를 끝까지 순회.
///
/// `list_fn`은 커서를 받아 한 페이지를 반환합니다. 첫 호출의 커서는 `None`입니다.
/// rate limiting과 서명은 `list_fn` 쪽(클라이언트)에서 처리됩니다.
pub async fn fetch_all<F, Fut>(
    mut list_fn: F,
    options: FetchOptions<'_>,
    cancel: &CancellationToken,
) -> PagedResult
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page, ExchangeError>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    let finish = |items, pages, stop_reason, error| PagedResult {
        items,
        pages,
        stop_reason,
        error,
    };

    loop {
        if options.page_cap.is_some_and(|cap| pages >= cap) {
            info!(pages, "페이지 상한 도달");
            return finish(items, pages, StopReason::PageCap, None);
        }

        if cancel.is_cancelled() {
            return finish(items, pages, StopReason::Cancelled, None);
        }

        pages += 1;
        debug!(page = pages, cursor = ?cursor, "페이지 조회");

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                return finish(items, pages - 1, StopReason::Cancelled, None);
            }
            result = list_fn(cursor.clone()) => result,
        };

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(page = pages, error = %e, collected = items.len(), "페이지 조회 실패, 부분 결과 반환");
                return finish(items, pages, StopReason::Error, Some(e));
            }
        };

        if page.items.is_empty() {
            debug!(page = pages, "빈 페이지, 순회 종료");
            return finish(items, pages, StopReason::EmptyPage, None);
        }

        let fetched = page.items.len();
        match options.filter {
            Some(filter) => items.extend(page.items.into_iter().filter(|item| filter(item))),
            None => items.extend(page.items),
        }
        info!(page = pages, fetched, total = items.len(), "페이지 수신");

        let next = page.cursor.filter(|c| !c.is_empty());
        match next {
            None => return finish(items, pages, StopReason::Exhausted, None),
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                warn!(cursor = %next, "커서가 갱신되지 않음, 순회 종료");
                return finish(items, pages, StopReason::StagnantCursor, None);
            }
            Some(next) => cursor = Some(next),
        }
    }
}
