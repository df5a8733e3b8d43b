//! 키(이벤트)별 마켓 수집 모듈.
//!
//! 키 하나에 대해 마켓 목록을 조회하고, 실패하거나 빈 응답이면 정해진 횟수만큼 재시도합니다.
//!
//! - 빈 응답: 고정 간격(`empty_delay`) 후 재시도
//! - 일시적 에러: 지수 백오프(`backoff_base * 2^attempt`) 후 재시도
//! - 인증 에러: 즉시 `Err` 반환 (실행 전체 중단)
//! - 재시도 소진: `Failed` (키는 처리 완료로 표시되지 않음)

use std::sync::Arc;
use std::time::Duration;

use harvest_exchange::{CatalogApi, ExchangeError, Item, Key};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::failures::FailureRecord;
use crate::config::MarketCollectConfig;

/// 재시도 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 키당 최대 시도 횟수
    pub budget: u32,
    /// 지수 백오프 기본 간격
    pub backoff_base: Duration,
    /// 빈 응답 재시도 간격
    pub empty_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget: 3,
            backoff_base: Duration::from_secs(1),
            empty_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &MarketCollectConfig) -> Self {
        Self {
            budget: config.retry_budget.max(1),
            backoff_base: config.backoff_base(),
            empty_delay: config.empty_retry_delay(),
        }
    }

    /// `attempt`(0부터) 번째 실패 후 대기 시간.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }
}

/// 키 하나의 수집 결과.
#[derive(Debug)]
pub enum CollectOutcome {
    /// 비어 있지 않은 마켓 목록
    Collected(Vec<Item>),
    /// 재시도 소진
    Failed(FailureRecord),
    /// 취소됨 (결과 없음)
    Cancelled,
}

/// 재시도 기반 마켓 수집기.
#[derive(Clone)]
pub struct MarketCollector {
    api: Arc<dyn CatalogApi>,
    policy: RetryPolicy,
}

impl MarketCollector {
    pub fn new(api: Arc<dyn CatalogApi>, policy: RetryPolicy) -> Self {
        Self { api, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 키 하나의 마켓 수집.
    ///
    /// 인증 에러처럼 재시도해도 소용없는 에러만 `Err`로 반환합니다.
    pub async fn collect(
        &self,
        key: &Key,
        cancel: &CancellationToken,
    ) -> Result<CollectOutcome, ExchangeError> {
        let budget = self.policy.budget.max(1);
        let mut last_error = String::new();

        for attempt in 0..budget {
            if cancel.is_cancelled() {
                return Ok(CollectOutcome::Cancelled);
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return Ok(CollectOutcome::Cancelled),
                result = self.api.list_markets(key.as_str()) => result,
            };

            let delay = match result {
                Ok(markets) if !markets.is_empty() => {
                    debug!(key = %key, markets = markets.len(), attempt = attempt + 1, "마켓 수집 완료");
                    return Ok(CollectOutcome::Collected(markets));
                }
                Ok(_) => {
                    // 데이터 없음
                    last_error = "No markets returned".to_string();
                    warn!(key = %key, attempt = attempt + 1, budget, "빈 응답, 재시도");
                    self.policy.empty_delay
                }
                Err(e) if !e.is_retryable() => {
                    if e.is_auth_error() {
                        tracing::error!(key = %key, error = %e, "인증 실패, 수집 중단");
                    } else {
                        tracing::error!(key = %key, error = %e, "치명적 에러, 수집 중단");
                    }
                    return Err(e);
                }
                Err(e) => {
                    warn!(key = %key, attempt = attempt + 1, budget, error = %e, "조회 실패, 재시도");
                    last_error = e.to_string();
                    self.policy.backoff_delay(attempt)
                }
            };

            if attempt + 1 < budget {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(CollectOutcome::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        tracing::error!(key = %key, budget, error = %last_error, "재시도 소진");
        Ok(CollectOutcome::Failed(FailureRecord::new(key.clone(), last_error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use harvest_exchange::{ExchangeResult, Page};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// 미리 정해둔 응답을 순서대로 돌려주는 목 API.
    struct ScriptedApi {
        responses: Mutex<VecDeque<ExchangeResult<Vec<Item>>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedApi {
        fn new(responses: Vec<ExchangeResult<Vec<Item>>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CatalogApi for ScriptedApi {
        async fn list_events(
            &self,
            _cursor: Option<String>,
            _status: Option<&str>,
        ) -> ExchangeResult<Page> {
            Ok(Page::default())
        }

        async fn list_markets(&self, _event_ticker: &str) -> ExchangeResult<Vec<Item>> {
            self.calls.lock().unwrap().push(Instant::now());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn market(ticker: &str) -> Item {
        Item::from(json!({ "ticker": ticker }))
    }

    #[test]
    fn test_backoff_is_exponential() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert!(policy.backoff_delay(64) >= policy.backoff_delay(63));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound_with_non_decreasing_gaps() {
        let api = ScriptedApi::new(vec![
            Err(ExchangeError::NetworkError("reset".into())),
            Err(ExchangeError::Timeout("slow".into())),
            Err(ExchangeError::RateLimited),
            Ok(vec![market("NEVER")]),
        ]);
        let collector = MarketCollector::new(api.clone(), RetryPolicy::default());

        let outcome = collector
            .collect(&Key::from("EVT"), &CancellationToken::new())
            .await
            .unwrap();

        let record = match outcome {
            CollectOutcome::Failed(record) => record,
            other => panic!("expected failure, got {other:?}"),
        };
        assert_eq!(record.key, Key::from("EVT"));
        assert!(record.error.contains("Rate limit exceeded"), "{}", record.error);

        let calls = api.call_times();
        assert_eq!(calls.len(), 3);
        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps.windows(2).all(|g| g[1] >= g[0]), "{gaps:?}");
        assert!(gaps[0] >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_empty_then_success() {
        let api = ScriptedApi::new(vec![
            Ok(Vec::new()),
            Ok(Vec::new()),
            Ok(vec![market("EVT-A"), market("EVT-B")]),
        ]);
        let collector = MarketCollector::new(api.clone(), RetryPolicy::default());

        let outcome = collector
            .collect(&Key::from("EVT"), &CancellationToken::new())
            .await
            .unwrap();

        match outcome {
            CollectOutcome::Collected(markets) => assert_eq!(markets.len(), 2),
            other => panic!("expected markets, got {other:?}"),
        }
        assert_eq!(api.call_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_empty_is_failure() {
        let api = ScriptedApi::new(Vec::new());
        let collector = MarketCollector::new(api.clone(), RetryPolicy::default());

        let outcome = collector
            .collect(&Key::from("EVT"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, CollectOutcome::Failed(_)));
        assert_eq!(api.call_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_error_is_not_retried() {
        let api = ScriptedApi::new(vec![Err(ExchangeError::Unauthorized("bad key".into()))]);
        let collector = MarketCollector::new(api.clone(), RetryPolicy::default());

        let result = collector
            .collect(&Key::from("EVT"), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ExchangeError::Unauthorized(_))));
        assert_eq!(api.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let api = ScriptedApi::new(vec![Err(ExchangeError::NetworkError("reset".into()))]);
        let collector = MarketCollector::new(api.clone(), RetryPolicy::default());
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { collector.collect(&Key::from("EVT"), &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();

        let outcome = task.await.unwrap().unwrap();
        assert!(matches!(outcome, CollectOutcome::Cancelled));
        assert_eq!(api.call_times().len(), 1);
    }
}
