//! 요청 간 최소 간격 제한.
//!
//! Token bucket이 아닌 최소 간격 게이트입니다. 버스트는 허용되지 않고,
//! 연속 호출은 정확히 `min_interval` 간격으로 평탄화됩니다.
//! 하나의 원격 엔드포인트당 인스턴스 하나를 `Arc`로 공유합니다.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// 기본 최소 간격 (100ms).
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// 최소 간격 rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    /// 마지막 호출 시작 시각
    last_call: Mutex<Option<Instant>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl RateLimiter {
    /// 새 rate limiter 생성.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// 밀리초 단위 간격으로 생성.
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// 다음 호출이 허용될 때까지 대기.
    ///
    /// 락은 대기 시간 동안만 유지되며 네트워크 I/O 동안에는 잡지 않습니다.
    /// 대기 중인 호출자들은 락 획득 순서대로 직렬화됩니다.
    pub async fn throttle(&self) {
        let mut last_call = self.last_call.lock().await;

        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        *last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_does_not_wait() {
        let limiter = RateLimiter::from_millis(100);
        let start = Instant::now();
        limiter.throttle().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_calls_are_spaced() {
        let limiter = RateLimiter::from_millis(100);
        let start = Instant::now();

        for _ in 0..5 {
            limiter.throttle().await;
        }

        // 첫 호출은 즉시, 나머지 4번은 각 100ms 간격
        assert!(start.elapsed() >= Duration::from_millis(400));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_elapsed() {
        let limiter = RateLimiter::from_millis(100);
        limiter.throttle().await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        let start = Instant::now();
        limiter.throttle().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_across_tasks() {
        let limiter = Arc::new(RateLimiter::from_millis(100));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.throttle().await;
                    Instant::now()
                })
            })
            .collect();

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();

        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
