//! 수집 통계 구조체.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 수집 작업 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    /// 처리 대상 키 수
    pub total: usize,
    /// 성공 횟수
    pub success: usize,
    /// 재시도 소진 후 실패한 횟수
    pub errors: usize,
    /// 건너뛴 횟수 (이미 처리된 키)
    pub skipped: usize,
    /// 키를 도출할 수 없어 제외된 항목 수
    pub unkeyed: usize,
    /// 상한 때문에 다음 실행으로 미뤄진 키 수
    pub deferred: usize,
    /// 수집된 총 항목 수
    pub total_items: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CollectionStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 성공률 계산 (%)
    pub fn success_rate(&self) -> f64 {
        let attempted = self.success + self.errors;
        if attempted == 0 {
            0.0
        } else {
            (self.success as f64 / attempted as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            success = self.success,
            errors = self.errors,
            skipped = self.skipped,
            unkeyed = self.unkeyed,
            deferred = self.deferred,
            total_items = self.total_items,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "수집 완료"
        );
    }
}
