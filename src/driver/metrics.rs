//! Metrics
//!
//! 세션 요청 통계와 지연 히스토그램

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::error::{DriverError, DriverResult};

/// 히스토그램 버킷 수 (마이크로초 비트 길이별)
const BUCKETS: usize = 64;

// ============================================================================
// LatencyHistogram - 지연 히스토그램
// ============================================================================

/// 로그 스케일 지연 히스토그램
///
/// 마이크로초 단위 지연의 비트 길이로 버킷을 나눕니다. 기록은 O(1)이고
/// 백분위 조회는 버킷 누적으로 근사합니다.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    buckets: [u64; BUCKETS],
    count: u64,
    sum_micros: u64,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self {
            buckets: [0; BUCKETS],
            count: 0,
            sum_micros: 0,
        }
    }
}

impl LatencyHistogram {
    /// 지연 기록 (마이크로초)
    pub fn record(&mut self, micros: u64) {
        let index = (64 - micros.leading_zeros() as usize).min(BUCKETS - 1);
        self.buckets[index] += 1;
        self.count += 1;
        self.sum_micros = self.sum_micros.saturating_add(micros);
    }

    /// 기록 수
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 평균 지연 (밀리초)
    pub fn average_ms(&self) -> Option<u64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum_micros / self.count / 1000)
    }

    /// 백분위 지연 (밀리초)
    ///
    /// `percentile`은 0.0 - 100.0 범위로 클램프됩니다. 반환값은 해당
    /// 버킷의 상한 근사입니다.
    pub fn percentile_ms(&self, percentile: f64) -> Option<u64> {
        if self.count == 0 {
            return None;
        }
        let percentile = percentile.clamp(0.0, 100.0);
        let rank = ((percentile / 100.0) * self.count as f64).ceil() as u64;
        let rank = rank.max(1);

        let mut cumulative = 0u64;
        for (index, bucket) in self.buckets.iter().enumerate() {
            cumulative += bucket;
            if cumulative >= rank {
                let upper_micros = if index == 0 {
                    0
                } else {
                    (1u64 << index).saturating_sub(1)
                };
                return Some(upper_micros / 1000);
            }
        }
        None
    }
}

// ============================================================================
// MetricsSnapshot - 메트릭 스냅샷
// ============================================================================

/// 특정 시점의 메트릭 복사본
///
/// 불변이므로 읽는 동안 카운터가 찢어지지 않습니다.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    queries_num: u64,
    queries_iter_num: u64,
    errors_num: u64,
    errors_iter_num: u64,
    latency: LatencyHistogram,
}

impl MetricsSnapshot {
    /// 비페이징 쿼리 수
    pub fn get_queries_num(&self) -> u64 {
        self.queries_num
    }

    /// 페이징 쿼리에서 요청한 페이지 수
    pub fn get_queries_iter_num(&self) -> u64 {
        self.queries_iter_num
    }

    /// 비페이징 쿼리 에러 수
    pub fn get_errors_num(&self) -> u64 {
        self.errors_num
    }

    /// 페이징 쿼리 에러 수
    pub fn get_errors_iter_num(&self) -> u64 {
        self.errors_iter_num
    }

    /// 평균 지연 (밀리초)
    pub fn get_latency_avg_ms(&self) -> DriverResult<u64> {
        self.latency
            .average_ms()
            .ok_or_else(|| DriverError::session("no latency measurements recorded"))
    }

    /// 백분위 지연 (밀리초)
    ///
    /// # Arguments
    ///
    /// * `percentile` - 0.0 - 100.0 범위의 값 (범위 밖은 클램프)
    pub fn get_latency_percentile_ms(&self, percentile: f64) -> DriverResult<u64> {
        self.latency
            .percentile_ms(percentile)
            .ok_or_else(|| DriverError::session("no latency measurements recorded"))
    }
}

// ============================================================================
// Metrics - 메트릭 집계기
// ============================================================================

/// 메트릭 집계기
///
/// 카운터는 원자적 증가, 히스토그램은 짧은 락으로 보호됩니다. 요청 완료를
/// 집계 때문에 막지 않습니다.
#[derive(Debug, Default)]
pub struct Metrics {
    queries_num: AtomicU64,
    queries_iter_num: AtomicU64,
    errors_num: AtomicU64,
    errors_iter_num: AtomicU64,
    latency: Mutex<LatencyHistogram>,
}

impl Metrics {
    /// 새 집계기 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 쿼리 기록
    pub fn record_query(&self, paged: bool) {
        if paged {
            self.queries_iter_num.fetch_add(1, Ordering::Relaxed);
        } else {
            self.queries_num.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 에러 기록
    pub fn record_error(&self, paged: bool) {
        if paged {
            self.errors_iter_num.fetch_add(1, Ordering::Relaxed);
        } else {
            self.errors_num.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 지연 기록
    pub fn record_latency(&self, latency: Duration) {
        let micros = latency.as_micros().min(u64::MAX as u128) as u64;
        self.latency.lock().record(micros);
    }

    /// 스냅샷 생성
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_num: self.queries_num.load(Ordering::Relaxed),
            queries_iter_num: self.queries_iter_num.load(Ordering::Relaxed),
            errors_num: self.errors_num.load(Ordering::Relaxed),
            errors_iter_num: self.errors_iter_num.load(Ordering::Relaxed),
            latency: self.latency.lock().clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
