//! 运行统计与模型信息

use chrono::{DateTime, Utc};
use mailfusion_engine::{LabelMapMode, PredictionResult};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;

use crate::cache::CacheStats;

/// 性能统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub total_predictions: u64,
    pub batch_predictions: u64,
    pub failed_predictions: u64,
    /// 成功预测的平均置信度
    pub average_confidence: f64,
    pub last_prediction_time: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub cache: CacheStats,
    pub category_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Ready,
    NotLoaded,
}

/// 模型信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub scorer: Option<String>,
    pub feature_scorer: Option<String>,
    pub label_map_mode: Option<LabelMapMode>,
    pub label_map_version: u64,
    pub unmatched_labels: Vec<String>,
    pub category_count: usize,
    pub registry_version: u64,
    pub batch_size: usize,
    pub cache_size: usize,
    pub cache_capacity: usize,
    pub status: ModelStatus,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    batches: u64,
    failed: u64,
    confidence_sum: f64,
    last_prediction: Option<DateTime<Utc>>,
}

/// 统计收集器
#[derive(Debug)]
pub struct StatsCollector {
    counters: Mutex<Counters>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一批结果（单封预测视为长度为1的非批量调用）
    pub fn record(&self, results: &[PredictionResult], batch: bool) {
        if results.is_empty() {
            return;
        }
        let mut c = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        if batch {
            c.batches += 1;
        }
        for result in results {
            c.total += 1;
            if result.is_failure() {
                c.failed += 1;
            } else {
                c.confidence_sum += result.confidence;
            }
        }
        c.last_prediction = Some(Utc::now());
    }

    pub fn snapshot(&self, cache: CacheStats, category_count: usize) -> PerformanceStats {
        let c = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let succeeded = c.total.saturating_sub(c.failed);
        let average_confidence = if succeeded > 0 {
            c.confidence_sum / succeeded as f64
        } else {
            0.0
        };
        PerformanceStats {
            total_predictions: c.total,
            batch_predictions: c.batches,
            failed_predictions: c.failed,
            average_confidence,
            last_prediction_time: c.last_prediction,
            started_at: self.started_at,
            uptime_seconds: self.started.elapsed().as_secs(),
            cache,
            category_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_average_ignores_failures() {
        let stats = StatsCollector::new();
        let ok = PredictionResult {
            label: "Spam".into(),
            confidence: 0.8,
            scores: BTreeMap::new(),
            category_id: 3,
            error: None,
        };
        let mut ok2 = ok.clone();
        ok2.confidence = 0.4;
        stats.record(&[ok, ok2], true);
        stats.record(&[PredictionResult::failure("Other", 4, "x")], false);

        let snap = stats.snapshot(CacheStats::default(), 5);
        assert_eq!(snap.total_predictions, 3);
        assert_eq!(snap.batch_predictions, 1);
        assert_eq!(snap.failed_predictions, 1);
        assert!((snap.average_confidence - 0.6).abs() < 1e-9);
        assert!(snap.last_prediction_time.is_some());
    }
}
