use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Most metrics kept in memory; the oldest entry is evicted beyond this.
pub const MAX_RECORDED_METRICS: usize = 1000;

/// Queries slower than this show up in the slow-query report.
pub const SLOW_QUERY_REPORT_THRESHOLD: Duration = Duration::from_millis(500);

/// One record per monitored query execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub execution_time_ms: u64,
    pub query_text: String,
    pub row_count: usize,
    pub cache_hit: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate view over the recorded metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPerformanceReport {
    pub total_queries: usize,
    pub average_execution_time_ms: f64,
    /// Top 10 slowest entries above the report threshold, slowest first.
    pub slow_queries: Vec<QueryMetrics>,
    /// The 10 most recent entries, newest first.
    pub recent_queries: Vec<QueryMetrics>,
}

/// Bounded in-process ring buffer of query metrics. Best-effort diagnostics,
/// not durable.
#[derive(Clone)]
pub struct MetricsRecorder {
    entries: Arc<Mutex<VecDeque<QueryMetrics>>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_RECORDED_METRICS))),
        }
    }

    pub fn record(&self, metric: QueryMetrics) {
        let mut entries = self.entries.lock();
        if entries.len() == MAX_RECORDED_METRICS {
            entries.pop_front();
        }
        entries.push_back(metric);
    }

    pub fn report(&self) -> QueryPerformanceReport {
        let entries = self.entries.lock();
        let total_queries = entries.len();
        let average_execution_time_ms = if total_queries > 0 {
            entries.iter().map(|m| m.execution_time_ms as f64).sum::<f64>() / total_queries as f64
        } else {
            0.0
        };

        let mut slow_queries: Vec<QueryMetrics> = entries
            .iter()
            .filter(|m| m.execution_time_ms > SLOW_QUERY_REPORT_THRESHOLD.as_millis() as u64)
            .cloned()
            .collect();
        slow_queries.sort_by(|a, b| b.execution_time_ms.cmp(&a.execution_time_ms));
        slow_queries.truncate(10);

        let recent_queries: Vec<QueryMetrics> =
            entries.iter().rev().take(10).cloned().collect();

        QueryPerformanceReport {
            total_queries,
            average_execution_time_ms,
            slow_queries,
            recent_queries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(ms: u64) -> QueryMetrics {
        QueryMetrics {
            execution_time_ms: ms,
            query_text: format!("SELECT {ms}"),
            row_count: 1,
            cache_hit: false,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let recorder = MetricsRecorder::new();
        for i in 0..(MAX_RECORDED_METRICS + 5) {
            recorder.record(metric(i as u64));
        }
        assert_eq!(recorder.len(), MAX_RECORDED_METRICS);

        let report = recorder.report();
        // The newest entry survives; the first five were evicted.
        assert_eq!(
            report.recent_queries[0].execution_time_ms,
            (MAX_RECORDED_METRICS + 4) as u64
        );
    }

    #[test]
    fn report_on_empty_recorder_is_zeroed() {
        let report = MetricsRecorder::new().report();
        assert_eq!(report.total_queries, 0);
        assert_eq!(report.average_execution_time_ms, 0.0);
        assert!(report.slow_queries.is_empty());
        assert!(report.recent_queries.is_empty());
    }

    #[test]
    fn slow_queries_are_sorted_and_capped() {
        let recorder = MetricsRecorder::new();
        for ms in [100, 600, 2000, 450, 1500, 501] {
            recorder.record(metric(ms));
        }
        let report = recorder.report();
        let times: Vec<u64> = report
            .slow_queries
            .iter()
            .map(|m| m.execution_time_ms)
            .collect();
        assert_eq!(times, vec![2000, 1500, 600, 501]);
    }

    #[test]
    fn average_covers_all_entries() {
        let recorder = MetricsRecorder::new();
        recorder.record(metric(100));
        recorder.record(metric(300));
        let report = recorder.report();
        assert_eq!(report.total_queries, 2);
        assert_eq!(report.average_execution_time_ms, 200.0);
    }
}
