//! The aggregation hook a workload reports through after every completed
//! operation, and the one accumulator this crate ships for it.

use std::collections::BTreeMap;
use std::sync::Mutex;

/// Notified once per completed operation. Implementations decide what to
/// do with the numbers — accumulate them in memory, forward them to a
/// metrics sink, or ignore them entirely; the driver never assumes more
/// than `Send + Sync`.
pub trait AggregationObserver: Send + Sync {
    fn on_operation(&self, protocol: &str, operation: &str, hops: u32, n_nodes: usize, n_items: usize);
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: u64,
    min_hops: u32,
    max_hops: u32,
    sum_hops: u64,
}

impl Accumulator {
    fn record(&mut self, hops: u32) {
        self.count += 1;
        self.min_hops = self.min_hops.min(hops);
        self.max_hops = self.max_hops.max(hops);
        self.sum_hops += hops as u64;
    }
}

impl Default for Accumulator {
    fn default() -> Self {
        Accumulator { count: 0, min_hops: u32::MAX, max_hops: 0, sum_hops: 0 }
    }
}

/// One (protocol, operation) bucket's hop statistics, as handed back by
/// [`HopStatsCollector::summary`].
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSummary {
    pub protocol: String,
    pub operation: String,
    pub count: u64,
    pub min_hops: u32,
    pub max_hops: u32,
    pub mean_hops: f64,
}

/// In-memory running min/max/mean accumulator, keyed by `(protocol, operation)`.
/// `n_items` is accepted but not tracked here — it informs observers that
/// need per-item weighting, which this simple collector does not.
#[derive(Default)]
pub struct HopStatsCollector {
    buckets: Mutex<BTreeMap<(String, String), Accumulator>>,
}

impl HopStatsCollector {
    pub fn new() -> Self {
        HopStatsCollector::default()
    }

    pub fn summary(&self) -> Vec<OperationSummary> {
        self.buckets
            .lock()
            .unwrap()
            .iter()
            .map(|((protocol, operation), acc)| OperationSummary {
                protocol: protocol.clone(),
                operation: operation.clone(),
                count: acc.count,
                min_hops: acc.min_hops,
                max_hops: acc.max_hops,
                mean_hops: acc.sum_hops as f64 / acc.count.max(1) as f64,
            })
            .collect()
    }
}

impl AggregationObserver for HopStatsCollector {
    fn on_operation(&self, protocol: &str, operation: &str, hops: u32, _n_nodes: usize, _n_items: usize) {
        tracing::debug!(protocol, operation, hops, "operation completed");
        let key = (protocol.to_string(), operation.to_string());
        let mut buckets = self.buckets.lock().unwrap();
        buckets.entry(key).or_default().record(hops);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_min_max_mean_per_bucket() {
        let collector = HopStatsCollector::new();
        collector.on_operation("chord", "lookup", 1, 4, 1);
        collector.on_operation("chord", "lookup", 3, 4, 1);
        collector.on_operation("chord", "insert", 2, 4, 1);

        let summary = collector.summary();
        let lookup = summary.iter().find(|s| s.operation == "lookup").unwrap();
        assert_eq!(lookup.count, 2);
        assert_eq!(lookup.min_hops, 1);
        assert_eq!(lookup.max_hops, 3);
        assert!((lookup.mean_hops - 2.0).abs() < f64::EPSILON);

        let insert = summary.iter().find(|s| s.operation == "insert").unwrap();
        assert_eq!(insert.count, 1);
    }

    #[test]
    fn separates_buckets_by_protocol() {
        let collector = HopStatsCollector::new();
        collector.on_operation("chord", "lookup", 2, 4, 1);
        collector.on_operation("pastry", "lookup", 5, 4, 1);
        let summary = collector.summary();
        assert_eq!(summary.len(), 2);
    }
}
