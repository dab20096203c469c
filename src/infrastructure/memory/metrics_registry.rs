//! In-Memory Metrics Implementation

use dashmap::DashMap;
use std::sync::Arc;

use crate::application::ports::MetricsPort;

/// 内存指标记录器
pub struct InMemoryMetrics {
    /// metric name -> samples
    samples: DashMap<&'static str, Vec<u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self {
            samples: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 某个指标的全部样本，按记录顺序
    pub fn samples(&self, name: &str) -> Vec<u64> {
        self.samples
            .get(name)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, name: &str) -> usize {
        self.samples.get(name).map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsPort for InMemoryMetrics {
    fn record(&self, name: &'static str, value: u64) {
        tracing::debug!(metric = name, value = value, "Metric recorded");
        self.samples.entry(name).or_default().push(value);
    }
}
