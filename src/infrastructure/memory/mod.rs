//! Memory Layer - In-Memory State Management
//!
//! 实现 MetricsPort，指标样本保存在内存中

mod metrics_registry;

pub use metrics_registry::InMemoryMetrics;
