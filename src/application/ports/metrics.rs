//! Metrics Port - 吞吐与 token 计数记录

use std::time::Duration;

/// 指标名称
pub mod metric_names {
    pub const OUTPUT_TOKEN_COUNT: &str = "model.output.token_count";
    pub const OUTPUT_TOKENS_PER_SECOND: &str = "model.output.tokens_per_second";
    pub const CONTEXT_TOKEN_COUNT: &str = "model.context.token_count";
    pub const CONTEXT_TOKENS_PER_SECOND: &str = "model.context.tokens_per_second";
}

/// Metrics Port
pub trait MetricsPort: Send + Sync {
    /// 记录一个样本
    fn record(&self, name: &'static str, value: u64);
}

/// 每秒 token 数，耗时为 0 时返回 0
pub fn tokens_per_second(num_tokens: u64, elapsed: Duration) -> u64 {
    let micros = elapsed.as_micros();
    if micros == 0 {
        return 0;
    }
    (num_tokens as f64 * 1_000_000.0 / micros as f64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_per_second() {
        assert_eq!(tokens_per_second(10, Duration::from_secs(2)), 5);
        assert_eq!(tokens_per_second(3, Duration::from_millis(500)), 6);
        assert_eq!(tokens_per_second(0, Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_tokens_per_second_zero_duration() {
        assert_eq!(tokens_per_second(10, Duration::ZERO), 0);
    }
}
