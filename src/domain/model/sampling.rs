//! Model Context - 参数钳制
//!
//! 越界参数一律钳制到合法范围，从不拒绝请求

use super::value_objects::{ExecuteOptions, InputOptions};

/// 为引擎保留的安全 token 数
pub const SAFETY_RESERVE_TOKENS: u32 = 2;

/// 加载时的模型 token 上限，至少为保留数
pub fn clamp_model_max_tokens(requested: u32) -> u32 {
    requested.max(SAFETY_RESERVE_TOKENS)
}

/// 会话级 token 预算：`model_max_tokens - SAFETY_RESERVE_TOKENS`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget(u32);

impl TokenBudget {
    pub fn from_model_max(model_max_tokens: u32) -> Self {
        Self(model_max_tokens.saturating_sub(SAFETY_RESERVE_TOKENS))
    }

    pub fn tokens(&self) -> u32 {
        self.0
    }

    /// `min(requested.unwrap_or(budget), budget)`
    pub fn clamp(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.0).min(self.0)
    }
}

/// 单个会话的钳制规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingLimits {
    pub budget: TokenBudget,
    pub max_top_k: u32,
}

impl SamplingLimits {
    pub fn new(budget: TokenBudget, max_top_k: u32) -> Self {
        Self { budget, max_top_k }
    }

    /// top_k ∈ [1, max_top_k]，未指定时取 1
    pub fn top_k(&self, top_k: Option<u32>) -> u32 {
        top_k.unwrap_or(1).clamp(1, self.max_top_k.max(1))
    }

    /// temperature ≥ 0，未指定时取 0
    pub fn temperature(&self, temperature: Option<f32>) -> f32 {
        // f32::max 对 NaN 返回另一侧，NaN 也会落到 0
        temperature.unwrap_or(0.0).max(0.0)
    }

    pub fn resolve(&self, input: InputOptions) -> ExecuteOptions {
        ExecuteOptions {
            max_tokens: self.budget.clamp(input.max_tokens),
            top_k: self.top_k(input.top_k),
            temperature: self.temperature(input.temperature),
            text: input.text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(model_max: u32, max_top_k: u32) -> SamplingLimits {
        SamplingLimits::new(TokenBudget::from_model_max(model_max), max_top_k)
    }

    #[test]
    fn test_budget_without_override() {
        let budget = TokenBudget::from_model_max(10);
        assert_eq!(budget.tokens(), 8);
        assert_eq!(budget.clamp(None), 8);
    }

    #[test]
    fn test_budget_caps_requested_tokens() {
        let budget = TokenBudget::from_model_max(10);
        assert_eq!(budget.clamp(Some(3)), 3);
        assert_eq!(budget.clamp(Some(9)), 8);
        assert_eq!(budget.clamp(Some(u32::MAX)), 8);
    }

    #[test]
    fn test_model_max_tokens_floor() {
        assert_eq!(clamp_model_max_tokens(0), SAFETY_RESERVE_TOKENS);
        assert_eq!(clamp_model_max_tokens(1), SAFETY_RESERVE_TOKENS);
        assert_eq!(clamp_model_max_tokens(100), 100);
        assert_eq!(TokenBudget::from_model_max(clamp_model_max_tokens(0)).tokens(), 0);
    }

    #[test]
    fn test_budget_never_exceeds_model_max_minus_reserve() {
        for model_max in [2u32, 3, 10, 4096] {
            let budget = TokenBudget::from_model_max(model_max);
            for requested in [None, Some(0), Some(1), Some(model_max), Some(u32::MAX)] {
                assert!(budget.clamp(requested) <= model_max - SAFETY_RESERVE_TOKENS);
            }
        }
    }

    #[test]
    fn test_top_k_clamped() {
        let limits = limits(10, 40);
        assert_eq!(limits.top_k(Some(0)), 1);
        assert_eq!(limits.top_k(Some(999)), 40);
        assert_eq!(limits.top_k(Some(7)), 7);
        assert_eq!(limits.top_k(None), 1);
    }

    #[test]
    fn test_top_k_always_in_range() {
        let limits = limits(10, 40);
        for k in [0u32, 1, 2, 39, 40, 41, u32::MAX] {
            let effective = limits.top_k(Some(k));
            assert!((1..=40).contains(&effective));
        }
    }

    #[test]
    fn test_temperature_clamped() {
        let limits = limits(10, 40);
        assert_eq!(limits.temperature(Some(-5.0)), 0.0);
        assert_eq!(limits.temperature(None), 0.0);
        assert_eq!(limits.temperature(Some(0.7)), 0.7);
        assert_eq!(limits.temperature(Some(f32::NAN)), 0.0);
        assert!(limits.temperature(Some(f32::NEG_INFINITY)) >= 0.0);
    }

    #[test]
    fn test_resolve() {
        let limits = limits(10, 40);
        let options = limits.resolve(InputOptions {
            text: "abc".to_string(),
            max_tokens: Some(100),
            top_k: Some(999),
            temperature: Some(-5.0),
            ignore_context: false,
        });
        assert_eq!(
            options,
            ExecuteOptions {
                text: "abc".to_string(),
                max_tokens: 8,
                top_k: 40,
                temperature: 0.0,
            }
        );
    }
}
