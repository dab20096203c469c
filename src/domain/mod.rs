//! Domain Layer - 领域层
//!
//! 模型执行上下文:
//! - 请求参数与钳制规则（token 预算、top_k、temperature）
//! - 加载错误

pub mod model;

pub use model::{
    clamp_model_max_tokens, AdaptationId, ContextMode, ExecuteOptions, InputOptions, LoadError,
    PerformanceFlags, SamplingLimits, TokenBudget, SAFETY_RESERVE_TOKENS,
};
