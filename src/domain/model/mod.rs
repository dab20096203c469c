//! Model Context - 模型执行上下文

mod errors;
mod sampling;
mod value_objects;

pub use errors::LoadError;
pub use sampling::{clamp_model_max_tokens, SamplingLimits, TokenBudget, SAFETY_RESERVE_TOKENS};
pub use value_objects::{AdaptationId, ContextMode, ExecuteOptions, InputOptions, PerformanceFlags};
