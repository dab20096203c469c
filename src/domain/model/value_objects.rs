//! Model Context - Value Objects

use serde::{Deserialize, Serialize};

/// Adaptation 唯一标识
///
/// 由 executor 实例按加载顺序分配，从 0 开始，不复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdaptationId(u32);

impl AdaptationId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for AdaptationId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AdaptationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 执行时使用哪份会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextMode {
    /// 带有已累积上下文的会话
    Accumulated,
    /// 不带任何上下文的空会话
    Empty,
}

impl ContextMode {
    pub fn from_ignore_context(ignore_context: bool) -> Self {
        if ignore_context {
            Self::Empty
        } else {
            Self::Accumulated
        }
    }
}

/// 调用方传入的请求参数（未钳制）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputOptions {
    pub text: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub ignore_context: bool,
}

impl InputOptions {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn ignoring_context(mut self) -> Self {
        self.ignore_context = true;
        self
    }

    pub fn context_mode(&self) -> ContextMode {
        ContextMode::from_ignore_context(self.ignore_context)
    }
}

/// 钳制后交给引擎的执行参数
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteOptions {
    pub text: String,
    pub max_tokens: u32,
    pub top_k: u32,
    pub temperature: f32,
}

/// 加载期性能开关，加载后不可变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceFlags {
    pub prefer_texture_weights: bool,
    pub enable_host_mapped_pointer: bool,
    pub use_low_power: bool,
    pub allow_fp16: bool,
}

impl Default for PerformanceFlags {
    fn default() -> Self {
        Self {
            prefer_texture_weights: true,
            enable_host_mapped_pointer: true,
            use_low_power: false,
            allow_fp16: true,
        }
    }
}
