//! Inference Engine Port - 原生推理引擎抽象
//!
//! 引擎本身是黑盒：加载权重、前向计算、产出下一个 token。
//! 这里所有方法只能在 Worker Queue 的任务里调用，原生资源不是线程安全的。

use std::fs::File;
use std::sync::Arc;

use crate::domain::{ExecuteOptions, PerformanceFlags};

use super::task_runner::SchedulerPort;
use super::text_safety::{NativeSafetyModel, SafetyAssets};

/// 引擎单次输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutput {
    /// 新产出的一段文本
    InProgress(String),
    /// 输出结束哨兵
    Complete,
}

/// 生成输出回调，可能在任意线程上被调用多次
pub type OutputFn = Arc<dyn Fn(ExecutionOutput) + Send + Sync>;

/// 上下文写入完成回调，参数为处理的 token 数
pub type ContextSavedFn = Box<dyn FnOnce(u32) + Send>;

/// 引擎提供的取消能力
pub type NativeCancelFn = Box<dyn FnOnce() + Send>;

/// 创建模型时交给引擎的描述
#[derive(Debug)]
pub struct ModelDescriptor {
    pub weights: File,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub adaptation_ranks: Vec<u32>,
    pub perf: PerformanceFlags,
}

/// Inference Engine Port
///
/// 原生引擎入口，负责创建模型与辅助安全模型
pub trait InferenceEnginePort: Send + Sync {
    /// 从权重创建模型；失败时返回 None
    ///
    /// `scheduler` 供引擎把内部续体投递到线程池
    fn create_model(
        &self,
        descriptor: ModelDescriptor,
        scheduler: Arc<dyn SchedulerPort>,
    ) -> Option<Box<dyn NativeModel>>;

    /// 创建文本安全 / 语言检测模型；失败时返回 None
    fn create_safety_model(&self, _assets: SafetyAssets) -> Option<Box<dyn NativeSafetyModel>> {
        None
    }
}

/// 已加载的原生模型，Drop 即释放
pub trait NativeModel: Send {
    /// 创建基础会话，`adaptation` 为 None 时使用原始权重
    fn create_session(&mut self, adaptation: Option<File>) -> Option<Box<dyn NativeSession>>;
}

/// 原生会话状态（已累积的上下文前缀），Drop 即释放
pub trait NativeSession: Send {
    /// 复制当前已累积的上下文
    fn clone_session(&self) -> Box<dyn NativeSession>;

    /// 写入上下文（`context_saved`）或生成输出（`output`）
    ///
    /// 可以同步完成，也可以通过 scheduler 异步继续；返回值为可选的取消能力
    fn execute(
        &mut self,
        options: ExecuteOptions,
        output: Option<OutputFn>,
        context_saved: Option<ContextSavedFn>,
    ) -> Option<NativeCancelFn>;

    fn size_in_tokens(&mut self, text: &str) -> u32;

    fn score(&mut self, text: &str) -> f32;
}
