//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod inference_engine;
mod metrics;
mod task_runner;
mod text_safety;

pub use inference_engine::{
    ContextSavedFn, ExecutionOutput, InferenceEnginePort, ModelDescriptor, NativeCancelFn,
    NativeModel, NativeSession, OutputFn,
};
pub use metrics::{metric_names, tokens_per_second, MetricsPort};
pub use task_runner::{QueueClosed, SchedulerPort, Task, TaskRunnerPort};
pub use text_safety::{LanguageDetection, NativeSafetyModel, SafetyAssets, SafetyInfo};
