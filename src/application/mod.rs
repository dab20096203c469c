//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（InferenceEngine、TaskRunner、Scheduler、Metrics 等）
//! - executor: 模型执行器、会话、流式 Responder、上下文累积器
//! - error: 应用层错误定义

pub mod error;
pub mod executor;
pub mod ports;

pub use error::ExecutionError;

pub use executor::{
    CancelHandle, CancelToken, ContextClient, ExecutorContext, LoadAdaptationParams,
    LoadModelParams, ModelExecutor, OnComplete, ResponseChunk, ResponseSummary, Session,
    StreamEvent, StreamSink,
};

pub use ports::{
    // Inference engine
    ContextSavedFn,
    ExecutionOutput,
    InferenceEnginePort,
    ModelDescriptor,
    NativeCancelFn,
    NativeModel,
    NativeSession,
    OutputFn,
    // Metrics
    metric_names,
    tokens_per_second,
    MetricsPort,
    // Task runner
    QueueClosed,
    SchedulerPort,
    Task,
    TaskRunnerPort,
    // Text safety
    LanguageDetection,
    NativeSafetyModel,
    SafetyAssets,
    SafetyInfo,
};
