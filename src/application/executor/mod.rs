//! Executor - 模型执行与会话管理
//!
//! 所有原生资源访问都投递到单个 Worker Queue；
//! 对调用方可见的效果（流式输出、完成通知）都在 owner 侧的任务里发生。

mod callbacks;
mod cancel;
mod context_holder;
mod model_executor;
mod responder;
mod safety_model;
mod session;
mod session_accessor;

#[cfg(test)]
mod test_support;

pub use cancel::{CancelHandle, CancelToken};
pub use context_holder::ContextClient;
pub use model_executor::{ExecutorContext, LoadAdaptationParams, LoadModelParams, ModelExecutor};
pub use responder::{OnComplete, ResponseChunk, ResponseSummary, StreamEvent, StreamSink};
pub use session::Session;
pub use session_accessor::SessionAccessor;
