//! 应用层错误定义

use thiserror::Error;

use crate::application::ports::QueueClosed;

/// 异步查询错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Worker 已停止，结果无法送回
    #[error("model worker is unavailable")]
    WorkerUnavailable,
}

impl From<QueueClosed> for ExecutionError {
    fn from(_: QueueClosed) -> Self {
        Self::WorkerUnavailable
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for ExecutionError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::WorkerUnavailable
    }
}
