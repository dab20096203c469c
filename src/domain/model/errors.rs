//! Model Context - Errors

use thiserror::Error;

/// 模型 / adaptation 加载错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("failed to load model library")]
    FailedToLoadLibrary,
}
