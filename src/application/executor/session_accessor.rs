//! Session Accessor - 原生会话的 owner 侧句柄
//!
//! 原生会话只存在于 Worker Queue 上：创建、克隆、执行、查询、释放都以任务形式投递，
//! 按 FIFO 顺序执行。句柄本身的克隆不等待 worker，立即返回。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::application::error::ExecutionError;
use crate::application::ports::{
    ContextSavedFn, NativeSession, OutputFn, TaskRunnerPort,
};
use crate::domain::ExecuteOptions;

use super::cancel::CancelToken;

/// worker 侧的原生会话槽位
pub(crate) type NativeSlot = Arc<Mutex<Option<Box<dyn NativeSession>>>>;

pub(crate) fn lock_slot<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 原生会话句柄
///
/// Drop 时向 worker 投递释放任务
pub struct SessionAccessor {
    runner: Arc<dyn TaskRunnerPort>,
    slot: NativeSlot,
}

impl SessionAccessor {
    /// 创建一个空句柄，槽位由 worker 上的任务填充
    pub(crate) fn detached(runner: Arc<dyn TaskRunnerPort>) -> (Self, NativeSlot) {
        let slot: NativeSlot = Arc::new(Mutex::new(None));
        (
            Self {
                runner,
                slot: slot.clone(),
            },
            slot,
        )
    }

    fn post(&self, task: impl FnOnce() + Send + 'static) -> Result<(), ExecutionError> {
        self.runner.post(Box::new(task)).map_err(|e| {
            tracing::warn!(error = %e, "Failed to post session task");
            ExecutionError::from(e)
        })
    }

    /// 快照克隆：克隆在 worker 上按提交顺序执行，
    /// 因此看到的是此前已提交的所有上下文写入，之后的写入不可见
    pub fn clone_accessor(&self) -> Self {
        let (clone, target) = Self::detached(self.runner.clone());
        let source = self.slot.clone();
        let _ = self.post(move || {
            let cloned = lock_slot(&source).as_ref().map(|native| native.clone_session());
            *lock_slot(&target) = cloned;
        });
        clone
    }

    /// 投递执行任务：写入上下文（`context_saved`）或生成输出（`output`）
    ///
    /// 任务开始前已取消则直接跳过；引擎返回的取消函数绑定到 `cancel`
    pub(crate) fn execute(
        &self,
        options: ExecuteOptions,
        output: Option<OutputFn>,
        context_saved: Option<ContextSavedFn>,
        cancel: CancelToken,
    ) {
        let slot = self.slot.clone();
        let _ = self.post(move || {
            if cancel.is_cancelled() {
                tracing::debug!("Request cancelled before reaching the engine");
                return;
            }
            let mut guard = lock_slot(&slot);
            let Some(native) = guard.as_mut() else {
                tracing::warn!("Native session missing, dropping request");
                return;
            };
            let native_cancel = native.execute(options, output, context_saved);
            drop(guard);
            cancel.bind(native_cancel);
        });
    }

    async fn query<T: Send + 'static>(
        &self,
        default: T,
        op: impl FnOnce(&mut dyn NativeSession) -> T + Send + 'static,
    ) -> Result<T, ExecutionError> {
        let (tx, rx) = oneshot::channel();
        let slot = self.slot.clone();
        self.post(move || {
            let value = match lock_slot(&slot).as_mut() {
                Some(native) => op(native.as_mut()),
                None => default,
            };
            let _ = tx.send(value);
        })?;
        Ok(rx.await?)
    }

    /// 文本的 token 数，不修改会话状态
    pub async fn size_in_tokens(&self, text: impl Into<String>) -> Result<u32, ExecutionError> {
        let text = text.into();
        self.query(0, move |native| native.size_in_tokens(&text)).await
    }

    /// 文本在当前上下文下的得分，不修改会话状态
    pub async fn score(&self, text: impl Into<String>) -> Result<f32, ExecutionError> {
        let text = text.into();
        self.query(0.0, move |native| native.score(&text)).await
    }
}

impl Drop for SessionAccessor {
    fn drop(&mut self) {
        let slot = self.slot.clone();
        let _ = self.post(move || {
            drop(lock_slot(&slot).take());
        });
    }
}

impl std::fmt::Debug for SessionAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAccessor").finish_non_exhaustive()
    }
}
