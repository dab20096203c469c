//! Cancel Token - 幂等、协作式的取消能力
//!
//! 取消在 owner 侧发起，引擎的取消函数在 worker 侧绑定，两者可能以任意顺序发生。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::application::ports::NativeCancelFn;

enum CancelState {
    /// 尚未终止；引擎取消函数可能还未绑定
    Armed(Option<NativeCancelFn>),
    Cancelled,
    /// 已自然完成，之后的取消为空操作
    Finished,
}

/// 取消令牌
///
/// 克隆共享同一状态；底层取消效果最多触发一次
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<Mutex<CancelState>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CancelState::Armed(None))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CancelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 绑定引擎返回的取消函数（worker 侧）
    ///
    /// 如果取消已先行发生，立即调用该函数
    pub fn bind(&self, native: Option<NativeCancelFn>) {
        let late = {
            let mut state = self.lock();
            match &mut *state {
                CancelState::Armed(slot) => {
                    *slot = native;
                    return;
                }
                CancelState::Cancelled => native,
                CancelState::Finished => return,
            }
        };
        if let Some(native) = late {
            native();
        }
    }

    /// 请求取消，返回本次调用是否生效
    pub fn cancel(&self) -> bool {
        let native = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, CancelState::Cancelled) {
                CancelState::Armed(native) => native,
                other => {
                    *state = other;
                    return false;
                }
            }
        };
        if let Some(native) = native {
            native();
        }
        true
    }

    /// 标记自然完成，丢弃已绑定的取消函数
    pub fn finish(&self) {
        let mut state = self.lock();
        if matches!(*state, CancelState::Armed(_)) {
            *state = CancelState::Finished;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.lock(), CancelState::Cancelled)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match *self.lock() {
            CancelState::Armed(Some(_)) => "bound",
            CancelState::Armed(None) => "unbound",
            CancelState::Cancelled => "cancelled",
            CancelState::Finished => "finished",
        };
        f.debug_struct("CancelToken").field("state", &state).finish()
    }
}

/// 调用方持有的取消句柄
///
/// 触发后由 Responder / 累积器在 owner 侧完成收尾；重复调用无效果
#[derive(Debug, Clone)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self(token)
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_fn(counter: &Arc<AtomicUsize>) -> NativeCancelFn {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancelToken::new();
        token.bind(Some(counting_fn(&calls)));

        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_before_bind_fires_on_bind() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancelToken::new();

        assert!(token.cancel());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        token.bind(Some(counting_fn(&calls)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(!token.cancel());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_after_finish_is_noop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancelToken::new();
        token.bind(Some(counting_fn(&calls)));
        token.finish();

        assert!(!token.cancel());
        assert!(!token.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancelToken::new();
        let other = token.clone();
        other.bind(Some(counting_fn(&calls)));

        token.cancel();
        other.cancel();
        assert!(other.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
