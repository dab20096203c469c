//! Context Accumulator - 单次上下文写入的完成通知与取消
//!
//! 没有流式输出；完成时把处理的 token 数交给 client，并记录上下文吞吐。
//! 被丢弃或取消时同样保证 `on_complete` 恰好调用一次。

use std::sync::{Arc, Weak};
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::application::ports::{metric_names, tokens_per_second, MetricsPort};
use crate::domain::ExecuteOptions;

use super::callbacks;
use super::cancel::{CancelHandle, CancelToken};
use super::responder::{CompletionGuard, OnComplete};
use super::session_accessor::SessionAccessor;

/// 上下文写入完成通知，参数为处理的 token 数
pub type ContextClient = oneshot::Sender<u32>;

/// 进行中的累积器登记表：request_id -> 句柄
///
/// 累积器完成后自行移除；登记表被丢弃时所有未完成的请求都会被取消
pub(crate) type ContextRegistry = DashMap<u64, ContextHandle>;

pub(crate) struct ContextHandle {
    _shutdown: DropGuard,
}

pub(crate) struct ContextAccumulator {
    request_id: u64,
    on_complete: CompletionGuard,
    cancel: CancelToken,
    metrics: Arc<dyn MetricsPort>,
    registry: Weak<ContextRegistry>,
    started: Instant,
}

impl ContextAccumulator {
    /// 投递上下文写入任务，并把句柄登记到 `registry`
    ///
    /// 必须在 tokio runtime 中调用
    pub(crate) fn start(
        request_id: u64,
        session: &SessionAccessor,
        options: ExecuteOptions,
        client: Option<ContextClient>,
        on_complete: Option<OnComplete>,
        metrics: Arc<dyn MetricsPort>,
        registry: &Arc<ContextRegistry>,
    ) -> CancelHandle {
        let cancel = CancelToken::new();
        let (saved_fn, saved) = callbacks::context_saved_channel();
        session.execute(options, None, Some(saved_fn), cancel.clone());

        let shutdown = CancellationToken::new();
        registry.insert(
            request_id,
            ContextHandle {
                _shutdown: shutdown.clone().drop_guard(),
            },
        );

        let accumulator = Self {
            request_id,
            on_complete: CompletionGuard::new(on_complete),
            cancel,
            metrics,
            registry: Arc::downgrade(registry),
            started: Instant::now(),
        };
        tokio::spawn(accumulator.run(saved, client, shutdown.clone()));

        CancelHandle::new(shutdown)
    }

    async fn run(
        mut self,
        saved: oneshot::Receiver<u32>,
        mut client: Option<ContextClient>,
        shutdown: CancellationToken,
    ) {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => self.abort("cancel requested"),
            _ = client_closed(&mut client) => self.abort("client disconnected"),
            result = saved => match result {
                Ok(tokens_processed) => self.on_saved(tokens_processed, client),
                Err(_) => self.abort("engine released context callback"),
            },
        }
        self.unregister();
    }

    fn on_saved(&mut self, tokens_processed: u32, client: Option<ContextClient>) {
        self.cancel.finish();
        if tokens_processed > 0 {
            self.metrics.record(
                metric_names::CONTEXT_TOKEN_COUNT,
                u64::from(tokens_processed),
            );
            self.metrics.record(
                metric_names::CONTEXT_TOKENS_PER_SECOND,
                tokens_per_second(u64::from(tokens_processed), self.started.elapsed()),
            );
        }
        if let Some(client) = client {
            let _ = client.send(tokens_processed);
        }
        tracing::debug!(
            request_id = self.request_id,
            tokens_processed = tokens_processed,
            "Context saved"
        );
        self.on_complete.run();
    }

    fn abort(&mut self, reason: &'static str) {
        let fired = self.cancel.cancel();
        tracing::debug!(
            request_id = self.request_id,
            reason = reason,
            fired = fired,
            "Context request cancelled"
        );
        self.on_complete.run();
    }

    fn unregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.request_id);
        }
    }
}

async fn client_closed(client: &mut Option<ContextClient>) {
    match client {
        Some(client) => client.closed().await,
        None => std::future::pending().await,
    }
}
