//! Execution Responder - 单次生成请求的流式输出与完成记账
//!
//! 状态机：Idle → Streaming → Completed | Canceled。
//! 所有退出路径（显式取消、sink 断开、句柄被丢弃）都走同一段收尾逻辑，
//! `on_complete` 恰好被调用一次。

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::application::ports::{metric_names, tokens_per_second, ExecutionOutput, MetricsPort};
use crate::domain::ExecuteOptions;

use super::callbacks;
use super::cancel::{CancelHandle, CancelToken};
use super::session_accessor::SessionAccessor;

/// 一段流式输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseChunk {
    pub text: String,
}

/// 生成完成记录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSummary {
    pub output_tokens: u32,
    pub text: String,
}

/// 推送给调用方的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum StreamEvent {
    Chunk(ResponseChunk),
    Complete(ResponseSummary),
}

/// 流式输出 sink；接收端被丢弃即视为断开
pub type StreamSink = mpsc::UnboundedSender<StreamEvent>;

/// 完成续体
pub type OnComplete = Box<dyn FnOnce() + Send + 'static>;

/// 持有完成续体，无论经由哪条路径都只调用一次（包括任务被直接丢弃）
pub(crate) struct CompletionGuard(Option<OnComplete>);

impl CompletionGuard {
    pub(crate) fn new(on_complete: Option<OnComplete>) -> Self {
        Self(on_complete)
    }

    pub(crate) fn run(&mut self) {
        if let Some(on_complete) = self.0.take() {
            on_complete();
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.run();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponderState {
    Idle,
    Streaming,
    Completed,
    Canceled,
}

/// Responder 句柄
///
/// 由调用点持有；被丢弃时触发取消
pub(crate) struct ResponderHandle {
    _shutdown: DropGuard,
}

pub(crate) struct Responder {
    request_id: u64,
    sink: StreamSink,
    on_complete: CompletionGuard,
    session: Option<SessionAccessor>,
    cancel: CancelToken,
    metrics: Arc<dyn MetricsPort>,
    state: ResponderState,
    num_tokens: u32,
    output_so_far: String,
    first_token_time: Option<Instant>,
}

impl Responder {
    /// 投递生成任务并在 owner 侧启动输出转发
    ///
    /// 必须在 tokio runtime 中调用
    pub(crate) fn start(
        request_id: u64,
        session: SessionAccessor,
        options: ExecuteOptions,
        sink: StreamSink,
        on_complete: Option<OnComplete>,
        metrics: Arc<dyn MetricsPort>,
    ) -> (ResponderHandle, CancelHandle) {
        let cancel = CancelToken::new();
        let (output_fn, outputs) = callbacks::output_channel();
        session.execute(options, Some(output_fn), None, cancel.clone());

        let shutdown = CancellationToken::new();
        let responder = Self {
            request_id,
            sink,
            on_complete: CompletionGuard::new(on_complete),
            session: Some(session),
            cancel,
            metrics,
            state: ResponderState::Idle,
            num_tokens: 0,
            output_so_far: String::new(),
            first_token_time: None,
        };
        tokio::spawn(responder.run(outputs, shutdown.clone()));

        let handle = CancelHandle::new(shutdown.clone());
        (
            ResponderHandle {
                _shutdown: shutdown.drop_guard(),
            },
            handle,
        )
    }

    async fn run(
        mut self,
        mut outputs: mpsc::UnboundedReceiver<ExecutionOutput>,
        shutdown: CancellationToken,
    ) {
        let sink = self.sink.clone();
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    self.abort("cancel requested");
                    return;
                }
                _ = sink.closed() => {
                    self.abort("sink disconnected");
                    return;
                }
                output = outputs.recv() => match output {
                    Some(ExecutionOutput::InProgress(text)) => self.on_text(text),
                    Some(ExecutionOutput::Complete) => {
                        self.on_finished();
                        return;
                    }
                    None => {
                        // 引擎放弃回调且未送达完成哨兵：取消或任务被跳过
                        self.abort("engine released output callback");
                        return;
                    }
                },
            }
        }
    }

    fn on_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if self.state == ResponderState::Idle {
            self.state = ResponderState::Streaming;
        }
        self.num_tokens += 1;
        // 从第一个 token 开始计时，不计入上下文处理时间
        self.first_token_time.get_or_insert_with(Instant::now);
        self.output_so_far.push_str(&text);
        let _ = self.sink.send(StreamEvent::Chunk(ResponseChunk { text }));
    }

    fn on_finished(&mut self) {
        // 立即释放会话，尽早归还原生资源
        self.session = None;
        self.cancel.finish();
        self.state = ResponderState::Completed;

        self.metrics
            .record(metric_names::OUTPUT_TOKEN_COUNT, u64::from(self.num_tokens));
        if self.num_tokens > 1 {
            // 计时起点是第一个 token，所以按 num_tokens - 1 计算
            if let Some(first) = self.first_token_time {
                self.metrics.record(
                    metric_names::OUTPUT_TOKENS_PER_SECOND,
                    tokens_per_second(u64::from(self.num_tokens - 1), first.elapsed()),
                );
            }
        }

        let summary = ResponseSummary {
            output_tokens: self.num_tokens,
            text: std::mem::take(&mut self.output_so_far),
        };
        let _ = self.sink.send(StreamEvent::Complete(summary));

        tracing::debug!(
            request_id = self.request_id,
            output_tokens = self.num_tokens,
            "Generation completed"
        );
        self.on_complete.run();
    }

    fn abort(&mut self, reason: &'static str) {
        self.session = None;
        let fired = self.cancel.cancel();
        let previous = self.state;
        self.state = ResponderState::Canceled;

        tracing::debug!(
            request_id = self.request_id,
            reason = reason,
            from_state = ?previous,
            output_tokens = self.num_tokens,
            fired = fired,
            "Generation cancelled"
        );
        self.on_complete.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_completion_guard_runs_once_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let mut guard = CompletionGuard::new(Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        guard.run();
        guard.run();
        drop(guard);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_completion_guard_fires_when_never_run() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        drop(CompletionGuard::new(Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
