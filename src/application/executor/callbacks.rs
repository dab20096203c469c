//! Callback Bridge - 把引擎回调送回发起调用的一方
//!
//! 引擎回调可能在 worker 线程或线程池上触发；这里把它们转换成通道消息，
//! 由 owner 侧的任务按顺序消费，对调用方可见的效果从不在 worker 上发生。

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::application::ports::{ContextSavedFn, ExecutionOutput, OutputFn};

/// 生成输出回调 + owner 侧接收端
pub(crate) fn output_channel() -> (OutputFn, mpsc::UnboundedReceiver<ExecutionOutput>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let output_fn: OutputFn = Arc::new(move |output| {
        // 接收端已结束（取消/完成）时直接丢弃
        let _ = tx.send(output);
    });
    (output_fn, rx)
}

/// 上下文写入完成回调 + owner 侧接收端
pub(crate) fn context_saved_channel() -> (ContextSavedFn, oneshot::Receiver<u32>) {
    let (tx, rx) = oneshot::channel();
    let saved_fn: ContextSavedFn = Box::new(move |tokens_processed| {
        let _ = tx.send(tokens_processed);
    });
    (saved_fn, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_output_channel_preserves_order_across_threads() {
        let (output_fn, mut rx) = output_channel();
        let producer = std::thread::spawn(move || {
            for i in 0..3 {
                output_fn(ExecutionOutput::InProgress(i.to_string()));
            }
            output_fn(ExecutionOutput::Complete);
        });
        producer.join().unwrap();

        assert_eq!(rx.recv().await, Some(ExecutionOutput::InProgress("0".into())));
        assert_eq!(rx.recv().await, Some(ExecutionOutput::InProgress("1".into())));
        assert_eq!(rx.recv().await, Some(ExecutionOutput::InProgress("2".into())));
        assert_eq!(rx.recv().await, Some(ExecutionOutput::Complete));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_context_saved_dropped_without_call() {
        let (saved_fn, rx) = context_saved_channel();
        drop(saved_fn);
        assert!(rx.await.is_err());
    }
}
