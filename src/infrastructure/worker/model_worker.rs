//! Model Worker - 单线程顺序任务队列
//!
//! 所有触及原生模型的任务都在这个线程上按提交顺序执行

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::application::ports::{QueueClosed, Task, TaskRunnerPort};

/// Worker 配置
#[derive(Debug, Clone)]
pub struct ModelWorkerConfig {
    /// 线程名
    pub thread_name: String,
}

impl Default for ModelWorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: "model-worker".to_string(),
        }
    }
}

/// 模型 Worker
///
/// 所有句柄被丢弃后，线程处理完剩余任务即退出
#[derive(Clone)]
pub struct ModelWorker {
    sender: mpsc::UnboundedSender<Task>,
    name: Arc<str>,
}

impl ModelWorker {
    /// 启动 worker 线程
    pub fn spawn(config: ModelWorkerConfig) -> std::io::Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();
        let name: Arc<str> = Arc::from(config.thread_name.as_str());
        let thread_name = name.clone();

        std::thread::Builder::new()
            .name(config.thread_name)
            .spawn(move || {
                tracing::info!(worker = %thread_name, "ModelWorker started");
                while let Some(task) = receiver.blocking_recv() {
                    // 单个任务 panic 不应终止整个队列
                    if catch_unwind(AssertUnwindSafe(task)).is_err() {
                        tracing::error!(worker = %thread_name, "Worker task panicked");
                    }
                }
                tracing::info!(worker = %thread_name, "ModelWorker stopped");
            })?;

        Ok(Self { sender, name })
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TaskRunnerPort for ModelWorker {
    fn post(&self, task: Task) -> Result<(), QueueClosed> {
        self.sender.send(task).map_err(|_| QueueClosed)
    }
}

/// 等待此前投递的所有任务执行完毕
pub async fn flush(runner: &dyn TaskRunnerPort) -> Result<(), QueueClosed> {
    let (tx, rx) = oneshot::channel();
    runner.post(Box::new(move || {
        let _ = tx.send(());
    }))?;
    rx.await.map_err(|_| QueueClosed)
}
