//! Task Runner Port - 任务投递抽象
//!
//! - TaskRunnerPort: 顺序执行原生资源任务的 Worker Queue
//! - SchedulerPort: 引擎请求宿主代为执行续体的线程池入口

use thiserror::Error;

/// 投递到执行上下文的任务
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Worker 已停止，任务无法投递
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("worker queue is closed")]
pub struct QueueClosed;

/// Task Runner Port
///
/// 严格按提交顺序（FIFO）在单个 worker 上执行任务，任务可以阻塞
pub trait TaskRunnerPort: Send + Sync {
    fn post(&self, task: Task) -> Result<(), QueueClosed>;
}

/// Scheduler Port
///
/// 引擎内部续体的执行入口，不保证顺序
pub trait SchedulerPort: Send + Sync {
    fn schedule(&self, task: Task);
}
