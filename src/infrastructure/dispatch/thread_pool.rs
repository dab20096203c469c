//! Thread Pool Scheduler - 引擎续体的执行入口
//!
//! 引擎的续体可能阻塞，投递到 tokio 的阻塞线程池；
//! tokio 没有任务优先级，这里不区分用户可见与后台工作。

use tokio::runtime::Handle;

use crate::application::ports::{SchedulerPort, Task};

pub struct ThreadPoolScheduler {
    handle: Handle,
}

impl ThreadPoolScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// 使用当前 runtime
    ///
    /// # Panics
    /// 不在 tokio runtime 中调用时 panic
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl SchedulerPort for ThreadPoolScheduler {
    fn schedule(&self, task: Task) {
        let _ = self.handle.spawn_blocking(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_schedule_runs_task() {
        let scheduler = ThreadPoolScheduler::current();
        let (tx, rx) = oneshot::channel();
        scheduler.schedule(Box::new(move || {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.await.unwrap(), 42);
    }
}
