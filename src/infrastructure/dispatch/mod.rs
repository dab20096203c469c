//! Dispatch Layer - 引擎续体调度
//!
//! 实现 SchedulerPort：把引擎请求的续体投递到阻塞线程池

mod thread_pool;

pub use thread_pool::ThreadPoolScheduler;
