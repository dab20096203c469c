//! Worker Layer - 原生资源的顺序执行上下文
//!
//! 实现 ModelWorker：单线程、FIFO、允许阻塞

mod model_worker;

pub use model_worker::{flush, ModelWorker, ModelWorkerConfig};
