//! Infrastructure Layer - 基础设施层
//!
//! 提供所有端口的具体实现

pub mod adapters;
pub mod dispatch;
pub mod memory;
pub mod worker;

pub use adapters::{ScriptedEngine, ScriptedEngineConfig};
pub use dispatch::ThreadPoolScheduler;
pub use memory::InMemoryMetrics;
pub use worker::{ModelWorker, ModelWorkerConfig};
