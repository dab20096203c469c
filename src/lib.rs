//! Ondevice - 常驻语言模型的执行器
//!
//! 架构设计: DDD + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Model Context: 请求参数、token 预算与钳制规则
//!
//! 应用层 (application/):
//! - Ports: 端口定义（InferenceEngine, TaskRunner, Scheduler, Metrics, TextSafety）
//! - Executor: 模型加载、会话、流式 Responder、上下文累积器
//!
//! 基础设施层 (infrastructure/):
//! - Worker: ModelWorker 单线程 FIFO 队列
//! - Dispatch: 引擎续体的线程池调度
//! - Memory: 指标记录
//! - Adapters: Scripted Engine

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
