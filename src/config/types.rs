//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;

use crate::domain::PerformanceFlags;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 模型配置
    #[serde(default)]
    pub model: ModelConfig,

    /// Worker 配置
    #[serde(default)]
    pub worker: WorkerConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 模型配置
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// 模型权重文件
    #[serde(default = "default_weights_path")]
    pub weights_path: PathBuf,

    /// 模型 token 上限（加载时还会再钳制）
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// 平台允许的最大 top_k
    #[serde(default = "default_max_top_k")]
    pub max_top_k: u32,

    /// 支持的 adaptation rank
    #[serde(default)]
    pub adaptation_ranks: Vec<u32>,

    #[serde(default = "default_true")]
    pub prefer_texture_weights: bool,

    #[serde(default = "default_true")]
    pub enable_host_mapped_pointer: bool,

    #[serde(default)]
    pub use_low_power: bool,

    #[serde(default = "default_true")]
    pub allow_fp16: bool,

    /// 文本安全模型数据（可选）
    #[serde(default)]
    pub safety_data_path: Option<PathBuf>,

    /// 安全模型使用的 sentencepiece 模型（可选）
    #[serde(default)]
    pub sp_model_path: Option<PathBuf>,

    /// 语言检测模型（可选）
    #[serde(default)]
    pub language_detection_path: Option<PathBuf>,
}

fn default_weights_path() -> PathBuf {
    PathBuf::from("data/model.bin")
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_top_k() -> u32 {
    40
}

fn default_true() -> bool {
    true
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights_path: default_weights_path(),
            max_tokens: default_max_tokens(),
            max_top_k: default_max_top_k(),
            adaptation_ranks: Vec::new(),
            prefer_texture_weights: true,
            enable_host_mapped_pointer: true,
            use_low_power: false,
            allow_fp16: true,
            safety_data_path: None,
            sp_model_path: None,
            language_detection_path: None,
        }
    }
}

impl ModelConfig {
    /// 传给引擎的性能选项
    pub fn performance_flags(&self) -> PerformanceFlags {
        PerformanceFlags {
            prefer_texture_weights: self.prefer_texture_weights,
            enable_host_mapped_pointer: self.enable_host_mapped_pointer,
            use_low_power: self.use_low_power,
            allow_fp16: self.allow_fp16,
        }
    }
}

/// Worker 配置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// 主模型 worker 线程名
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// 安全模型 worker 线程名
    #[serde(default = "default_safety_thread_name")]
    pub safety_thread_name: String,
}

fn default_thread_name() -> String {
    "model-worker".to_string()
}

fn default_safety_thread_name() -> String {
    "safety-worker".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            safety_thread_name: default_safety_thread_name(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.model.max_top_k, 40);
        assert_eq!(config.model.max_tokens, 4096);
        assert_eq!(config.worker.thread_name, "model-worker");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_performance_flags_mirror_config() {
        let mut config = ModelConfig::default();
        assert_eq!(config.performance_flags(), PerformanceFlags::default());

        config.use_low_power = true;
        config.allow_fp16 = false;
        let flags = config.performance_flags();
        assert!(flags.use_low_power);
        assert!(!flags.allow_fp16);
        assert!(flags.prefer_texture_weights);
    }
}
