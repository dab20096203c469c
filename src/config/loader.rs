//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `ONDEVICE_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `ONDEVICE_MODEL__WEIGHTS_PATH=/models/base.bin`
/// - `ONDEVICE_MODEL__MAX_TOP_K=64`
/// - `ONDEVICE_WORKER__THREAD_NAME=llm-worker`
/// - `ONDEVICE_LOG__LEVEL=debug`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("model.weights_path", "data/model.bin")?
        .set_default("model.max_tokens", 4096)?
        .set_default("model.max_top_k", 40)?
        .set_default("model.prefer_texture_weights", true)?
        .set_default("model.enable_host_mapped_pointer", true)?
        .set_default("model.use_low_power", false)?
        .set_default("model.allow_fp16", true)?
        .set_default("worker.thread_name", "model-worker")?
        .set_default("worker.safety_thread_name", "safety-worker")?
        .set_default("log.level", "info")?;

    // 2. 配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    // 例如: ONDEVICE_MODEL__MAX_TOKENS=2048
    builder = builder.add_source(
        Environment::with_prefix("ONDEVICE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.model.max_top_k == 0 {
        return Err(ConfigError::ValidationError(
            "Platform max top_k must be at least 1".to_string(),
        ));
    }

    if config.model.max_tokens == 0 {
        return Err(ConfigError::ValidationError(
            "Model max_tokens cannot be 0".to_string(),
        ));
    }

    if config.worker.thread_name.is_empty() || config.worker.safety_thread_name.is_empty() {
        return Err(ConfigError::ValidationError(
            "Worker thread name cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Weights: {}", config.model.weights_path.display());
    tracing::info!("Max Tokens: {}", config.model.max_tokens);
    tracing::info!("Max Top-K: {}", config.model.max_top_k);
    tracing::info!("Adaptation Ranks: {:?}", config.model.adaptation_ranks);
    tracing::info!("Performance: {:?}", config.model.performance_flags());
    if let Some(path) = &config.model.safety_data_path {
        tracing::info!("Safety Model: {}", path.display());
    }
    if let Some(path) = &config.model.language_detection_path {
        tracing::info!("Language Detection Model: {}", path.display());
    }
    tracing::info!("Worker Thread: {}", config.worker.thread_name);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}
