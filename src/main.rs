//! Ondevice - 常驻语言模型执行器
//!
//! 加载模型，创建会话，把命令行参数作为上下文写入，然后流式输出生成结果。

use std::sync::Arc;

use futures_util::StreamExt;

use ondevice::application::{
    ExecutorContext, LoadModelParams, ModelExecutor, SafetyAssets, StreamEvent,
};
use ondevice::config::{load_config, print_config, ModelConfig};
use ondevice::domain::InputOptions;
use ondevice::infrastructure::{
    InMemoryMetrics, ModelWorker, ModelWorkerConfig, ScriptedEngine, ThreadPoolScheduler,
};

fn open_optional(path: &Option<std::path::PathBuf>) -> std::io::Result<Option<std::fs::File>> {
    path.as_ref().map(std::fs::File::open).transpose()
}

fn safety_assets(config: &ModelConfig) -> std::io::Result<SafetyAssets> {
    Ok(SafetyAssets {
        safety_data: open_optional(&config.safety_data_path)?,
        sp_model: open_optional(&config.sp_model_path)?,
        language_detection: open_optional(&config.language_detection_path)?,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // 初始化日志
    let log_filter = format!("{},ondevice={}", config.log.level, config.log.level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter)),
        )
        .init();

    tracing::info!("Ondevice - 常驻语言模型执行器");
    print_config(&config);

    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if prompt.is_empty() {
        anyhow::bail!("Usage: ondevice <prompt>");
    }

    // 主模型与安全模型各自一个顺序队列
    let worker = ModelWorker::spawn(ModelWorkerConfig {
        thread_name: config.worker.thread_name.clone(),
    })?;
    let safety_worker = ModelWorker::spawn(ModelWorkerConfig {
        thread_name: config.worker.safety_thread_name.clone(),
    })?;

    let context = ExecutorContext {
        engine: Arc::new(ScriptedEngine::with_defaults()),
        runner: worker.arc(),
        safety_runner: safety_worker.arc(),
        scheduler: Arc::new(ThreadPoolScheduler::current()),
        metrics: InMemoryMetrics::new().arc(),
        max_top_k: config.model.max_top_k,
    };

    let weights = std::fs::File::open(&config.model.weights_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to open weights {}: {}",
            config.model.weights_path.display(),
            e
        )
    })?;
    let params = LoadModelParams {
        weights,
        max_tokens: config.model.max_tokens,
        adaptation_ranks: config.model.adaptation_ranks.clone(),
        perf: config.model.performance_flags(),
        safety_assets: safety_assets(&config.model)?,
    };
    let executor = ModelExecutor::load(context, params).await?;

    if let Some(detection) = executor.detect_language(prompt.clone()).await {
        tracing::info!(
            language = %detection.language,
            reliability = detection.reliability,
            "Prompt language detected"
        );
    }

    let mut session = executor.create_session(None);
    session.add_context(InputOptions::new(prompt.clone()), None, None);

    let mut events = Box::pin(session.generate(InputOptions::new(prompt)));
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Chunk(chunk) => print!("{}", chunk.text),
            StreamEvent::Complete(summary) => {
                println!();
                tracing::info!(output_tokens = summary.output_tokens, "Generation finished");
            }
        }
    }

    Ok(())
}
