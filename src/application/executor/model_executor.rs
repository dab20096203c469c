//! Model Executor - 常驻模型的加载、adaptation 与会话创建
//!
//! 原生模型只在 Worker Queue 的任务里创建和销毁；executor 被丢弃时投递一次销毁任务。

use std::fs::File;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::application::ports::{
    InferenceEnginePort, LanguageDetection, MetricsPort, ModelDescriptor, NativeModel,
    SafetyAssets, SafetyInfo, SchedulerPort, TaskRunnerPort,
};
use crate::domain::{
    clamp_model_max_tokens, AdaptationId, LoadError, PerformanceFlags, SamplingLimits,
    TokenBudget,
};

use super::safety_model::SafetyModel;
use super::session::{Session, SessionPair};
use super::session_accessor::{lock_slot, SessionAccessor};

type ModelSlot = Arc<Mutex<Option<Box<dyn NativeModel>>>>;

/// executor 依赖的端口
#[derive(Clone)]
pub struct ExecutorContext {
    pub engine: Arc<dyn InferenceEnginePort>,
    /// 主模型的 Worker Queue
    pub runner: Arc<dyn TaskRunnerPort>,
    /// 安全模型的 Worker Queue
    pub safety_runner: Arc<dyn TaskRunnerPort>,
    pub scheduler: Arc<dyn SchedulerPort>,
    pub metrics: Arc<dyn MetricsPort>,
    /// 平台允许的最大 top_k
    pub max_top_k: u32,
}

/// 模型加载参数
#[derive(Debug)]
pub struct LoadModelParams {
    pub weights: File,
    pub max_tokens: u32,
    pub adaptation_ranks: Vec<u32>,
    pub perf: PerformanceFlags,
    pub safety_assets: SafetyAssets,
}

impl LoadModelParams {
    pub fn new(weights: File, max_tokens: u32) -> Self {
        Self {
            weights,
            max_tokens,
            adaptation_ranks: Vec::new(),
            perf: PerformanceFlags::default(),
            safety_assets: SafetyAssets::default(),
        }
    }
}

/// Adaptation 加载参数
#[derive(Debug)]
pub struct LoadAdaptationParams {
    pub weights: File,
}

/// 模型执行器
pub struct ModelExecutor {
    context: ExecutorContext,
    model: ModelSlot,
    /// 加载时钳制后的模型 token 上限
    max_tokens: u32,
    /// adaptation -> 会话原型对；None 为基础模型
    base_sessions: DashMap<Option<AdaptationId>, SessionPair>,
    next_adaptation_id: AtomicU32,
    safety_model: Option<SafetyModel>,
}

impl ModelExecutor {
    /// 加载模型
    ///
    /// 原生模型在 Worker Queue 上创建；调用方只等待结果，不阻塞
    pub async fn load(
        context: ExecutorContext,
        params: LoadModelParams,
    ) -> Result<Self, LoadError> {
        let LoadModelParams {
            weights,
            max_tokens,
            adaptation_ranks,
            perf,
            safety_assets,
        } = params;

        let safety_model = if safety_assets.is_empty() {
            None
        } else {
            Some(
                SafetyModel::load(
                    context.engine.clone(),
                    context.safety_runner.clone(),
                    safety_assets,
                )
                .await?,
            )
        };

        let max_tokens = clamp_model_max_tokens(max_tokens);
        let descriptor = ModelDescriptor {
            weights,
            max_tokens,
            temperature: 0.0,
            top_k: context.max_top_k,
            adaptation_ranks,
            perf,
        };

        let model: ModelSlot = Arc::new(Mutex::new(None));
        let (base, base_slot) = SessionAccessor::detached(context.runner.clone());
        let (tx, rx) = oneshot::channel();
        let engine = context.engine.clone();
        let scheduler = context.scheduler.clone();
        let model_slot = model.clone();
        context
            .runner
            .post(Box::new(move || {
                let loaded = match engine.create_model(descriptor, scheduler) {
                    Some(mut native) => {
                        *lock_slot(&base_slot) = native.create_session(None);
                        *lock_slot(&model_slot) = Some(native);
                        true
                    }
                    None => false,
                };
                let _ = tx.send(loaded);
            }))
            .map_err(|_| LoadError::FailedToLoadLibrary)?;

        if !rx.await.unwrap_or(false) {
            tracing::error!(max_tokens = max_tokens, "Failed to load model");
            return Err(LoadError::FailedToLoadLibrary);
        }

        let base_sessions = DashMap::new();
        base_sessions.insert(None, SessionPair::from_base(base));

        tracing::info!(
            max_tokens = max_tokens,
            max_top_k = context.max_top_k,
            safety_model = safety_model.is_some(),
            "Model loaded"
        );

        Ok(Self {
            context,
            model,
            max_tokens,
            base_sessions,
            next_adaptation_id: AtomicU32::new(0),
            safety_model,
        })
    }

    /// 加载时钳制后的模型 token 上限
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// 已加载的 adaptation 数
    pub fn adaptation_count(&self) -> usize {
        self.base_sessions.len() - 1
    }

    /// 加载 adaptation，返回新分配的 id
    pub async fn load_adaptation(
        &self,
        params: LoadAdaptationParams,
    ) -> Result<AdaptationId, LoadError> {
        let (base, base_slot) = SessionAccessor::detached(self.context.runner.clone());
        let (tx, rx) = oneshot::channel();
        let model = self.model.clone();
        self.context
            .runner
            .post(Box::new(move || {
                let session = lock_slot(&model)
                    .as_mut()
                    .and_then(|native| native.create_session(Some(params.weights)));
                let loaded = session.is_some();
                *lock_slot(&base_slot) = session;
                let _ = tx.send(loaded);
            }))
            .map_err(|_| LoadError::FailedToLoadLibrary)?;

        if !rx.await.unwrap_or(false) {
            tracing::error!("Failed to load adaptation");
            return Err(LoadError::FailedToLoadLibrary);
        }

        let id = AdaptationId::new(self.next_adaptation_id.fetch_add(1, Ordering::SeqCst));
        self.base_sessions
            .insert(Some(id), SessionPair::from_base(base));
        tracing::info!(adaptation_id = %id, "Adaptation loaded");
        Ok(id)
    }

    /// 从原型克隆出新会话，不经过 Worker Queue 等待
    ///
    /// # Panics
    /// `adaptation_id` 未加载时 panic（调用方契约错误）
    pub fn create_session(&self, adaptation_id: Option<AdaptationId>) -> Session {
        let prototypes = self
            .base_sessions
            .get(&adaptation_id)
            .unwrap_or_else(|| panic!("unknown adaptation id: {:?}", adaptation_id));
        let limits = SamplingLimits::new(
            TokenBudget::from_model_max(self.max_tokens),
            self.context.max_top_k,
        );
        Session::new(
            prototypes.clone_pair(),
            limits,
            self.context.metrics.clone(),
            adaptation_id,
        )
    }

    /// 语言检测；未加载语言检测模型时返回 None
    pub async fn detect_language(&self, text: impl Into<String>) -> Option<LanguageDetection> {
        match &self.safety_model {
            Some(model) => model.detect_language(text.into()).await,
            None => None,
        }
    }

    /// 文本安全分类；未加载安全模型时返回 None
    pub async fn classify_text_safety(&self, text: impl Into<String>) -> Option<SafetyInfo> {
        match &self.safety_model {
            Some(model) => model.classify_text_safety(text.into()).await,
            None => None,
        }
    }
}

impl Drop for ModelExecutor {
    fn drop(&mut self) {
        // 原型会话先于模型释放
        self.base_sessions.clear();

        let model = self.model.clone();
        let posted = self.context.runner.post(Box::new(move || {
            if lock_slot(&model).take().is_some() {
                tracing::info!("Model destroyed");
            }
        }));
        if posted.is_err() {
            tracing::warn!("Worker stopped before model could be destroyed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::executor::test_support::{
        weights, Harness, MODEL_THREAD, SAFETY_THREAD,
    };
    use crate::infrastructure::adapters::ScriptedEngineConfig;

    #[tokio::test]
    async fn test_load_clamps_model_max_tokens() {
        let harness = Harness::new(ScriptedEngineConfig::default());
        let executor = harness.load(10).await;

        assert_eq!(executor.max_tokens(), 10);
        assert_eq!(executor.create_session(None).max_tokens(), 8);

        let tiny = harness.load(0).await;
        assert_eq!(tiny.max_tokens(), 2);
        assert_eq!(tiny.create_session(None).max_tokens(), 0);
    }

    #[tokio::test]
    async fn test_load_passes_descriptor_defaults_to_engine() {
        let harness = Harness::new(ScriptedEngineConfig::default());
        let mut params = LoadModelParams::new(weights(), 128);
        params.adaptation_ranks = vec![4, 16];
        params.perf.use_low_power = true;
        let _executor = ModelExecutor::load(harness.context.clone(), params)
            .await
            .unwrap();

        let descriptors = harness.probe.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].max_tokens, 128);
        assert_eq!(descriptors[0].top_k, 40);
        assert_eq!(descriptors[0].temperature, 0.0);
        assert_eq!(descriptors[0].adaptation_ranks, vec![4, 16]);
        assert!(descriptors[0].perf.use_low_power);
        assert!(descriptors[0].perf.prefer_texture_weights);
    }

    #[tokio::test]
    async fn test_load_failure_reports_failed_to_load_library() {
        let harness = Harness::new(ScriptedEngineConfig {
            fail_model: true,
            ..Default::default()
        });
        let result =
            ModelExecutor::load(harness.context.clone(), LoadModelParams::new(weights(), 64))
                .await;

        assert!(matches!(result, Err(LoadError::FailedToLoadLibrary)));
        harness.flush().await;
        assert_eq!(harness.probe.live_models(), 0);
    }

    #[tokio::test]
    async fn test_adaptation_ids_are_sequential() {
        let harness = Harness::new(ScriptedEngineConfig::default());
        let executor = harness.load(64).await;

        let first = executor
            .load_adaptation(LoadAdaptationParams { weights: weights() })
            .await
            .unwrap();
        let second = executor
            .load_adaptation(LoadAdaptationParams { weights: weights() })
            .await
            .unwrap();

        assert_eq!(first, AdaptationId::new(0));
        assert_eq!(second, AdaptationId::new(1));
        assert_eq!(executor.adaptation_count(), 2);
        assert_eq!(harness.probe.adaptations(), 2);

        let session = executor.create_session(Some(second));
        assert_eq!(session.adaptation_id(), Some(second));
    }

    #[tokio::test]
    async fn test_failed_adaptation_does_not_consume_id() {
        let harness = Harness::new(ScriptedEngineConfig {
            fail_adaptation: true,
            ..Default::default()
        });
        let executor = harness.load(64).await;

        let result = executor
            .load_adaptation(LoadAdaptationParams { weights: weights() })
            .await;

        assert!(matches!(result, Err(LoadError::FailedToLoadLibrary)));
        assert_eq!(executor.adaptation_count(), 0);
    }

    #[tokio::test]
    #[should_panic(expected = "unknown adaptation id")]
    async fn test_unknown_adaptation_id_panics() {
        let harness = Harness::new(ScriptedEngineConfig::default());
        let executor = harness.load(64).await;
        let _ = executor.create_session(Some(AdaptationId::new(7)));
    }

    #[tokio::test]
    async fn test_drop_releases_every_native_resource() {
        let harness = Harness::new(ScriptedEngineConfig::default());
        let executor = harness.load(64).await;
        executor
            .load_adaptation(LoadAdaptationParams { weights: weights() })
            .await
            .unwrap();
        let session = executor.create_session(None);
        harness.flush().await;
        assert_eq!(harness.probe.live_models(), 1);
        assert!(harness.probe.live_sessions() > 0);

        drop(session);
        drop(executor);
        harness.flush().await;

        assert_eq!(harness.probe.live_models(), 0);
        assert_eq!(harness.probe.live_sessions(), 0);
        assert!(harness.probe.threads().iter().all(|name| name == MODEL_THREAD));
    }

    #[tokio::test]
    async fn test_safety_queries_without_model_resolve_to_none() {
        let harness = Harness::new(ScriptedEngineConfig::default());
        let executor = harness.load(64).await;

        assert!(executor.detect_language("hello").await.is_none());
        assert!(executor.classify_text_safety("hello").await.is_none());
    }

    #[tokio::test]
    async fn test_safety_model_runs_on_its_own_worker() {
        let harness = Harness::new(ScriptedEngineConfig {
            unsafe_words: vec!["bad".to_string()],
            ..Default::default()
        });
        let executor = harness
            .load_with_assets(SafetyAssets {
                safety_data: Some(weights()),
                sp_model: Some(weights()),
                language_detection: Some(weights()),
            })
            .await
            .unwrap();

        let detection = executor.detect_language("hello world").await.unwrap();
        assert_eq!(detection.language, "en");

        let info = executor.classify_text_safety("bad good").await.unwrap();
        assert_eq!(info.class_scores, vec![0.5]);

        let threads = harness.probe.threads();
        assert!(threads.contains(SAFETY_THREAD));
        assert!(threads.contains(MODEL_THREAD));
    }

    #[tokio::test]
    async fn test_language_only_assets_leave_safety_classification_empty() {
        let harness = Harness::new(ScriptedEngineConfig::default());
        let executor = harness
            .load_with_assets(SafetyAssets {
                language_detection: Some(weights()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(executor.detect_language("hello").await.is_some());
        assert!(executor.classify_text_safety("hello").await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_safety_assets_fail_model_load() {
        let harness = Harness::new(ScriptedEngineConfig {
            fail_safety_model: true,
            ..Default::default()
        });
        let result = harness
            .load_with_assets(SafetyAssets {
                safety_data: Some(weights()),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(LoadError::FailedToLoadLibrary)));
        assert!(harness.probe.descriptors().is_empty());
    }
}
