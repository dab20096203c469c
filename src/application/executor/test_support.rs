//! 执行器测试用的装配：Scripted Engine + 真实 worker

use std::fs::File;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::application::ports::{SafetyAssets, TaskRunnerPort};
use crate::infrastructure::adapters::{EngineProbe, ScriptedEngine, ScriptedEngineConfig};
use crate::infrastructure::dispatch::ThreadPoolScheduler;
use crate::infrastructure::memory::InMemoryMetrics;
use crate::infrastructure::worker::{flush, ModelWorker, ModelWorkerConfig};

use super::model_executor::{ExecutorContext, LoadModelParams, ModelExecutor};
use super::responder::OnComplete;

pub(crate) const MODEL_THREAD: &str = "test-model-worker";
pub(crate) const SAFETY_THREAD: &str = "test-safety-worker";

pub(crate) struct Harness {
    pub context: ExecutorContext,
    pub probe: Arc<EngineProbe>,
    pub metrics: Arc<InMemoryMetrics>,
    pub worker: Arc<ModelWorker>,
}

impl Harness {
    pub fn new(config: ScriptedEngineConfig) -> Self {
        let engine = ScriptedEngine::new(config);
        let probe = engine.probe();
        let metrics = InMemoryMetrics::new().arc();
        let worker = ModelWorker::spawn(ModelWorkerConfig {
            thread_name: MODEL_THREAD.to_string(),
        })
        .unwrap()
        .arc();
        let safety_worker = ModelWorker::spawn(ModelWorkerConfig {
            thread_name: SAFETY_THREAD.to_string(),
        })
        .unwrap()
        .arc();
        let context = ExecutorContext {
            engine: Arc::new(engine),
            runner: worker.clone(),
            safety_runner: safety_worker,
            scheduler: Arc::new(ThreadPoolScheduler::current()),
            metrics: metrics.clone(),
            max_top_k: 40,
        };
        Self {
            context,
            probe,
            metrics,
            worker,
        }
    }

    pub async fn load(&self, max_tokens: u32) -> ModelExecutor {
        ModelExecutor::load(self.context.clone(), LoadModelParams::new(weights(), max_tokens))
            .await
            .unwrap()
    }

    pub async fn load_with_assets(
        &self,
        assets: SafetyAssets,
    ) -> Result<ModelExecutor, crate::domain::LoadError> {
        let mut params = LoadModelParams::new(weights(), 64);
        params.safety_assets = assets;
        ModelExecutor::load(self.context.clone(), params).await
    }

    /// 让主模型队列停在一个阻塞任务上，直到返回的 sender 被丢弃或发送
    pub fn hold_worker(&self) -> std::sync::mpsc::Sender<()> {
        let (release, gate) = std::sync::mpsc::channel::<()>();
        self.worker
            .post(Box::new(move || {
                let _ = gate.recv();
            }))
            .unwrap();
        release
    }

    /// 等待主模型队列中此前的任务全部执行
    pub async fn flush(&self) {
        flush(self.worker.as_ref()).await.unwrap();
    }
}

pub(crate) fn weights() -> File {
    tempfile::tempfile().unwrap()
}

/// 计数的完成续体，外加一个完成信号
pub(crate) fn completion() -> (OnComplete, Arc<AtomicUsize>, oneshot::Receiver<()>) {
    let count = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel();
    let counter = count.clone();
    let on_complete: OnComplete = Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = tx.send(());
    });
    (on_complete, count, rx)
}
