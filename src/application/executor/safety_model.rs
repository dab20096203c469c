//! Safety Model - 文本安全分类 / 语言检测辅助模型
//!
//! 与主模型分开，运行在自己的顺序 worker 上

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::application::ports::{
    InferenceEnginePort, LanguageDetection, NativeSafetyModel, SafetyAssets, SafetyInfo,
    TaskRunnerPort,
};
use crate::domain::LoadError;

use super::session_accessor::lock_slot;

type SafetySlot = Arc<Mutex<Option<Box<dyn NativeSafetyModel>>>>;

pub(crate) struct SafetyModel {
    runner: Arc<dyn TaskRunnerPort>,
    slot: SafetySlot,
}

impl SafetyModel {
    pub(crate) async fn load(
        engine: Arc<dyn InferenceEnginePort>,
        runner: Arc<dyn TaskRunnerPort>,
        assets: SafetyAssets,
    ) -> Result<Self, LoadError> {
        let slot: SafetySlot = Arc::new(Mutex::new(None));
        let (tx, rx) = oneshot::channel();
        let target = slot.clone();
        runner
            .post(Box::new(move || {
                let model = engine.create_safety_model(assets);
                let loaded = model.is_some();
                *lock_slot(&target) = model;
                let _ = tx.send(loaded);
            }))
            .map_err(|_| LoadError::FailedToLoadLibrary)?;

        match rx.await {
            Ok(true) => Ok(Self { runner, slot }),
            _ => {
                tracing::error!("Invalid text safety model data supplied");
                Err(LoadError::FailedToLoadLibrary)
            }
        }
    }

    async fn call<T: Send + 'static>(
        &self,
        op: impl FnOnce(&mut dyn NativeSafetyModel) -> Option<T> + Send + 'static,
    ) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        let slot = self.slot.clone();
        self.runner
            .post(Box::new(move || {
                let value = lock_slot(&slot).as_mut().and_then(|model| op(model.as_mut()));
                let _ = tx.send(value);
            }))
            .ok()?;
        rx.await.ok().flatten()
    }

    pub(crate) async fn detect_language(&self, text: String) -> Option<LanguageDetection> {
        self.call(move |model| model.detect_language(&text)).await
    }

    pub(crate) async fn classify_text_safety(&self, text: String) -> Option<SafetyInfo> {
        self.call(move |model| model.classify_text_safety(&text)).await
    }
}

impl Drop for SafetyModel {
    fn drop(&mut self) {
        let slot = self.slot.clone();
        let _ = self.runner.post(Box::new(move || {
            drop(lock_slot(&slot).take());
        }));
    }
}
