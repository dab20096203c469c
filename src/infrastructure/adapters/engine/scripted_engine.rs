//! Scripted Engine - 进程内的确定性推理引擎
//!
//! 不做真实前向计算：上下文按空白分词累积，生成时逐词输出固定回复，
//! 或回显会话看到的全部内容（上下文加本次输入）。
//! 用于本地演示和测试，并通过 EngineProbe 暴露引擎侧观察到的调用。

use std::collections::HashSet;
use std::fs::File;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::application::ports::{
    ContextSavedFn, ExecutionOutput, InferenceEnginePort, LanguageDetection, ModelDescriptor,
    NativeCancelFn, NativeModel, NativeSafetyModel, NativeSession, OutputFn, SafetyAssets,
    SafetyInfo, SchedulerPort,
};
use crate::domain::{ExecuteOptions, PerformanceFlags};

/// Scripted Engine 配置
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngineConfig {
    /// 固定回复，逐词输出；为空时回显上下文和输入
    pub reply: Vec<String>,
    /// 输出完所有词后不发送完成哨兵，直到被取消
    pub hold_open: bool,
    /// 生成在 scheduler 的线程池上进行，而不是在 worker 上同步完成
    pub schedule_generation: bool,
    pub fail_model: bool,
    pub fail_adaptation: bool,
    pub fail_safety_model: bool,
    /// 安全分类时视为不安全的词
    pub unsafe_words: Vec<String>,
}

/// 引擎收到的模型描述
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorRecord {
    pub max_tokens: u32,
    pub top_k: u32,
    pub temperature: f32,
    pub adaptation_ranks: Vec<u32>,
    pub perf: PerformanceFlags,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 引擎侧观测
#[derive(Debug, Default)]
pub struct EngineProbe {
    live_models: AtomicUsize,
    live_sessions: AtomicUsize,
    adaptations: AtomicUsize,
    cancels: AtomicUsize,
    descriptors: Mutex<Vec<DescriptorRecord>>,
    executions: Mutex<Vec<ExecuteOptions>>,
    contexts: Mutex<Vec<String>>,
    threads: Mutex<HashSet<String>>,
}

impl EngineProbe {
    fn touch(&self) {
        let name = std::thread::current()
            .name()
            .unwrap_or("<unnamed>")
            .to_string();
        lock(&self.threads).insert(name);
    }

    pub fn live_models(&self) -> usize {
        self.live_models.load(Ordering::SeqCst)
    }

    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }

    pub fn adaptations(&self) -> usize {
        self.adaptations.load(Ordering::SeqCst)
    }

    /// 引擎取消函数被调用的次数
    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn descriptors(&self) -> Vec<DescriptorRecord> {
        lock(&self.descriptors).clone()
    }

    /// 生成请求收到的（已钳制的）参数
    pub fn executions(&self) -> Vec<ExecuteOptions> {
        lock(&self.executions).clone()
    }

    /// 按写入顺序记录的上下文文本
    pub fn contexts(&self) -> Vec<String> {
        lock(&self.contexts).clone()
    }

    /// 调用过原生接口的线程名
    pub fn threads(&self) -> HashSet<String> {
        lock(&self.threads).clone()
    }
}

/// Scripted Engine
pub struct ScriptedEngine {
    config: Arc<ScriptedEngineConfig>,
    probe: Arc<EngineProbe>,
}

impl ScriptedEngine {
    pub fn new(config: ScriptedEngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            probe: Arc::new(EngineProbe::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ScriptedEngineConfig::default())
    }

    pub fn probe(&self) -> Arc<EngineProbe> {
        self.probe.clone()
    }
}

impl InferenceEnginePort for ScriptedEngine {
    fn create_model(
        &self,
        descriptor: ModelDescriptor,
        scheduler: Arc<dyn SchedulerPort>,
    ) -> Option<Box<dyn NativeModel>> {
        self.probe.touch();
        lock(&self.probe.descriptors).push(DescriptorRecord {
            max_tokens: descriptor.max_tokens,
            top_k: descriptor.top_k,
            temperature: descriptor.temperature,
            adaptation_ranks: descriptor.adaptation_ranks.clone(),
            perf: descriptor.perf,
        });
        if self.config.fail_model {
            tracing::debug!("ScriptedEngine: refusing to create model");
            return None;
        }
        self.probe.live_models.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(ScriptedModel {
            config: self.config.clone(),
            probe: self.probe.clone(),
            scheduler,
        }))
    }

    fn create_safety_model(&self, assets: SafetyAssets) -> Option<Box<dyn NativeSafetyModel>> {
        self.probe.touch();
        if self.config.fail_safety_model {
            return None;
        }
        Some(Box::new(ScriptedSafetyModel {
            has_language_model: assets.language_detection.is_some(),
            has_safety_model: assets.safety_data.is_some(),
            unsafe_words: self.config.unsafe_words.clone(),
        }))
    }
}

struct ScriptedModel {
    config: Arc<ScriptedEngineConfig>,
    probe: Arc<EngineProbe>,
    scheduler: Arc<dyn SchedulerPort>,
}

impl NativeModel for ScriptedModel {
    fn create_session(&mut self, adaptation: Option<File>) -> Option<Box<dyn NativeSession>> {
        self.probe.touch();
        if adaptation.is_some() {
            if self.config.fail_adaptation {
                return None;
            }
            self.probe.adaptations.fetch_add(1, Ordering::SeqCst);
        }
        Some(Box::new(ScriptedSession::new(
            self.config.clone(),
            self.probe.clone(),
            self.scheduler.clone(),
            Vec::new(),
        )))
    }
}

impl Drop for ScriptedModel {
    fn drop(&mut self) {
        self.probe.touch();
        self.probe.live_models.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ScriptedSession {
    config: Arc<ScriptedEngineConfig>,
    probe: Arc<EngineProbe>,
    scheduler: Arc<dyn SchedulerPort>,
    context: Vec<String>,
}

impl ScriptedSession {
    fn new(
        config: Arc<ScriptedEngineConfig>,
        probe: Arc<EngineProbe>,
        scheduler: Arc<dyn SchedulerPort>,
        context: Vec<String>,
    ) -> Self {
        probe.live_sessions.fetch_add(1, Ordering::SeqCst);
        Self {
            config,
            probe,
            scheduler,
            context,
        }
    }

    fn generate(&self, options: &ExecuteOptions, output: OutputFn) -> Option<NativeCancelFn> {
        lock(&self.probe.executions).push(options.clone());

        let words: Vec<String> = if self.config.reply.is_empty() {
            self.context
                .iter()
                .cloned()
                .chain(options.text.split_whitespace().map(str::to_string))
                .collect()
        } else {
            self.config.reply.clone()
        };
        let limit = options.max_tokens as usize;
        let hold_open = self.config.hold_open;
        let emit = output.clone();
        let run = move || {
            for (i, word) in words.iter().take(limit).enumerate() {
                let text = if i == 0 { word.clone() } else { format!(" {}", word) };
                emit(ExecutionOutput::InProgress(text));
            }
            if !hold_open {
                emit(ExecutionOutput::Complete);
            }
        };
        if self.config.schedule_generation {
            self.scheduler.schedule(Box::new(run));
        } else {
            run();
        }

        let probe = self.probe.clone();
        // 未完成的生成持有输出回调，直到被取消
        let held = hold_open.then_some(output);
        Some(Box::new(move || {
            probe.cancels.fetch_add(1, Ordering::SeqCst);
            drop(held);
        }))
    }
}

impl NativeSession for ScriptedSession {
    fn clone_session(&self) -> Box<dyn NativeSession> {
        self.probe.touch();
        Box::new(ScriptedSession::new(
            self.config.clone(),
            self.probe.clone(),
            self.scheduler.clone(),
            self.context.clone(),
        ))
    }

    fn execute(
        &mut self,
        options: ExecuteOptions,
        output: Option<OutputFn>,
        context_saved: Option<ContextSavedFn>,
    ) -> Option<NativeCancelFn> {
        self.probe.touch();
        if let Some(context_saved) = context_saved {
            let before = self.context.len();
            self.context.extend(
                options
                    .text
                    .split_whitespace()
                    .take(options.max_tokens as usize)
                    .map(str::to_string),
            );
            lock(&self.probe.contexts).push(options.text.clone());
            context_saved((self.context.len() - before) as u32);
            return None;
        }
        output.and_then(|output| self.generate(&options, output))
    }

    fn size_in_tokens(&mut self, text: &str) -> u32 {
        self.probe.touch();
        text.split_whitespace().count() as u32
    }

    /// 文本中出现在上下文里的词的比例
    fn score(&mut self, text: &str) -> f32 {
        self.probe.touch();
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return 0.0;
        }
        let known = words
            .iter()
            .filter(|w| self.context.iter().any(|c| c == *w))
            .count();
        known as f32 / words.len() as f32
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.probe.live_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ScriptedSafetyModel {
    has_language_model: bool,
    has_safety_model: bool,
    unsafe_words: Vec<String>,
}

impl NativeSafetyModel for ScriptedSafetyModel {
    fn detect_language(&mut self, text: &str) -> Option<LanguageDetection> {
        if !self.has_language_model {
            return None;
        }
        let ascii = !text.is_empty() && text.is_ascii();
        Some(LanguageDetection {
            language: if ascii { "en" } else { "und" }.to_string(),
            reliability: if ascii { 1.0 } else { 0.0 },
        })
    }

    fn classify_text_safety(&mut self, text: &str) -> Option<SafetyInfo> {
        if !self.has_safety_model {
            return None;
        }
        let words: Vec<&str> = text.split_whitespace().collect();
        let flagged = words
            .iter()
            .filter(|w| self.unsafe_words.iter().any(|u| u == *w))
            .count();
        let score = if words.is_empty() {
            0.0
        } else {
            flagged as f32 / words.len() as f32
        };
        Some(SafetyInfo {
            class_scores: vec![score],
        })
    }
}
