//! Session - 绑定到模型 / adaptation 的可克隆会话
//!
//! - add_context: 把输入写入本会话已累积的上下文
//! - execute: 在会话的克隆上生成，并发调用互不共享可变状态
//! - size_in_tokens / score: 只读查询
//! - clone: 快照克隆，不等待 worker

use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::application::error::ExecutionError;
use crate::application::ports::MetricsPort;
use crate::domain::{AdaptationId, ContextMode, InputOptions, SamplingLimits};

use super::cancel::CancelHandle;
use super::context_holder::{ContextAccumulator, ContextClient, ContextRegistry};
use super::responder::{OnComplete, Responder, ResponderHandle, StreamEvent, StreamSink};
use super::session_accessor::SessionAccessor;

/// 会话原型对：带上下文的工作会话与始终为空的会话
pub(crate) struct SessionPair {
    accumulated: SessionAccessor,
    empty: SessionAccessor,
}

impl SessionPair {
    /// 从同一个基础会话派生两份原型
    pub(crate) fn from_base(base: SessionAccessor) -> Self {
        let empty = base.clone_accessor();
        Self {
            accumulated: base,
            empty,
        }
    }

    pub(crate) fn get(&self, mode: ContextMode) -> &SessionAccessor {
        match mode {
            ContextMode::Accumulated => &self.accumulated,
            ContextMode::Empty => &self.empty,
        }
    }

    pub(crate) fn clone_pair(&self) -> Self {
        Self {
            accumulated: self.accumulated.clone_accessor(),
            empty: self.empty.clone_accessor(),
        }
    }
}

/// 会话
pub struct Session {
    id: Uuid,
    adaptation_id: Option<AdaptationId>,
    sessions: SessionPair,
    limits: SamplingLimits,
    metrics: Arc<dyn MetricsPort>,
    /// 当前调用点的 Responder；新的 execute 会替换（并取消）旧的
    responder: Option<ResponderHandle>,
    context_holders: Arc<ContextRegistry>,
    next_request_id: u64,
}

impl Session {
    pub(crate) fn new(
        sessions: SessionPair,
        limits: SamplingLimits,
        metrics: Arc<dyn MetricsPort>,
        adaptation_id: Option<AdaptationId>,
    ) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            adaptation_id,
            sessions,
            limits,
            metrics,
            responder: None,
            context_holders: Arc::new(ContextRegistry::new()),
            next_request_id: 0,
        };
        tracing::debug!(
            session_id = %session.id,
            adaptation_id = ?adaptation_id,
            max_tokens = limits.budget.tokens(),
            "Session created"
        );
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn adaptation_id(&self) -> Option<AdaptationId> {
        self.adaptation_id
    }

    /// 该会话单次请求的 token 上限
    pub fn max_tokens(&self) -> u32 {
        self.limits.budget.tokens()
    }

    /// 尚未完成的上下文写入数
    pub fn pending_context_requests(&self) -> usize {
        self.context_holders.len()
    }

    fn next_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// 写入上下文，立即返回
    ///
    /// 同一会话上的多次写入按调用顺序作用到模型
    ///
    /// # Panics
    /// 不在 tokio runtime 中调用时 panic
    pub fn add_context(
        &mut self,
        input: InputOptions,
        client: Option<ContextClient>,
        on_complete: Option<OnComplete>,
    ) -> CancelHandle {
        let request_id = self.next_request_id();
        let options = self.limits.resolve(input);
        tracing::debug!(
            session_id = %self.id,
            request_id = request_id,
            max_tokens = options.max_tokens,
            "Adding context"
        );
        ContextAccumulator::start(
            request_id,
            self.sessions.get(ContextMode::Accumulated),
            options,
            client,
            on_complete,
            self.metrics.clone(),
            &self.context_holders,
        )
    }

    /// 在会话克隆上生成输出，立即返回
    ///
    /// 之前由本会话发起、仍在进行的生成会被取消
    ///
    /// # Panics
    /// 不在 tokio runtime 中调用时 panic
    pub fn execute(
        &mut self,
        input: InputOptions,
        sink: StreamSink,
        on_complete: Option<OnComplete>,
    ) -> CancelHandle {
        let request_id = self.next_request_id();
        let cloned = self.sessions.get(input.context_mode()).clone_accessor();
        let options = self.limits.resolve(input);
        tracing::debug!(
            session_id = %self.id,
            request_id = request_id,
            max_tokens = options.max_tokens,
            top_k = options.top_k,
            temperature = options.temperature,
            "Executing"
        );
        let (responder, handle) = Responder::start(
            request_id,
            cloned,
            options,
            sink,
            on_complete,
            self.metrics.clone(),
        );
        self.responder = Some(responder);
        handle
    }

    /// execute 的拉取式封装
    ///
    /// # Panics
    /// 不在 tokio runtime 中调用时 panic
    pub fn generate(&mut self, input: InputOptions) -> impl Stream<Item = StreamEvent> {
        let (sink, events) = mpsc::unbounded_channel();
        self.execute(input, sink, None);
        futures_util::stream::unfold(events, |mut events| async move {
            events.recv().await.map(|event| (event, events))
        })
    }

    pub async fn size_in_tokens(&self, text: impl Into<String>) -> Result<u32, ExecutionError> {
        self.sessions
            .get(ContextMode::Accumulated)
            .size_in_tokens(text)
            .await
    }

    pub async fn score(&self, text: impl Into<String>) -> Result<f32, ExecutionError> {
        self.sessions.get(ContextMode::Accumulated).score(text).await
    }
}

impl Clone for Session {
    /// 快照克隆：新会话看到克隆时刻已提交的上下文，之后两者互不影响
    fn clone(&self) -> Self {
        let cloned = Self::new(
            self.sessions.clone_pair(),
            self.limits,
            self.metrics.clone(),
            self.adaptation_id,
        );
        tracing::debug!(source = %self.id, session_id = %cloned.id, "Session cloned");
        cloned
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("adaptation_id", &self.adaptation_id)
            .field("max_tokens", &self.limits.budget.tokens())
            .finish_non_exhaustive()
    }
}
