//! 生成流水线：按任务类型分发的操作集合
//!
//! 所有依赖（LLM / 缓存 / 证据 / 叙事会话 / 指标存储）以注入方式持有，
//! 操作本身只通过 ProgressReporter 与取消令牌同外界交互。

pub mod outline;
pub mod params;
pub mod research;
pub mod section;
pub mod seo;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::config::AppConfig;
use crate::core::{sanitize_provider_error, PipelineError, ProgressReporter, TaskKind};
use crate::evidence::EvidenceProvider;
use crate::llm::{GenerationOptions, LlmClient, LlmError};
use crate::narrative::{NarrativeSessions, TransitionGenerator};
use crate::quality::QualityGate;
use crate::store::MetricsStore;

pub use params::{validate, OutlineParams, ResearchParams, SectionParams, SeoParams};

/// 流水线：任务类型 → 操作
pub struct Pipeline {
    llm: Arc<dyn LlmClient>,
    cache: Arc<dyn CacheStore>,
    evidence: Arc<dyn EvidenceProvider>,
    sessions: Arc<NarrativeSessions>,
    metrics: Arc<dyn MetricsStore>,
    gate: QualityGate,
    transitions: TransitionGenerator,
    request_timeout: Duration,
    cache_ttl: Duration,
}

impl Pipeline {
    pub fn new(
        cfg: &AppConfig,
        llm: Arc<dyn LlmClient>,
        evidence: Arc<dyn EvidenceProvider>,
        cache: Arc<dyn CacheStore>,
        sessions: Arc<NarrativeSessions>,
        metrics: Arc<dyn MetricsStore>,
    ) -> Self {
        let transitions = TransitionGenerator::new(
            Arc::clone(&llm),
            Duration::from_secs(cfg.llm.transition_timeout_secs),
        );
        Self {
            llm,
            cache,
            evidence,
            sessions,
            metrics,
            gate: QualityGate::new(cfg.quality.clone()),
            transitions,
            request_timeout: Duration::from_secs(cfg.llm.request_timeout_secs),
            cache_ttl: Duration::from_secs(cfg.cache.ttl_secs),
        }
    }

    /// 执行一个任务类型的操作（由执行器在截止时间与许可内调用）
    pub async fn run(
        &self,
        kind: TaskKind,
        params: serde_json::Value,
        reporter: ProgressReporter,
        token: CancellationToken,
    ) -> Result<serde_json::Value, PipelineError> {
        match kind {
            TaskKind::Research => self.run_research(params, reporter, token).await,
            TaskKind::Outline => self.run_outline(params, reporter, token).await,
            TaskKind::Section => self.run_section(params, reporter, token).await,
            TaskKind::SeoAnalysis => self.run_seo(params, reporter).await,
        }
    }

    pub(crate) fn generation_options(&self) -> GenerationOptions {
        GenerationOptions::with_timeout(self.request_timeout)
    }

    pub(crate) fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub(crate) fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub(crate) fn evidence(&self) -> &Arc<dyn EvidenceProvider> {
        &self.evidence
    }

    pub(crate) fn sessions(&self) -> &Arc<NarrativeSessions> {
        &self.sessions
    }

    pub(crate) fn metrics(&self) -> &Arc<dyn MetricsStore> {
        &self.metrics
    }

    pub(crate) fn gate(&self) -> &QualityGate {
        &self.gate
    }

    pub(crate) fn transitions(&self) -> &TransitionGenerator {
        &self.transitions
    }

    pub(crate) fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }
}

/// LlmError → PipelineError（消息统一脱敏）
pub(crate) fn map_llm_error(e: LlmError) -> PipelineError {
    match e {
        LlmError::Timeout(secs) => PipelineError::ProviderTimeout(secs),
        LlmError::Api(msg) => PipelineError::ProviderFailure(sanitize_provider_error(&msg)),
        LlmError::EmptyResponse => {
            PipelineError::ProviderFailure("content provider error: empty response".into())
        }
    }
}

/// 反序列化已校验过的参数；失败说明创建路径被绕过，按校验错误处理
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(
    params: serde_json::Value,
) -> Result<T, PipelineError> {
    serde_json::from_value(params).map_err(|e| PipelineError::Validation(e.to_string()))
}
