//! Weaver 网关入口
//!
//! 启动: cargo run
//! 创建任务: POST /api/tasks，轮询: GET /api/tasks/:id

use std::sync::Arc;

use weaver::cache::InMemoryCacheStore;
use weaver::config::{load_config, AppConfig};
use weaver::core::{spawn_reaper, InMemoryTaskStore, TaskExecutor, TaskStore};
use weaver::evidence::{EvidenceProvider, HttpEvidenceProvider};
use weaver::gateway::{self, GatewayState};
use weaver::llm::{FallbackLlmClient, LlmClient, MockLlmClient, OpenAiClient};
use weaver::narrative::NarrativeSessions;
use weaver::pipeline::Pipeline;
use weaver::store::InMemoryMetricsStore;

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock），并包上一次性回退
fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    if std::env::var("OPENAI_API_KEY").is_ok() {
        let base = cfg.llm.base_url.as_deref();
        tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
        let primary: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(base, &cfg.llm.model, None));

        let mut client = FallbackLlmClient::new(primary);
        if let Some(fallback_model) = &cfg.llm.fallback_model {
            tracing::info!("Fallback LLM configured ({})", fallback_model);
            client = client.with_fallback(Arc::new(OpenAiClient::new(base, fallback_model, None)));
        }
        Arc::new(client)
    } else {
        tracing::warn!("No API key set, using Mock LLM");
        Arc::new(FallbackLlmClient::new(Arc::new(MockLlmClient::new())))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    weaver::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let llm = create_llm_from_config(&cfg);
    let evidence: Arc<dyn EvidenceProvider> = Arc::new(HttpEvidenceProvider::new(
        cfg.evidence.allowed_domains.clone(),
        cfg.evidence.timeout_secs,
        cfg.evidence.max_snippet_chars,
        cfg.evidence.max_results,
    ));
    let cache = Arc::new(InMemoryCacheStore::new(cfg.cache.capacity));
    let sessions = Arc::new(NarrativeSessions::new(cfg.narrative.clone()));
    let metrics: Arc<dyn weaver::store::MetricsStore> = Arc::new(InMemoryMetricsStore::new());
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());

    let pipeline = Arc::new(Pipeline::new(
        &cfg,
        llm,
        evidence,
        cache,
        Arc::clone(&sessions),
        Arc::clone(&metrics),
    ));
    let executor = Arc::new(TaskExecutor::new(
        Arc::clone(&store),
        cfg.tasks.max_concurrent,
    ));

    // reaper：过期任务与闲置文档会话都按保留窗口无条件清除
    spawn_reaper(Arc::clone(&store), cfg.tasks.reap_interval_secs);
    {
        let sessions = Arc::clone(&sessions);
        let interval = cfg.tasks.reap_interval_secs.max(1);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(interval));
            loop {
                ticker.tick().await;
                sessions.sweep_idle().await;
            }
        });
    }

    let state = Arc::new(GatewayState {
        store,
        executor,
        pipeline,
        metrics,
        tasks_cfg: cfg.tasks.clone(),
    });

    let addr = cfg
        .app
        .listen_addr
        .clone()
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());
    gateway::serve(state, &addr).await
}
