//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WEAVER__*` 覆盖（双下划线表示嵌套，如 `WEAVER__LLM__MODEL=gpt-4o`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tasks: TasksSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub narrative: NarrativeSection,
    #[serde(default)]
    pub quality: QualitySection,
    #[serde(default)]
    pub evidence: EvidenceSection,
}

/// [app] 段：网关监听地址与名称
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 网关监听地址，未设置时用 127.0.0.1:8080
    pub listen_addr: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    /// OpenAI 兼容端点的模型名；无 API Key 时回退 Mock
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 备选模型（生成失败时的唯一一次回退），未设置则用简化 prompt 重试同一模型
    pub fallback_model: Option<String>,
    /// 单次生成请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// 过渡句生成的短超时（秒）
    #[serde(default = "default_transition_timeout")]
    pub transition_timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_transition_timeout() -> u64 {
    15
}

/// [tasks] 段：各类任务的硬截止时间、并发上限与保留窗口
#[derive(Debug, Clone, Deserialize)]
pub struct TasksSection {
    /// research 任务截止（秒）
    #[serde(default = "default_research_deadline")]
    pub research_deadline_secs: u64,
    /// outline 任务截止（秒）
    #[serde(default = "default_outline_deadline")]
    pub outline_deadline_secs: u64,
    /// section 任务截止（秒）
    #[serde(default = "default_section_deadline")]
    pub section_deadline_secs: u64,
    /// seo-analysis 任务截止（秒）
    #[serde(default = "default_seo_deadline")]
    pub seo_deadline_secs: u64,
    /// 同时运行的任务数上限（超出时等待许可）
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// 任务保留窗口（秒），到期后 reaper 无条件清除
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
    /// reaper 扫描间隔（秒）
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
    /// 状态快照返回的进度条目数上限
    #[serde(default = "default_progress_tail")]
    pub progress_tail: usize,
}

fn default_research_deadline() -> u64 {
    300
}

fn default_outline_deadline() -> u64 {
    180
}

fn default_section_deadline() -> u64 {
    240
}

fn default_seo_deadline() -> u64 {
    120
}

fn default_max_concurrent() -> usize {
    8
}

fn default_retention() -> u64 {
    3600
}

fn default_reap_interval() -> u64 {
    60
}

fn default_progress_tail() -> usize {
    20
}

impl Default for TasksSection {
    fn default() -> Self {
        Self {
            research_deadline_secs: default_research_deadline(),
            outline_deadline_secs: default_outline_deadline(),
            section_deadline_secs: default_section_deadline(),
            seo_deadline_secs: default_seo_deadline(),
            max_concurrent: default_max_concurrent(),
            retention_secs: default_retention(),
            reap_interval_secs: default_reap_interval(),
            progress_tail: default_progress_tail(),
        }
    }
}

impl TasksSection {
    /// 指定任务类型的硬截止时间
    pub fn deadline_for(&self, kind: crate::core::TaskKind) -> std::time::Duration {
        use crate::core::TaskKind;
        let secs = match kind {
            TaskKind::Research => self.research_deadline_secs,
            TaskKind::Outline => self.outline_deadline_secs,
            TaskKind::Section => self.section_deadline_secs,
            TaskKind::SeoAnalysis => self.seo_deadline_secs,
        };
        std::time::Duration::from_secs(secs)
    }
}

/// [cache] 段：研究结果缓存的容量与 TTL
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// 条目数上限，超出时按 LRU 淘汰
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// 默认 TTL（秒）
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

fn default_cache_capacity() -> usize {
    256
}

fn default_cache_ttl() -> u64 {
    1800
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

/// [narrative] 段：上下文记忆的窗口与摘要预算
#[derive(Debug, Clone, Deserialize)]
pub struct NarrativeSection {
    /// 滑动窗口大小：超过该节数后，仅保留最近 K 条摘要 + 一条更早内容的聚合摘要
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// 单条章节摘要的 token 预算
    #[serde(default = "default_summary_budget")]
    pub summary_token_budget: usize,
    /// 每节提取的关键概念数上限
    #[serde(default = "default_max_concepts")]
    pub max_key_concepts: usize,
    /// 文档会话保留窗口（秒）
    #[serde(default = "default_session_retention")]
    pub session_retention_secs: u64,
}

fn default_window_size() -> usize {
    5
}

fn default_summary_budget() -> usize {
    200
}

fn default_max_concepts() -> usize {
    8
}

fn default_session_retention() -> u64 {
    7200
}

impl Default for NarrativeSection {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            summary_token_budget: default_summary_budget(),
            max_key_concepts: default_max_concepts(),
            session_retention_secs: default_session_retention(),
        }
    }
}

/// [quality] 段：审计阈值与各维度权重
#[derive(Debug, Clone, Deserialize)]
pub struct QualitySection {
    /// 总分低于该阈值时触发（至多一次）自动重生成
    #[serde(default = "default_threshold")]
    pub acceptance_threshold: f64,
    #[serde(default = "default_w_structure")]
    pub weight_structure: f64,
    #[serde(default = "default_w_factual")]
    pub weight_factual: f64,
    #[serde(default = "default_w_flow")]
    pub weight_flow: f64,
    #[serde(default = "default_w_tone")]
    pub weight_tone: f64,
    #[serde(default = "default_w_seo")]
    pub weight_seo: f64,
}

fn default_threshold() -> f64 {
    0.6
}

fn default_w_structure() -> f64 {
    0.3
}

fn default_w_factual() -> f64 {
    0.2
}

fn default_w_flow() -> f64 {
    0.25
}

fn default_w_tone() -> f64 {
    0.15
}

fn default_w_seo() -> f64 {
    0.1
}

impl Default for QualitySection {
    fn default() -> Self {
        Self {
            acceptance_threshold: default_threshold(),
            weight_structure: default_w_structure(),
            weight_factual: default_w_factual(),
            weight_flow: default_w_flow(),
            weight_tone: default_w_tone(),
            weight_seo: default_w_seo(),
        }
    }
}

/// [evidence] 段：检索抓取的超时、片段大小、允许的域名白名单
#[derive(Debug, Clone, Deserialize)]
pub struct EvidenceSection {
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    /// 单条证据片段的最大字符数
    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,
    /// 单次检索返回的结果数上限
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_max_snippet_chars() -> usize {
    2000
}

fn default_max_results() -> usize {
    5
}

fn default_allowed_domains() -> Vec<String> {
    vec![
        // 百科与学术
        "en.wikipedia.org".into(),
        "zh.wikipedia.org".into(),
        "arxiv.org".into(),
        // 开发者资源
        "github.com".into(),
        "stackoverflow.com".into(),
        "docs.rs".into(),
        "doc.rust-lang.org".into(),
        "developer.mozilla.org".into(),
        // 新闻聚合
        "news.ycombinator.com".into(),
    ]
}

impl Default for EvidenceSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_search_timeout_secs(),
            max_snippet_chars: default_max_snippet_chars(),
            max_results: default_max_results(),
            allowed_domains: default_allowed_domains(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            tasks: TasksSection::default(),
            cache: CacheSection::default(),
            narrative: NarrativeSection::default(),
            quality: QualitySection::default(),
            evidence: EvidenceSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 WEAVER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WEAVER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("WEAVER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
