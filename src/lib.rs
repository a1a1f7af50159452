//! Weaver - Rust 长文生成编排引擎
//!
//! 模块划分：
//! - **cache**: 研究/结果缓存（指纹精确匹配 + TTL + LRU）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 任务模型、注册表、执行器、错误类型
//! - **evidence**: 证据检索（域名白名单 + 超时 + 片段截断）
//! - **gateway**: 轮询网关（axum HTTP：创建 / 轮询 / 取消 / 连贯性指标）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / 回退组合）
//! - **narrative**: 上下文记忆、Prompt 上下文、过渡句、叙事流打分
//! - **pipeline**: 按任务类型分发的操作（research / outline / section / seo-analysis）
//! - **quality**: 多维质量门与审计报告
//! - **store**: 连贯性指标的窄 get/set 存储契约

pub mod cache;
pub mod config;
pub mod core;
pub mod evidence;
pub mod gateway;
pub mod llm;
pub mod narrative;
pub mod observability;
pub mod pipeline;
pub mod quality;
pub mod store;
