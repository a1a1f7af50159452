//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / Fallback）实现 LlmClient：generate 必须遵守调用方超时，
//! 失败返回类型化错误而不是挂起。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// LLM 调用错误（类型化，供上层决定回退与脱敏）
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// 调用方给定的超时已到
    #[error("Provider timed out after {0}s")]
    Timeout(u64),

    /// API 返回错误
    #[error("Provider API error: {0}")]
    Api(String),

    /// 返回内容为空或无法使用
    #[error("Provider returned an empty response")]
    EmptyResponse,
}

/// 单次生成的选项；timeout 必填，由客户端强制执行
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub timeout: Duration,
    pub temperature: Option<f32>,
}

impl GenerationOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            temperature: None,
        }
    }
}

/// LLM 客户端 trait：在超时内完成一次生成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
