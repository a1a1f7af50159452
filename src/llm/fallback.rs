//! 回退客户端：主模型失败时恰好一次的备选尝试
//!
//! 有备选客户端时切换备选；没有时用简化 prompt（system + 最后一条 user）重试主模型。
//! 两次都失败则返回合并后的脱敏错误，绝不把空内容当成功返回。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::sanitize_provider_error;
use crate::llm::traits::{GenerationOptions, LlmClient, LlmError, Message, Role};

/// 主 + 备选（至多一次回退）的组合客户端
pub struct FallbackLlmClient {
    primary: Arc<dyn LlmClient>,
    fallback: Option<Arc<dyn LlmClient>>,
}

impl FallbackLlmClient {
    pub fn new(primary: Arc<dyn LlmClient>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn LlmClient>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// 简化 prompt：仅保留 system 与最后一条 user 消息
    fn simplify(messages: &[Message]) -> Vec<Message> {
        let mut out: Vec<Message> = messages
            .iter()
            .filter(|m| matches!(m.role, Role::System))
            .cloned()
            .collect();
        if let Some(last_user) = messages.iter().rev().find(|m| matches!(m.role, Role::User)) {
            out.push(last_user.clone());
        }
        out
    }
}

#[async_trait]
impl LlmClient for FallbackLlmClient {
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        let first_err = match self.primary.generate(messages, options).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        tracing::warn!(error = %first_err, "primary generation failed, trying fallback once");

        let second = match &self.fallback {
            Some(client) => client.generate(messages, options).await,
            None => {
                let simplified = Self::simplify(messages);
                self.primary.generate(&simplified, options).await
            }
        };

        match second {
            Ok(text) => Ok(text),
            Err(second_err) => Err(LlmError::Api(format!(
                "{}; fallback: {}",
                sanitize_provider_error(&first_err.to_string()),
                sanitize_provider_error(&second_err.to_string()),
            ))),
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        let (p1, c1, t1) = self.primary.token_usage();
        let (p2, c2, t2) = self
            .fallback
            .as_ref()
            .map(|f| f.token_usage())
            .unwrap_or((0, 0, 0));
        (p1 + p2, c1 + c2, t1 + t2)
    }
}
