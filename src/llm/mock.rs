//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 默认根据最后一条 User 消息合成一段 Markdown 章节文本，便于本地跑通整条生成流水线；
//! 也可注入脚本化响应或失败序列，测试回退与重生成路径。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::traits::{GenerationOptions, LlmClient, LlmError, Message, Role};

/// Mock 客户端：确定性合成 / 脚本化响应 / 前 N 次失败
#[derive(Debug, Default)]
pub struct MockLlmClient {
    scripted: Mutex<VecDeque<Result<String, LlmError>>>,
    fail_remaining: Mutex<u32>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定响应，用尽后回到默认合成
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            scripted: Mutex::new(responses.into_iter().map(Ok).collect()),
            fail_remaining: Mutex::new(0),
        }
    }

    /// 依次返回给定结果（可混合 Ok / Err）
    pub fn with_script(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            scripted: Mutex::new(script.into()),
            fail_remaining: Mutex::new(0),
        }
    }

    /// 前 n 次调用失败，之后回到默认合成
    pub fn failing_times(n: u32) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            fail_remaining: Mutex::new(n),
        }
    }

    /// 根据最后一条 User 消息合成一段结构良好的 Markdown 文本
    fn synthesize(messages: &[Message]) -> String {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        // 从 prompt 里取一个可当标题用的词
        let topic: String = last_user
            .split_whitespace()
            .filter(|w| w.len() > 3)
            .take(4)
            .collect::<Vec<_>>()
            .join(" ");
        let topic = if topic.is_empty() { "Overview".to_string() } else { topic };

        format!(
            "## {topic}\n\n\
             This section examines {topic} in practical terms. The discussion \
             builds on the points established earlier and keeps the same register \
             throughout, so the document reads as one piece.\n\n\
             Furthermore, the material here introduces concrete details that the \
             reader can act on, rather than restating what previous sections \
             already covered. Each claim stays close to the supplied evidence.\n\n\
             In short, {topic} fits into the larger argument as one step in a \
             sequence, and the next section continues from here.\n"
        )
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        if let Some(next) = self.scripted.lock().unwrap().pop_front() {
            return next;
        }

        {
            let mut remaining = self.fail_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(LlmError::Api("mock failure".to_string()));
            }
        }

        Ok(Self::synthesize(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn opts() -> GenerationOptions {
        GenerationOptions::with_timeout(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_default_synthesis_is_markdown() {
        let client = MockLlmClient::new();
        let out = client
            .generate(&[Message::user("Write about async runtimes")], &opts())
            .await
            .unwrap();
        assert!(out.starts_with("## "));
        assert!(out.split("\n\n").count() >= 3);
    }

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let client = MockLlmClient::with_responses(vec!["one".into(), "two".into()]);
        assert_eq!(client.generate(&[], &opts()).await.unwrap(), "one");
        assert_eq!(client.generate(&[], &opts()).await.unwrap(), "two");
        // 用尽后回到合成
        assert!(client.generate(&[Message::user("x")], &opts()).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_times() {
        let client = MockLlmClient::failing_times(2);
        assert!(client.generate(&[], &opts()).await.is_err());
        assert!(client.generate(&[], &opts()).await.is_err());
        assert!(client.generate(&[Message::user("x")], &opts()).await.is_ok());
    }
}
