//! 过渡句生成：衔接相邻两节的一到两句桥接文本
//!
//! 先尝试 LLM（短超时）；失败或超时则回退到确定性的模板连接句。
//! 缺一句过渡只是质量瑕疵，不值得让整条流水线失败。

use std::sync::Arc;
use std::time::Duration;

use crate::llm::{GenerationOptions, LlmClient, Message};
use crate::narrative::prompt::PromptContext;

/// 过渡句生成器
pub struct TransitionGenerator {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl TransitionGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// 生成桥接文本；此函数从不失败
    pub async fn generate(
        &self,
        previous_tail: &str,
        next_heading: &str,
        next_key_points: &[String],
        context: &PromptContext,
    ) -> String {
        let prompt = format!(
            "The previous section of a document ends with:\n\"{}\"\n\n\
             The next section is titled \"{}\"{}.\n\n{}\n\n\
             Write one or two sentences that bridge the two sections. \
             Reply with the bridging sentences only.",
            previous_tail.trim(),
            next_heading,
            if next_key_points.is_empty() {
                String::new()
            } else {
                format!(" and will cover: {}", next_key_points.join(", "))
            },
            context.render(),
        );

        let options = GenerationOptions::with_timeout(self.timeout);
        match self.llm.generate(&[Message::user(prompt)], &options).await {
            Ok(text) => {
                let text = text.trim();
                // 超过两句视为跑偏，回退模板
                if text.is_empty() || text.matches(['.', '!', '?']).count() > 3 {
                    tracing::debug!("transition output unusable, using template");
                    fallback_transition(next_heading)
                } else {
                    text.to_string()
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "transition generation failed, using template");
                fallback_transition(next_heading)
            }
        }
    }
}

/// 确定性模板连接句：引用下一节标题
pub fn fallback_transition(next_heading: &str) -> String {
    format!(
        "With that groundwork in place, the discussion turns to {}.",
        next_heading.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};

    fn generator(client: MockLlmClient) -> TransitionGenerator {
        TransitionGenerator::new(Arc::new(client), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_uses_llm_output() {
        let client =
            MockLlmClient::with_responses(vec!["This idea carries directly into scaling.".into()]);
        let out = generator(client)
            .generate("…ends here.", "Scaling", &[], &PromptContext::empty())
            .await;
        assert_eq!(out, "This idea carries directly into scaling.");
    }

    #[tokio::test]
    async fn test_falls_back_on_provider_failure() {
        let client = MockLlmClient::with_script(vec![Err(LlmError::Timeout(1))]);
        let out = generator(client)
            .generate("…ends here.", "Scaling", &[], &PromptContext::empty())
            .await;
        assert_eq!(out, fallback_transition("Scaling"));
        assert!(out.contains("Scaling"));
    }

    #[tokio::test]
    async fn test_falls_back_on_rambling_output() {
        let long = "One. Two. Three. Four. Five. Six.";
        let client = MockLlmClient::with_responses(vec![long.into()]);
        let out = generator(client)
            .generate("…ends here.", "Costs", &[], &PromptContext::empty())
            .await;
        assert_eq!(out, fallback_transition("Costs"));
    }

    #[test]
    fn test_fallback_is_deterministic() {
        assert_eq!(fallback_transition("X"), fallback_transition("X"));
    }
}
