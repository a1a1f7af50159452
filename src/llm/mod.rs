//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock / 回退组合）

pub mod fallback;
pub mod mock;
pub mod openai;
pub mod traits;

pub use fallback::FallbackLlmClient;
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{GenerationOptions, LlmClient, LlmError, Message, Role};
