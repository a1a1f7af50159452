//! 叙事层：上下文记忆、Prompt 上下文、过渡句与连贯性打分

pub mod flow;
pub mod memory;
pub mod prompt;
pub mod text;
pub mod transition;

pub use flow::{FlowAnalyzer, FlowMetrics};
pub use memory::{DocumentMemory, NarrativeSessions, SectionSummary};
pub use prompt::PromptContext;
pub use text::{TokenEstimator, Tone};
pub use transition::{fallback_transition, TransitionGenerator};
