//! 结构化 PromptContext 与唯一的渲染函数
//!
//! 数据模型（有序摘要、聚合、关键概念、语气）与其文本序列化分离：
//! 需要喂给 LLM 的上下文只经 render() 一处变成字符串，杜绝散落的字符串拼接。

use serde::{Deserialize, Serialize};

use crate::narrative::memory::SectionSummary;
use crate::narrative::text::Tone;

/// 下一节生成所需的叙事上下文
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContext {
    /// 窗口内的有序摘要（最老在前）
    pub summaries: Vec<SectionSummary>,
    /// 窗口之前更早内容的聚合摘要（文档超过窗口时才有）
    pub aggregate: Option<String>,
    /// 全文档累计关键概念
    pub key_concepts: Vec<String>,
    /// 主导语气
    pub tone: Tone,
}

impl PromptContext {
    /// 空上下文（文档的第一节）
    pub fn empty() -> Self {
        Self {
            summaries: Vec::new(),
            aggregate: None,
            key_concepts: Vec::new(),
            tone: Tone::Neutral,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty() && self.aggregate.is_none()
    }

    /// 最后一节的摘要（过渡句与打分用）
    pub fn last_summary(&self) -> Option<&SectionSummary> {
        self.summaries.last()
    }

    /// 唯一的文本渲染入口
    pub fn render(&self) -> String {
        if self.is_empty() {
            return "This is the opening section of the document.".to_string();
        }

        let mut out = String::new();
        if let Some(aggregate) = &self.aggregate {
            out.push_str(aggregate);
            out.push_str("\n\n");
        }

        out.push_str("Sections so far:\n");
        for summary in &self.summaries {
            out.push_str(&format!(
                "- \"{}\": {}\n",
                summary.heading, summary.compressed_summary
            ));
        }

        if !self.key_concepts.is_empty() {
            out.push_str(&format!(
                "\nKey concepts already covered: {}.\n",
                self.key_concepts.join(", ")
            ));
        }
        out.push_str(&format!(
            "Maintain a {} tone consistent with the sections above.",
            self.tone.as_str()
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(heading: &str, text: &str) -> SectionSummary {
        SectionSummary {
            section_id: heading.to_lowercase(),
            heading: heading.to_string(),
            compressed_summary: text.to_string(),
            key_concepts: vec![heading.to_lowercase()],
            tone: Tone::Neutral,
        }
    }

    #[test]
    fn test_empty_render() {
        let ctx = PromptContext::empty();
        assert!(ctx.is_empty());
        assert!(ctx.render().contains("opening section"));
    }

    #[test]
    fn test_render_orders_summaries() {
        let ctx = PromptContext {
            summaries: vec![summary("Intro", "sets the stage"), summary("Body", "goes deep")],
            aggregate: None,
            key_concepts: vec!["intro".into(), "body".into()],
            tone: Tone::Technical,
        };
        let rendered = ctx.render();
        let intro_pos = rendered.find("Intro").unwrap();
        let body_pos = rendered.find("Body").unwrap();
        assert!(intro_pos < body_pos);
        assert!(rendered.contains("technical tone"));
        assert!(rendered.contains("intro, body"));
    }

    #[test]
    fn test_render_includes_aggregate_first() {
        let ctx = PromptContext {
            summaries: vec![summary("Recent", "latest part")],
            aggregate: Some("Earlier sections (A, B): condensed".to_string()),
            key_concepts: vec![],
            tone: Tone::Neutral,
        };
        let rendered = ctx.render();
        assert!(rendered.starts_with("Earlier sections"));
    }
}
