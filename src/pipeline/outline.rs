//! outline 操作：从主题生成文档大纲

use tokio_util::sync::CancellationToken;

use crate::core::{checkpoint, PipelineError, ProgressReporter};
use crate::llm::Message;
use crate::pipeline::{map_llm_error, parse_params, OutlineParams, Pipeline};

impl Pipeline {
    pub(crate) async fn run_outline(
        &self,
        params: serde_json::Value,
        reporter: ProgressReporter,
        token: CancellationToken,
    ) -> Result<serde_json::Value, PipelineError> {
        let p: OutlineParams = parse_params(params)?;

        reporter.report("drafting outline").await;
        checkpoint(&token)?;

        let section_count = p.section_count.unwrap_or(5);
        let audience_note = p
            .audience
            .as_deref()
            .map(|a| format!(" The target audience is: {}.", a))
            .unwrap_or_default();
        let prompt = format!(
            "Draft an outline for a long-form article on \"{}\" with {} sections.{}\n\
             Format: one line per section, as \"## Heading\" followed on the next lines \
             by 2-3 bullet key points (\"- point\").",
            p.topic, section_count, audience_note
        );

        let outline = self
            .llm()
            .generate(&[Message::user(prompt)], &self.generation_options())
            .await
            .map_err(map_llm_error)?;
        checkpoint(&token)?;

        let headings = parse_outline_headings(&outline);
        reporter
            .report(format!("outline ready with {} sections", headings.len()))
            .await;

        Ok(serde_json::json!({
            "topic": p.topic,
            "outline": outline,
            "headings": headings,
        }))
    }
}

/// 从大纲文本提取标题（`## ` 行，退而求其次取编号行）
fn parse_outline_headings(outline: &str) -> Vec<String> {
    let headings: Vec<String> = outline
        .lines()
        .filter_map(|l| l.trim().strip_prefix("## "))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect();
    if !headings.is_empty() {
        return headings;
    }

    outline
        .lines()
        .filter_map(|l| {
            let l = l.trim();
            let rest = l.split_once(". ")?;
            rest.0.parse::<u32>().ok()?;
            Some(rest.1.trim().to_string())
        })
        .filter(|h| !h.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_markdown_headings() {
        let outline = "## Intro\n- a\n- b\n## Deep Dive\n- c\n## Wrap-up\n";
        assert_eq!(
            parse_outline_headings(outline),
            vec!["Intro", "Deep Dive", "Wrap-up"]
        );
    }

    #[test]
    fn test_parse_numbered_fallback() {
        let outline = "1. Getting started\n2. Going further\nnot a heading";
        assert_eq!(
            parse_outline_headings(outline),
            vec!["Getting started", "Going further"]
        );
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_outline_headings("free text only").is_empty());
    }
}
