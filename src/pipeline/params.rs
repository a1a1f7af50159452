//! 各任务类型的入参与校验
//!
//! 校验在任务创建前同步执行（fail fast），不合法的请求不消耗任何执行槽位。

use serde::{Deserialize, Serialize};

use crate::core::{PipelineError, TaskKind};

/// research 任务入参
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchParams {
    pub query: String,
    /// 检索深度（候选数），1..=10
    #[serde(default)]
    pub depth: Option<usize>,
}

/// outline 任务入参
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineParams {
    pub topic: String,
    /// 目标章节数，1..=20
    #[serde(default)]
    pub section_count: Option<usize>,
    /// 目标读者（影响语气指示）
    #[serde(default)]
    pub audience: Option<String>,
}

/// section 任务入参
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionParams {
    pub document_id: String,
    pub heading: String,
    /// 缺省时由标题派生
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
    /// 证据检索词，缺省用标题
    #[serde(default)]
    pub evidence_query: Option<String>,
    #[serde(default)]
    pub target_keyword: Option<String>,
}

impl SectionParams {
    /// 章节 ID：显式给定优先，否则从标题派生（小写、空白转连字符）
    pub fn resolved_section_id(&self) -> String {
        match &self.section_id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => self
                .heading
                .trim()
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("-"),
        }
    }
}

/// seo-analysis 任务入参
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeoParams {
    pub text: String,
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub target_keyword: Option<String>,
}

fn require_non_empty(field: &str, value: &str) -> Result<(), PipelineError> {
    if value.trim().is_empty() {
        return Err(PipelineError::Validation(format!(
            "field \"{}\" must be a non-empty string",
            field
        )));
    }
    Ok(())
}

fn parse<T: serde::de::DeserializeOwned>(
    kind: TaskKind,
    params: &serde_json::Value,
) -> Result<T, PipelineError> {
    serde_json::from_value(params.clone()).map_err(|e| {
        PipelineError::Validation(format!("invalid params for {}: {}", kind.as_str(), e))
    })
}

/// 任务类型相关的参数校验；通过后才允许创建任务
pub fn validate(kind: TaskKind, params: &serde_json::Value) -> Result<(), PipelineError> {
    match kind {
        TaskKind::Research => {
            let p: ResearchParams = parse(kind, params)?;
            require_non_empty("query", &p.query)?;
            if let Some(depth) = p.depth {
                if depth == 0 || depth > 10 {
                    return Err(PipelineError::Validation(
                        "depth must be between 1 and 10".into(),
                    ));
                }
            }
        }
        TaskKind::Outline => {
            let p: OutlineParams = parse(kind, params)?;
            require_non_empty("topic", &p.topic)?;
            if let Some(n) = p.section_count {
                if n == 0 || n > 20 {
                    return Err(PipelineError::Validation(
                        "section_count must be between 1 and 20".into(),
                    ));
                }
            }
        }
        TaskKind::Section => {
            let p: SectionParams = parse(kind, params)?;
            require_non_empty("document_id", &p.document_id)?;
            require_non_empty("heading", &p.heading)?;
        }
        TaskKind::SeoAnalysis => {
            let p: SeoParams = parse(kind, params)?;
            require_non_empty("text", &p.text)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_research_validation() {
        assert!(validate(TaskKind::Research, &serde_json::json!({"query": "rust"})).is_ok());
        assert!(validate(TaskKind::Research, &serde_json::json!({"query": "  "})).is_err());
        assert!(validate(TaskKind::Research, &serde_json::json!({})).is_err());
        assert!(
            validate(TaskKind::Research, &serde_json::json!({"query": "x", "depth": 99})).is_err()
        );
    }

    #[test]
    fn test_section_validation() {
        let good = serde_json::json!({"document_id": "doc1", "heading": "Intro"});
        assert!(validate(TaskKind::Section, &good).is_ok());
        let missing = serde_json::json!({"heading": "Intro"});
        assert!(validate(TaskKind::Section, &missing).is_err());
    }

    #[test]
    fn test_section_id_derivation() {
        let p = SectionParams {
            document_id: "doc1".into(),
            heading: "Why Connection Pools Matter".into(),
            section_id: None,
            key_points: vec![],
            evidence_query: None,
            target_keyword: None,
        };
        assert_eq!(p.resolved_section_id(), "why-connection-pools-matter");

        let explicit = SectionParams {
            section_id: Some("s7".into()),
            ..p
        };
        assert_eq!(explicit.resolved_section_id(), "s7");
    }

    #[test]
    fn test_outline_and_seo_validation() {
        assert!(validate(TaskKind::Outline, &serde_json::json!({"topic": "caching"})).is_ok());
        assert!(validate(
            TaskKind::Outline,
            &serde_json::json!({"topic": "caching", "section_count": 0})
        )
        .is_err());
        assert!(validate(TaskKind::SeoAnalysis, &serde_json::json!({"text": "body"})).is_ok());
        assert!(validate(TaskKind::SeoAnalysis, &serde_json::json!({"text": ""})).is_err());
    }
}
