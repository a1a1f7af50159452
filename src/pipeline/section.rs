//! section 操作：叙事连贯的章节生成
//!
//! 同文档全程持有该文档的会话锁，保证章节严格按序生成与提交；
//! 生成 → 审计 →（至多一次）重生成 → 提交到上下文记忆并落连贯性指标。
//! 状态机：REQUESTED → GENERATING → AUDITING → {ACCEPTED | REGENERATING(≤1) | ACCEPTED_WITH_WARNINGS}。

use tokio_util::sync::CancellationToken;

use crate::core::{checkpoint, PipelineError, ProgressReporter};
use crate::evidence::Evidence;
use crate::llm::Message;
use crate::narrative::{FlowAnalyzer, PromptContext};
use crate::pipeline::{map_llm_error, parse_params, Pipeline, SectionParams};
use crate::quality::{AuditInput, GenerationPhase, QualityReport};

impl Pipeline {
    pub(crate) async fn run_section(
        &self,
        params: serde_json::Value,
        reporter: ProgressReporter,
        token: CancellationToken,
    ) -> Result<serde_json::Value, PipelineError> {
        let p: SectionParams = parse_params(params)?;
        let section_id = p.resolved_section_id();
        reporter
            .report(format!("phase: {}", GenerationPhase::Requested.as_str()))
            .await;

        // 同一文档的章节生成全程串行：跨文档互不阻塞
        let session = self.sessions().get_or_create(&p.document_id).await;
        let mut memory = session.lock().await;

        let context = memory.get_context_for_next();

        // 证据对章节是补充性的：检索失败降级为无证据继续，不让任务失败
        let evidence_query = p.evidence_query.as_deref().unwrap_or(&p.heading);
        checkpoint(&token)?;
        let evidence = match self.evidence().search(evidence_query).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "evidence unavailable for section, continuing without");
                reporter.report("evidence unavailable, continuing without").await;
                Vec::new()
            }
        };
        checkpoint(&token)?;

        // 非首节先准备过渡句（内部自带模板回退，从不失败）
        let transition = if let Some(last) = context.last_summary() {
            let text = self
                .transitions()
                .generate(&last.compressed_summary, &p.heading, &p.key_points, &context)
                .await;
            Some(text)
        } else {
            None
        };

        reporter
            .report(format!("phase: {}", GenerationPhase::Generating.as_str()))
            .await;
        checkpoint(&token)?;
        let messages = build_section_messages(&p, &context, &evidence, None);
        let mut body = self
            .llm()
            .generate(&messages, &self.generation_options())
            .await
            .map_err(map_llm_error)?;
        checkpoint(&token)?;

        reporter
            .report(format!("phase: {}", GenerationPhase::Auditing.as_str()))
            .await;
        let mut report = self.audit_section(&p, &memory.sections().to_vec(), &evidence, &body);

        let phase = if report.passed {
            GenerationPhase::Accepted
        } else {
            // 恰好一次的自动重生成：违规与修复提示折叠进重试 prompt
            reporter
                .report(format!("phase: {}", GenerationPhase::Regenerating.as_str()))
                .await;
            checkpoint(&token)?;
            let retry_messages =
                build_section_messages(&p, &context, &evidence, Some(&report));
            body = self
                .llm()
                .generate(&retry_messages, &self.generation_options())
                .await
                .map_err(map_llm_error)?;
            checkpoint(&token)?;

            report = self.audit_section(&p, &memory.sections().to_vec(), &evidence, &body);
            if report.passed {
                GenerationPhase::Accepted
            } else if report.score(crate::quality::Dimension::Structure) == Some(0.0) {
                // 重生成后仍然结构性失败：不可恢复
                return Err(PipelineError::QualityGate(
                    "regenerated content is still structurally malformed".into(),
                ));
            } else {
                // 不再循环：带警告接受
                GenerationPhase::AcceptedWithWarnings
            }
        };
        reporter.report(format!("phase: {}", phase.as_str())).await;

        // 提交前检查点：取消后不提交任何部分结果
        checkpoint(&token)?;

        // 指标相对提交前的既有章节计算，然后才把本节摘要入表
        let flow_metrics = FlowAnalyzer::analyze(memory.sections(), &body);
        memory.add_section(&section_id, &p.heading, &body);
        self.metrics()
            .set(&p.document_id, &section_id, flow_metrics.clone())
            .await;

        let text = match &transition {
            Some(t) => format!("{}\n\n{}", t, body),
            None => body.clone(),
        };

        Ok(serde_json::json!({
            "document_id": p.document_id,
            "section_id": section_id,
            "heading": p.heading,
            "text": text,
            "transition": transition,
            "quality_report": report,
            "flow_metrics": flow_metrics,
            "acceptance": phase.as_str(),
        }))
    }

    fn audit_section(
        &self,
        p: &SectionParams,
        previous: &[crate::narrative::SectionSummary],
        evidence: &[Evidence],
        body: &str,
    ) -> QualityReport {
        self.gate().audit(&AuditInput {
            text: body,
            heading: &p.heading,
            evidence,
            previous,
            target_keyword: p.target_keyword.as_deref(),
        })
    }
}

fn build_section_messages(
    p: &SectionParams,
    context: &PromptContext,
    evidence: &[Evidence],
    previous_attempt: Option<&QualityReport>,
) -> Vec<Message> {
    let system = "You write sections of long-form articles. Follow the narrative context, \
                  keep the established tone, ground claims in the supplied evidence, and \
                  return Markdown with a `## ` heading and well-formed paragraphs.";

    let mut user = format!("{}\n\n", context.render());

    if !evidence.is_empty() {
        user.push_str("Evidence to draw on:\n");
        for item in evidence {
            user.push_str(&format!("- {} ({}): {}\n", item.title, item.url, item.snippet));
        }
        user.push('\n');
    }

    user.push_str(&format!("Write the section titled \"{}\".", p.heading));
    if !p.key_points.is_empty() {
        user.push_str(&format!(" Cover these points: {}.", p.key_points.join("; ")));
    }
    if let Some(keyword) = &p.target_keyword {
        user.push_str(&format!(" Use the phrase \"{}\" where natural.", keyword));
    }

    if let Some(report) = previous_attempt {
        user.push_str(&format!(
            "\n\nA previous attempt scored {:.2} and was rejected. Fix these issues:\n{}",
            report.overall_score,
            report.remediation_digest()
        ));
    }

    vec![Message::system(system), Message::user(user)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SectionParams {
        SectionParams {
            document_id: "doc1".into(),
            heading: "Scaling Out".into(),
            section_id: None,
            key_points: vec!["sharding".into(), "replication".into()],
            evidence_query: None,
            target_keyword: Some("scaling".into()),
        }
    }

    #[test]
    fn test_messages_carry_context_and_points() {
        let messages = build_section_messages(&params(), &PromptContext::empty(), &[], None);
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("Scaling Out"));
        assert!(messages[1].content.contains("sharding; replication"));
        assert!(messages[1].content.contains("opening section"));
    }

    #[test]
    fn test_retry_messages_include_remediation() {
        let report = QualityReport {
            dimension_scores: Default::default(),
            overall_score: 0.31,
            passed: false,
            violations: vec![crate::quality::Violation {
                dimension: crate::quality::Dimension::Flow,
                message: "weak".into(),
                remediation: "bridge from the previous section".into(),
            }],
        };
        let messages =
            build_section_messages(&params(), &PromptContext::empty(), &[], Some(&report));
        assert!(messages[1].content.contains("0.31"));
        assert!(messages[1].content.contains("bridge from the previous section"));
    }

    #[test]
    fn test_evidence_rendered_into_prompt() {
        let evidence = vec![Evidence {
            title: "Sharding basics".into(),
            url: "https://docs.rs/shard".into(),
            snippet: "split data across nodes".into(),
            relevance: 1.0,
        }];
        let messages = build_section_messages(&params(), &PromptContext::empty(), &evidence, None);
        assert!(messages[1].content.contains("Sharding basics"));
        assert!(messages[1].content.contains("split data across nodes"));
    }
}
