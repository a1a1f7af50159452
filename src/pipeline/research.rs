//! research 操作：证据检索 + 结论综合，结果按指纹缓存
//!
//! 指纹精确命中时直接返回缓存结论，避免重复的昂贵调用；
//! 检索失败时用简化查询重试一次，再失败则任务失败（不静默返回空结论）。

use tokio_util::sync::CancellationToken;

use crate::cache::fingerprint;
use crate::core::{checkpoint, sanitize_provider_error, PipelineError, ProgressReporter, TaskKind};
use crate::evidence::Evidence;
use crate::llm::Message;
use crate::pipeline::{map_llm_error, parse_params, Pipeline, ResearchParams};

impl Pipeline {
    pub(crate) async fn run_research(
        &self,
        params: serde_json::Value,
        reporter: ProgressReporter,
        token: CancellationToken,
    ) -> Result<serde_json::Value, PipelineError> {
        let fp = fingerprint(TaskKind::Research.as_str(), &params);
        let p: ResearchParams = parse_params(params)?;

        if let Some(hit) = self.cache().get(&fp).await {
            reporter.report("result served from cache").await;
            return Ok(hit);
        }

        checkpoint(&token)?;
        reporter.report("searching evidence").await;

        let mut sources = match self.evidence().search(&p.query).await {
            Ok(results) => results,
            Err(first_err) => {
                // 唯一一次回退：简化查询（前三个词）
                let simplified: String = p
                    .query
                    .split_whitespace()
                    .take(3)
                    .collect::<Vec<_>>()
                    .join(" ");
                reporter.report("search failed, retrying simplified query").await;
                checkpoint(&token)?;
                self.evidence().search(&simplified).await.map_err(|second_err| {
                    PipelineError::ProviderFailure(format!(
                        "{}; fallback: {}",
                        sanitize_provider_error(&first_err),
                        sanitize_provider_error(&second_err),
                    ))
                })?
            }
        };
        checkpoint(&token)?;

        if let Some(depth) = p.depth {
            sources.truncate(depth);
        }
        reporter
            .report(format!("found {} evidence sources", sources.len()))
            .await;

        reporter.report("synthesizing findings").await;
        checkpoint(&token)?;
        let prompt = build_synthesis_prompt(&p.query, &sources);
        let findings = self
            .llm()
            .generate(&[Message::user(prompt)], &self.generation_options())
            .await
            .map_err(map_llm_error)?;
        checkpoint(&token)?;

        let result = serde_json::json!({
            "query": p.query,
            "findings": findings,
            "sources": sources,
        });

        self.cache().put(&fp, result.clone(), self.cache_ttl()).await;
        Ok(result)
    }
}

fn build_synthesis_prompt(query: &str, sources: &[Evidence]) -> String {
    let mut prompt = format!(
        "Research question: {}\n\nEvidence collected:\n",
        query
    );
    if sources.is_empty() {
        prompt.push_str("(no sources available)\n");
    }
    for (i, source) in sources.iter().enumerate() {
        prompt.push_str(&format!(
            "[{}] {} ({})\n{}\n\n",
            i + 1,
            source.title,
            source.url,
            source.snippet
        ));
    }
    prompt.push_str(
        "Summarize the key findings that answer the research question. \
         Attribute each claim to its numbered source like [1]. \
         If the evidence is insufficient on a point, say so explicitly.",
    );
    prompt
}
