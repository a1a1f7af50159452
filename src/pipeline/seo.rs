//! seo-analysis 操作：对给定文本运行 SEO 启发式
//!
//! 纯本地计算，不经过供应商调用。

use crate::core::{PipelineError, ProgressReporter};
use crate::pipeline::{parse_params, Pipeline, SeoParams};
use crate::quality::seo_analysis;

impl Pipeline {
    pub(crate) async fn run_seo(
        &self,
        params: serde_json::Value,
        reporter: ProgressReporter,
    ) -> Result<serde_json::Value, PipelineError> {
        let p: SeoParams = parse_params(params)?;

        reporter.report("running seo heuristics").await;
        let heading = p.heading.as_deref().unwrap_or("");
        let report = seo_analysis(&p.text, heading, p.target_keyword.as_deref());

        Ok(serde_json::json!({
            "report": report,
            "target_keyword": p.target_keyword,
        }))
    }
}
