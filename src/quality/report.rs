//! 质量报告数据模型
//!
//! 报告一旦挂到任务结果上即不可变；分数全部落在 [0,1]。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 审计维度（固定阶段顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// 结构（硬门：失败则不再继续评分）
    Structure,
    /// 事实 / 引用覆盖
    Factual,
    /// 叙事流（委托 FlowAnalyzer）
    Flow,
    /// 语气一致性
    Tone,
    /// SEO 启发式（软门：只标记，不阻断）
    Seo,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Structure => "structure",
            Dimension::Factual => "factual",
            Dimension::Flow => "flow",
            Dimension::Tone => "tone",
            Dimension::Seo => "seo",
        }
    }
}

/// 单条违规与修复提示
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub dimension: Dimension,
    pub message: String,
    pub remediation: String,
}

/// 生成单元的状态机
///
/// REQUESTED → GENERATING → AUDITING → {ACCEPTED | REGENERATING(≤1) | ACCEPTED_WITH_WARNINGS}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPhase {
    Requested,
    Generating,
    Auditing,
    Accepted,
    Regenerating,
    AcceptedWithWarnings,
}

impl GenerationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationPhase::Accepted | GenerationPhase::AcceptedWithWarnings
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationPhase::Requested => "requested",
            GenerationPhase::Generating => "generating",
            GenerationPhase::Auditing => "auditing",
            GenerationPhase::Accepted => "accepted",
            GenerationPhase::Regenerating => "regenerating",
            GenerationPhase::AcceptedWithWarnings => "accepted_with_warnings",
        }
    }
}

/// 审计报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    /// 维度 → [0,1] 分数；结构硬门失败时其余维度缺席
    pub dimension_scores: BTreeMap<Dimension, f64>,
    /// 加权总分 [0,1]
    pub overall_score: f64,
    /// 是否通过验收阈值
    pub passed: bool,
    pub violations: Vec<Violation>,
}

impl QualityReport {
    pub fn score(&self, dimension: Dimension) -> Option<f64> {
        self.dimension_scores.get(&dimension).copied()
    }

    /// 把违规压成可入 prompt 的改进指示（重生成时使用）
    pub fn remediation_digest(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("- ({}) {}", v.dimension.as_str(), v.remediation))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
