//! 质量门：固定顺序的多维校验
//!
//! 阶段顺序：结构（硬门，失败即短路）→ 事实/引用 → 叙事流 → 语气 → SEO（软门）。
//! 各维度得分加权聚合成总分；验收与重生成策略由流水线执行（本模块只出报告）。

use std::collections::BTreeMap;

use regex::Regex;

use crate::config::QualitySection;
use crate::evidence::Evidence;
use crate::narrative::memory::SectionSummary;
use crate::narrative::text::{content_words, word_set, Tone};
use crate::narrative::FlowAnalyzer;
use crate::quality::report::{Dimension, QualityReport, Violation};

/// 单阶段产出
struct StageOutcome {
    pass: bool,
    score: f64,
    violations: Vec<Violation>,
}

/// 审计输入：被评内容与其叙事环境
pub struct AuditInput<'a> {
    pub text: &'a str,
    pub heading: &'a str,
    /// 生成时喂给模型的证据（事实覆盖阶段用）
    pub evidence: &'a [Evidence],
    /// 既有章节摘要（叙事流与语气阶段用）
    pub previous: &'a [SectionSummary],
    /// SEO 目标关键词（可缺省）
    pub target_keyword: Option<&'a str>,
}

/// 质量门
pub struct QualityGate {
    cfg: QualitySection,
}

impl QualityGate {
    pub fn new(cfg: QualitySection) -> Self {
        Self { cfg }
    }

    pub fn acceptance_threshold(&self) -> f64 {
        self.cfg.acceptance_threshold
    }

    /// 运行全部阶段并聚合成报告
    pub fn audit(&self, input: &AuditInput<'_>) -> QualityReport {
        let mut dimension_scores = BTreeMap::new();
        let mut violations = Vec::new();

        // 阶段 1：结构，硬门。畸形输出无法继续有意义地评分
        let structure = check_structure(input.text);
        dimension_scores.insert(Dimension::Structure, structure.score);
        violations.extend(structure.violations);
        if !structure.pass {
            return QualityReport {
                dimension_scores,
                overall_score: 0.0,
                passed: false,
                violations,
            };
        }

        // 阶段 2：事实 / 引用覆盖
        let factual = check_factual(input.text, input.evidence);
        dimension_scores.insert(Dimension::Factual, factual.score);
        violations.extend(factual.violations);

        // 阶段 3：叙事流（委托 FlowAnalyzer）
        let flow = check_flow(input.previous, input.text);
        dimension_scores.insert(Dimension::Flow, flow.score);
        violations.extend(flow.violations);

        // 阶段 4：语气一致性
        let tone = check_tone(input.previous, input.text);
        dimension_scores.insert(Dimension::Tone, tone.score);
        violations.extend(tone.violations);

        // 阶段 5：SEO 软门，低分只标记，从不阻断验收
        let seo = check_seo(input.text, input.heading, input.target_keyword);
        dimension_scores.insert(Dimension::Seo, seo.score);
        violations.extend(seo.violations);

        let overall_score = self.weighted_overall(&dimension_scores);
        let passed = overall_score >= self.cfg.acceptance_threshold;

        QualityReport {
            dimension_scores,
            overall_score,
            passed,
            violations,
        }
    }

    fn weighted_overall(&self, scores: &BTreeMap<Dimension, f64>) -> f64 {
        let weight = |d: Dimension| match d {
            Dimension::Structure => self.cfg.weight_structure,
            Dimension::Factual => self.cfg.weight_factual,
            Dimension::Flow => self.cfg.weight_flow,
            Dimension::Tone => self.cfg.weight_tone,
            Dimension::Seo => self.cfg.weight_seo,
        };
        let mut total = 0.0;
        let mut weight_sum = 0.0;
        for (d, s) in scores {
            total += s * weight(*d);
            weight_sum += weight(*d);
        }
        if weight_sum == 0.0 {
            0.0
        } else {
            (total / weight_sum).clamp(0.0, 1.0)
        }
    }
}

/// 结构校验：非空、成段、标题行合法、围栏闭合
fn check_structure(text: &str) -> StageOutcome {
    let mut violations = Vec::new();
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return StageOutcome {
            pass: false,
            score: 0.0,
            violations: vec![Violation {
                dimension: Dimension::Structure,
                message: "content is empty".into(),
                remediation: "produce the section body".into(),
            }],
        };
    }

    let word_count = trimmed.split_whitespace().count();
    if word_count < 30 {
        violations.push(Violation {
            dimension: Dimension::Structure,
            message: format!("only {} words", word_count),
            remediation: "write a full section, not a fragment".into(),
        });
    }

    let paragraphs = trimmed
        .split("\n\n")
        .filter(|p| !p.trim().is_empty() && !p.trim_start().starts_with('#'))
        .count();
    if paragraphs == 0 {
        violations.push(Violation {
            dimension: Dimension::Structure,
            message: "no body paragraphs".into(),
            remediation: "separate prose into paragraphs with blank lines".into(),
        });
    }

    // 标题行必须是 `#{1,6} ` + 文本
    let heading_re = Regex::new(r"^#{1,6}\s+\S").unwrap();
    let bad_heading = trimmed
        .lines()
        .filter(|l| l.trim_start().starts_with('#'))
        .any(|l| !heading_re.is_match(l.trim_start()));
    if bad_heading {
        violations.push(Violation {
            dimension: Dimension::Structure,
            message: "malformed heading line".into(),
            remediation: "headings need a space and text after the # marks".into(),
        });
    }

    if trimmed.matches("```").count() % 2 != 0 {
        violations.push(Violation {
            dimension: Dimension::Structure,
            message: "unbalanced code fence".into(),
            remediation: "close every ``` block".into(),
        });
    }

    // 三类硬伤任一即失败：空段、畸形标题、未闭合围栏；字数不足只扣分
    let hard_failure = paragraphs == 0 || bad_heading || trimmed.matches("```").count() % 2 != 0;
    let score = if hard_failure {
        0.0
    } else if violations.is_empty() {
        1.0
    } else {
        0.6
    };

    StageOutcome {
        pass: !hard_failure,
        score,
        violations,
    }
}

/// 事实 / 引用覆盖：证据片段的关键词有多少出现在正文中
fn check_factual(text: &str, evidence: &[Evidence]) -> StageOutcome {
    if evidence.is_empty() {
        // 无证据可核，中性放行
        return StageOutcome {
            pass: true,
            score: 0.75,
            violations: vec![],
        };
    }

    let text_words = word_set(text);
    let mut covered = 0usize;
    for item in evidence {
        let source_words = word_set(&format!("{} {}", item.title, item.snippet));
        let hits = source_words.intersection(&text_words).count();
        if hits >= 2 || (!source_words.is_empty() && hits == source_words.len()) {
            covered += 1;
        }
    }
    let score = covered as f64 / evidence.len() as f64;

    let mut violations = Vec::new();
    if score < 0.5 {
        violations.push(Violation {
            dimension: Dimension::Factual,
            message: format!("only {}/{} evidence sources reflected", covered, evidence.len()),
            remediation: "ground the claims in the supplied evidence".into(),
        });
    }

    StageOutcome {
        pass: score >= 0.5,
        score,
        violations,
    }
}

/// 叙事流：FlowAnalyzer 三分量平均
fn check_flow(previous: &[SectionSummary], text: &str) -> StageOutcome {
    let metrics = FlowAnalyzer::analyze(previous, text);
    let score =
        (metrics.flow_score + metrics.consistency_score + metrics.progression_score) / 3.0;
    let violations = metrics
        .recommendations
        .iter()
        .map(|r| Violation {
            dimension: Dimension::Flow,
            message: "continuity below expectation".into(),
            remediation: r.clone(),
        })
        .collect();
    StageOutcome {
        pass: score >= 0.5,
        score,
        violations,
    }
}

/// 语气一致性：与既有章节语气比对
fn check_tone(previous: &[SectionSummary], text: &str) -> StageOutcome {
    if previous.is_empty() {
        return StageOutcome {
            pass: true,
            score: 1.0,
            violations: vec![],
        };
    }

    let current = Tone::detect(text);
    let score = if previous.iter().any(|s| s.tone == current) {
        1.0
    } else if current == Tone::Neutral || previous.iter().any(|s| s.tone == Tone::Neutral) {
        0.7
    } else {
        0.3
    };

    let mut violations = Vec::new();
    if score < 0.5 {
        let established = previous[previous.len() - 1].tone;
        violations.push(Violation {
            dimension: Dimension::Tone,
            message: format!(
                "tone shifted to {} against established {}",
                current.as_str(),
                established.as_str()
            ),
            remediation: format!("rewrite in the document's {} register", established.as_str()),
        });
    }

    StageOutcome {
        pass: score >= 0.5,
        score,
        violations,
    }
}

/// SEO 启发式：关键词密度、标题覆盖、篇幅。软门，永不阻断
pub fn check_seo(text: &str, heading: &str, target_keyword: Option<&str>) -> StageOutcome {
    let mut violations = Vec::new();
    let mut score: f64 = 1.0;

    let words = content_words(text);
    let word_count = text.split_whitespace().count();

    if word_count < 120 {
        score -= 0.3;
        violations.push(Violation {
            dimension: Dimension::Seo,
            message: format!("thin content: {} words", word_count),
            remediation: "expand the section toward at least 120 words".into(),
        });
    }

    if let Some(keyword) = target_keyword {
        let keyword = keyword.to_lowercase();
        let occurrences = words.iter().filter(|w| **w == keyword).count();
        let density = if words.is_empty() {
            0.0
        } else {
            occurrences as f64 / words.len() as f64
        };

        if occurrences == 0 {
            score -= 0.4;
            violations.push(Violation {
                dimension: Dimension::Seo,
                message: format!("target keyword \"{}\" absent", keyword),
                remediation: "work the target keyword into the body naturally".into(),
            });
        } else if density > 0.05 {
            score -= 0.2;
            violations.push(Violation {
                dimension: Dimension::Seo,
                message: format!("keyword density {:.1}% reads as stuffing", density * 100.0),
                remediation: "thin out keyword repetitions".into(),
            });
        }

        if !heading.to_lowercase().contains(&keyword) {
            score -= 0.1;
            violations.push(Violation {
                dimension: Dimension::Seo,
                message: "heading does not mention the target keyword".into(),
                remediation: "consider including the keyword in the heading".into(),
            });
        }
    }

    StageOutcome {
        pass: true,
        score: score.clamp(0.0, 1.0),
        violations,
    }
}

/// 独立 SEO 分析（seo-analysis 任务类型复用软门逻辑）
pub fn seo_analysis(text: &str, heading: &str, target_keyword: Option<&str>) -> QualityReport {
    let outcome = check_seo(text, heading, target_keyword);
    let mut dimension_scores = BTreeMap::new();
    dimension_scores.insert(Dimension::Seo, outcome.score);
    QualityReport {
        dimension_scores,
        overall_score: outcome.score,
        passed: true,
        violations: outcome.violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> QualityGate {
        QualityGate::new(QualitySection::default())
    }

    fn good_section() -> String {
        "## Connection Pools\n\n\
         Connection pools amortize the cost of establishing database sessions across \
         requests. A pool keeps warm connections ready, so a burst of traffic does not \
         pay the handshake price on every call.\n\n\
         Moreover, the pool bounds resource usage: the database sees at most the \
         configured maximum, and excess requests queue instead of overwhelming it. \
         Sizing the pool means balancing latency against memory held per connection.\n\n\
         In short, pooling turns an unbounded per-request cost into a budgeted shared \
         resource with predictable behavior under load."
            .to_string()
    }

    #[test]
    fn test_good_section_passes_all_dimensions() {
        let text = good_section();
        let input = AuditInput {
            text: &text,
            heading: "Connection Pools",
            evidence: &[],
            previous: &[],
            target_keyword: None,
        };
        let report = gate().audit(&input);
        assert!(report.passed, "overall {}", report.overall_score);
        assert_eq!(report.dimension_scores.len(), 5);
        for (d, s) in &report.dimension_scores {
            assert!((0.0..=1.0).contains(s), "{:?} score {} out of range", d, s);
        }
    }

    #[test]
    fn test_structure_hard_gate_short_circuits() {
        let input = AuditInput {
            text: "####BadHeading\nsingle line no paragraphs",
            heading: "X",
            evidence: &[],
            previous: &[],
            target_keyword: None,
        };
        let report = gate().audit(&input);
        assert!(!report.passed);
        assert_eq!(report.overall_score, 0.0);
        // 硬门短路：只有 structure 被评了分
        assert_eq!(report.dimension_scores.len(), 1);
        assert!(report.dimension_scores.contains_key(&Dimension::Structure));
    }

    #[test]
    fn test_empty_content_fails_structure() {
        let input = AuditInput {
            text: "   ",
            heading: "X",
            evidence: &[],
            previous: &[],
            target_keyword: None,
        };
        let report = gate().audit(&input);
        assert!(!report.passed);
        assert_eq!(report.score(Dimension::Structure), Some(0.0));
    }

    #[test]
    fn test_unbalanced_code_fence_fails() {
        let text = "Some prose here with enough words to not be thin at all, spread over \
                    a real paragraph of content.\n\n```rust\nlet x = 1;\n";
        let input = AuditInput {
            text,
            heading: "X",
            evidence: &[],
            previous: &[],
            target_keyword: None,
        };
        let report = gate().audit(&input);
        assert!(!report.passed);
    }

    #[test]
    fn test_factual_coverage_scores_by_evidence() {
        let text = good_section();
        let evidence = vec![
            Evidence {
                title: "Connection pooling guide".into(),
                url: "https://docs.rs/pool".into(),
                snippet: "pools amortize handshake cost for database sessions".into(),
                relevance: 1.0,
            },
            Evidence {
                title: "Quantum chromodynamics".into(),
                url: "https://arxiv.org/qcd".into(),
                snippet: "gluon lattice simulations in particle physics".into(),
                relevance: 0.6,
            },
        ];
        let input = AuditInput {
            text: &text,
            heading: "Connection Pools",
            evidence: &evidence,
            previous: &[],
            target_keyword: None,
        };
        let report = gate().audit(&input);
        let factual = report.score(Dimension::Factual).unwrap();
        // 两条证据只有一条被反映
        assert!((factual - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_seo_soft_gate_never_blocks() {
        let text = good_section();
        let input = AuditInput {
            text: &text,
            heading: "Connection Pools",
            evidence: &[],
            previous: &[],
            target_keyword: Some("kubernetes"),
        };
        let report = gate().audit(&input);
        // 关键词缺席压低 seo 分并产生违规，但不影响通过
        assert!(report.score(Dimension::Seo).unwrap() < 0.7);
        assert!(report
            .violations
            .iter()
            .any(|v| v.dimension == Dimension::Seo));
        assert!(report.passed);
    }

    #[test]
    fn test_seo_analysis_standalone() {
        let report = seo_analysis(&good_section(), "Connection Pools", Some("connection"));
        assert!(report.passed);
        assert!(report.score(Dimension::Seo).is_some());
    }

    #[test]
    fn test_audit_is_deterministic() {
        let text = good_section();
        let input = AuditInput {
            text: &text,
            heading: "Connection Pools",
            evidence: &[],
            previous: &[],
            target_keyword: Some("connection"),
        };
        let a = gate().audit(&input);
        let b = gate().audit(&input);
        assert_eq!(a.overall_score, b.overall_score);
        assert_eq!(a.dimension_scores, b.dimension_scores);
    }
}
