//! 叙事流分析：新章节相对既有内容的连贯性打分
//!
//! analyze 是输入的纯函数：无隐藏状态、无副作用，同样输入永远得到同样分数，
//! 既作为质量门的内部信号，也作为面向用户的连贯性指标。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::narrative::memory::SectionSummary;
use crate::narrative::text::{jaccard, split_sentences, word_set, Tone};

/// 连贯性指标（各分量均在 [0,1]）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowMetrics {
    /// 承接度：新节开头对上一节内容的衔接
    pub flow_score: f64,
    /// 一致性：语气与既有关键概念的契合
    pub consistency_score: f64,
    /// 推进度：新内容与复述的平衡
    pub progression_score: f64,
    /// 针对低分分量的改进建议
    pub recommendations: Vec<String>,
}

/// 章节起始处常见的承接短语
const CONNECTIVES: &[&str] = &[
    "building on", "as discussed", "following", "with this", "having", "next,", "now that",
    "furthermore", "moreover", "in addition", "beyond", "continuing", "this brings",
];

/// 叙事流分析器（无状态）
pub struct FlowAnalyzer;

impl FlowAnalyzer {
    /// 对新章节打分。previous 为空（文档首节）时各分量为 1.0。
    pub fn analyze(previous: &[SectionSummary], current: &str) -> FlowMetrics {
        if previous.is_empty() {
            return FlowMetrics {
                flow_score: 1.0,
                consistency_score: 1.0,
                progression_score: 1.0,
                recommendations: Vec::new(),
            };
        }

        let flow_score = Self::flow_score(previous, current);
        let consistency_score = Self::consistency_score(previous, current);
        let progression_score = Self::progression_score(previous, current);

        let mut recommendations = Vec::new();
        if flow_score < 0.5 {
            recommendations.push(
                "Open the section by referencing the previous section's closing idea or add a bridging sentence.".to_string(),
            );
        }
        if consistency_score < 0.5 {
            recommendations.push(
                "Align the tone and vocabulary with the established sections; reuse the document's key concepts.".to_string(),
            );
        }
        if progression_score < 0.5 {
            recommendations.push(
                "Balance new material against recap: advance the argument instead of restating or switching topic entirely.".to_string(),
            );
        }

        FlowMetrics {
            flow_score,
            consistency_score,
            progression_score,
            recommendations,
        }
    }

    /// 承接度：新节头部与上一节摘要的词汇衔接 + 承接短语加成
    fn flow_score(previous: &[SectionSummary], current: &str) -> f64 {
        let last = &previous[previous.len() - 1];
        let prev_words = word_set(&last.compressed_summary);

        let sentences = split_sentences(current);
        let head: String = sentences.iter().take(2).cloned().collect::<Vec<_>>().join(" ");
        let head_words = word_set(&head);

        let overlap = jaccard(&prev_words, &head_words);
        let head_lower = head.to_lowercase();
        let connective_bonus = if CONNECTIVES.iter().any(|c| head_lower.contains(c)) {
            0.3
        } else {
            0.0
        };

        // 少量词汇重叠即算良好承接，斜率放大后截断
        (overlap * 3.0 + connective_bonus).min(1.0)
    }

    /// 一致性：语气匹配（权重 0.5）+ 与累计关键概念的重叠（权重 0.5）
    fn consistency_score(previous: &[SectionSummary], current: &str) -> f64 {
        let current_tone = Tone::detect(current);
        let tone_match = if previous.iter().any(|s| s.tone == current_tone) {
            1.0
        } else if current_tone == Tone::Neutral
            || previous.iter().any(|s| s.tone == Tone::Neutral)
        {
            0.7
        } else {
            0.3
        };

        let established: HashSet<String> = previous
            .iter()
            .flat_map(|s| s.key_concepts.iter().cloned())
            .collect();
        let current_words = word_set(current);
        let concept_overlap = if established.is_empty() {
            0.5
        } else {
            let hit = established.intersection(&current_words).count() as f64;
            (hit / established.len() as f64 * 2.0).min(1.0)
        };

        tone_match * 0.5 + concept_overlap * 0.5
    }

    /// 推进度：适度引入新词最佳，全盘复述或彻底换题都降分
    fn progression_score(previous: &[SectionSummary], current: &str) -> f64 {
        let seen: HashSet<String> = previous
            .iter()
            .flat_map(|s| {
                word_set(&s.compressed_summary)
                    .into_iter()
                    .chain(s.key_concepts.iter().cloned())
            })
            .collect();
        let current_words = word_set(current);
        if current_words.is_empty() {
            return 0.0;
        }

        let novel = current_words.difference(&seen).count() as f64;
        let novelty = novel / current_words.len() as f64;

        // 理想新颖度在 0.6 附近：1 - 2*|novelty - 0.6|，截到 [0,1]
        (1.0 - (novelty - 0.6).abs() * 2.0).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn previous() -> Vec<SectionSummary> {
        vec![SectionSummary {
            section_id: "s1".into(),
            heading: "Caching".into(),
            compressed_summary:
                "Caching layers reduce repeated computation. Eviction policy determines which \
                 entries survive under memory pressure."
                    .into(),
            key_concepts: vec!["caching".into(), "eviction".into(), "memory".into()],
            tone: Tone::Technical,
        }]
    }

    #[test]
    fn test_first_section_scores_full() {
        let metrics = FlowAnalyzer::analyze(&[], "Anything at all.");
        assert_eq!(metrics.flow_score, 1.0);
        assert_eq!(metrics.consistency_score, 1.0);
        assert_eq!(metrics.progression_score, 1.0);
        assert!(metrics.recommendations.is_empty());
    }

    #[test]
    fn test_pure_function_idempotent() {
        let prev = previous();
        let current = "Building on the eviction policy above, sharding distributes cache entries \
                       across nodes. The runtime keeps the memory budget fixed per shard.";
        let a = FlowAnalyzer::analyze(&prev, current);
        let b = FlowAnalyzer::analyze(&prev, current);
        assert_eq!(a.flow_score, b.flow_score);
        assert_eq!(a.consistency_score, b.consistency_score);
        assert_eq!(a.progression_score, b.progression_score);
        assert_eq!(a.recommendations, b.recommendations);
    }

    #[test]
    fn test_scores_within_bounds() {
        let prev = previous();
        for current in [
            "Building on caching and eviction, memory budgets extend to multi-node setups.",
            "Totally unrelated cooking recipes with butter and flour and sugar.",
            "Caching caching caching eviction eviction memory memory.",
        ] {
            let m = FlowAnalyzer::analyze(&prev, current);
            for score in [m.flow_score, m.consistency_score, m.progression_score] {
                assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
            }
        }
    }

    #[test]
    fn test_connected_section_beats_unrelated() {
        let prev = previous();
        let connected = FlowAnalyzer::analyze(
            &prev,
            "Building on the eviction policy above, cache memory budgets now extend to \
             sharded deployments, and caching stays predictable.",
        );
        let unrelated = FlowAnalyzer::analyze(
            &prev,
            "Medieval poetry often explored courtly love. Trouv\u{e8}res sang in northern France.",
        );
        assert!(connected.flow_score > unrelated.flow_score);
        assert!(connected.consistency_score > unrelated.consistency_score);
    }

    #[test]
    fn test_pure_restatement_scores_low_progression() {
        let prev = previous();
        let restatement = "Caching layers reduce repeated computation. Eviction policy determines \
                           which entries survive under memory pressure.";
        let m = FlowAnalyzer::analyze(&prev, restatement);
        assert!(m.progression_score < 0.5);
        assert!(m
            .recommendations
            .iter()
            .any(|r| r.contains("new material")));
    }
}
