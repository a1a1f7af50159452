//! 上下文记忆（连贯性引擎）：每文档的滚动章节摘要
//!
//! 只追加、严格按生成顺序；摘要 i 只反映第 1..i 节，已存摘要从不改写。
//! 文档超过窗口后，上下文收敛为「最近 K 条摘要 + 一条更早内容的聚合摘要」，
//! 渲染成本随文档增长保持有界；K 与摘要预算来自配置。
//! 同一文档的章节生成经由会话表的 per-doc Mutex 全程串行，跨文档完全独立。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::config::NarrativeSection;
use crate::narrative::prompt::PromptContext;
use crate::narrative::text::{
    keywords, split_sentences, truncate_to_tokens, word_set, TokenEstimator, Tone,
};

/// 单节摘要（不可变：入表后从不修改）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSummary {
    pub section_id: String,
    pub heading: String,
    /// 有界 token 预算内的压缩摘要
    pub compressed_summary: String,
    /// 关键概念（有序去重）
    pub key_concepts: Vec<String>,
    pub tone: Tone,
}

/// 单文档的叙事状态
pub struct DocumentMemory {
    document_id: String,
    sections: Vec<SectionSummary>,
    cfg: NarrativeSection,
    last_touched: Instant,
}

impl DocumentMemory {
    pub fn new(document_id: impl Into<String>, cfg: NarrativeSection) -> Self {
        Self {
            document_id: document_id.into(),
            sections: Vec::new(),
            cfg,
            last_touched: Instant::now(),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn sections(&self) -> &[SectionSummary] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// 章节定稿并通过审计后调用：压缩成摘要并追加。
    /// 只追加；已存在的摘要不会被触碰。
    pub fn add_section(&mut self, section_id: &str, heading: &str, full_text: &str) {
        let compressed_summary = extractive_summary(full_text, self.cfg.summary_token_budget);
        let key_concepts = keywords(full_text, self.cfg.max_key_concepts);
        let tone = Tone::detect(full_text);

        self.sections.push(SectionSummary {
            section_id: section_id.to_string(),
            heading: heading.to_string(),
            compressed_summary,
            key_concepts,
            tone,
        });
        self.last_touched = Instant::now();
        tracing::debug!(
            document_id = %self.document_id,
            section_id = %section_id,
            total_sections = self.sections.len(),
            "section committed to context memory"
        );
    }

    /// 下一节的生成上下文。
    /// 文档未超过窗口时返回全量有序历史；超过后返回最近 K 条 + 更早内容的单条聚合摘要。
    pub fn get_context_for_next(&mut self) -> PromptContext {
        self.last_touched = Instant::now();
        let k = self.cfg.window_size.max(1);

        let (aggregate, window) = if self.sections.len() <= k {
            (None, self.sections.clone())
        } else {
            let older = &self.sections[..self.sections.len() - k];
            let recent = self.sections[self.sections.len() - k..].to_vec();
            (Some(aggregate_summary(older, self.cfg.summary_token_budget)), recent)
        };

        let key_concepts = self.cumulative_key_concepts();
        let tone = self.dominant_tone();

        PromptContext {
            summaries: window,
            aggregate,
            key_concepts,
            tone,
        }
    }

    /// 全文档累计关键概念（保序去重，上限为单节上限的两倍）
    pub fn cumulative_key_concepts(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for section in &self.sections {
            for concept in &section.key_concepts {
                if seen.insert(concept.clone()) {
                    out.push(concept.clone());
                }
            }
        }
        out.truncate(self.cfg.max_key_concepts * 2);
        out
    }

    /// 已生成章节的主导语气（多数票，平票取较早者）
    pub fn dominant_tone(&self) -> Tone {
        let mut counts: Vec<(Tone, usize)> = Vec::new();
        for section in &self.sections {
            match counts.iter_mut().find(|(t, _)| *t == section.tone) {
                Some((_, n)) => *n += 1,
                None => counts.push((section.tone, 1)),
            }
        }
        counts
            .into_iter()
            .max_by_key(|(_, n)| *n)
            .map(|(t, _)| t)
            .unwrap_or(Tone::Neutral)
    }

    fn idle_for(&self) -> std::time::Duration {
        self.last_touched.elapsed()
    }
}

/// 抽取式摘要：按关键词覆盖率与位置给句子打分，按原文顺序取高分句直到 token 预算
fn extractive_summary(text: &str, token_budget: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return truncate_to_tokens(text.trim(), token_budget);
    }

    let top_words: std::collections::HashSet<String> =
        keywords(text, 12).into_iter().collect();

    let mut scored: Vec<(usize, f64)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let words = word_set(s);
            let coverage = if words.is_empty() {
                0.0
            } else {
                words.intersection(&top_words).count() as f64 / words.len() as f64
            };
            // 首尾句带位置加成：开头立题，结尾收束
            let position_bonus = if i == 0 || i + 1 == sentences.len() { 0.15 } else { 0.0 };
            (i, coverage + position_bonus)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut chosen: Vec<usize> = Vec::new();
    let mut used_tokens = 0;
    for (i, _) in scored {
        let cost = TokenEstimator::estimate(&sentences[i]);
        if used_tokens + cost > token_budget && !chosen.is_empty() {
            continue;
        }
        chosen.push(i);
        used_tokens += cost;
        if used_tokens >= token_budget {
            break;
        }
    }

    chosen.sort_unstable();
    let summary = chosen
        .into_iter()
        .map(|i| sentences[i].as_str())
        .collect::<Vec<_>>()
        .join(" ");
    truncate_to_tokens(&summary, token_budget)
}

/// 多节聚合摘要：标题列表 + 各节摘要拼接后再压缩一次
fn aggregate_summary(older: &[SectionSummary], token_budget: usize) -> String {
    let headings = older
        .iter()
        .map(|s| s.heading.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let body = older
        .iter()
        .map(|s| s.compressed_summary.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let compressed = truncate_to_tokens(&body, token_budget);
    format!("Earlier sections ({}): {}", headings, compressed)
}

/// 文档会话表：document_id → 受 Mutex 保护的 DocumentMemory
///
/// 章节任务在生成全程持有所属文档的锁，保证同文档严格串行；锁粒度为单文档，
/// 不同文档互不阻塞。
pub struct NarrativeSessions {
    cfg: NarrativeSection,
    sessions: RwLock<HashMap<String, Arc<Mutex<DocumentMemory>>>>,
}

impl NarrativeSessions {
    pub fn new(cfg: NarrativeSection) -> Self {
        Self {
            cfg,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// 取出或创建文档会话
    pub async fn get_or_create(&self, document_id: &str) -> Arc<Mutex<DocumentMemory>> {
        if let Some(session) = self.sessions.read().await.get(document_id) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(document_id.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(DocumentMemory::new(
                document_id,
                self.cfg.clone(),
            )))
        }))
    }

    /// 仅查询，不创建
    pub async fn get(&self, document_id: &str) -> Option<Arc<Mutex<DocumentMemory>>> {
        self.sessions.read().await.get(document_id).cloned()
    }

    /// 清除闲置超过保留窗口的会话，返回清除数
    pub async fn sweep_idle(&self) -> usize {
        let retention = std::time::Duration::from_secs(self.cfg.session_retention_secs);
        let mut sessions = self.sessions.write().await;
        let mut stale = Vec::new();
        for (id, session) in sessions.iter() {
            if let Ok(memory) = session.try_lock() {
                if memory.idle_for() >= retention {
                    stale.push(id.clone());
                }
            }
        }
        for id in &stale {
            sessions.remove(id);
        }
        if !stale.is_empty() {
            tracing::info!(removed = stale.len(), "reaper removed idle document sessions");
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> NarrativeSection {
        NarrativeSection {
            window_size: 3,
            summary_token_budget: 60,
            max_key_concepts: 5,
            session_retention_secs: 3600,
        }
    }

    fn section_text(topic: &str) -> String {
        format!(
            "The topic of {topic} deserves attention. {topic} interacts with scheduling \
             and resource budgets in production systems. Teams adopting {topic} report \
             fewer regressions. In conclusion, {topic} pays for its complexity."
        )
    }

    #[test]
    fn test_add_section_appends_in_order() {
        let mut memory = DocumentMemory::new("doc1", cfg());
        memory.add_section("s1", "Intro", &section_text("caching"));
        memory.add_section("s2", "Body", &section_text("sharding"));

        assert_eq!(memory.len(), 2);
        assert_eq!(memory.sections()[0].section_id, "s1");
        assert_eq!(memory.sections()[1].section_id, "s2");
        assert!(!memory.sections()[0].compressed_summary.is_empty());
        assert!(memory.sections()[0]
            .key_concepts
            .contains(&"caching".to_string()));
    }

    #[test]
    fn test_summary_respects_token_budget() {
        let mut memory = DocumentMemory::new("doc1", cfg());
        let long_text = section_text("latency").repeat(20);
        memory.add_section("s1", "Long", &long_text);

        let estimate = TokenEstimator::estimate(&memory.sections()[0].compressed_summary);
        // 预算 60，允许截断余量
        assert!(estimate <= 70, "summary estimate {} over budget", estimate);
    }

    #[test]
    fn test_context_reflects_committed_sections_only() {
        let mut memory = DocumentMemory::new("doc1", cfg());
        memory.add_section("s1", "One", &section_text("alpha"));
        let ctx = memory.get_context_for_next();
        assert_eq!(ctx.summaries.len(), 1);
        assert!(ctx.aggregate.is_none());

        memory.add_section("s2", "Two", &section_text("beta"));
        let ctx = memory.get_context_for_next();
        assert_eq!(ctx.summaries.len(), 2);
        assert_eq!(ctx.summaries[1].section_id, "s2");
    }

    #[test]
    fn test_sliding_window_with_aggregate() {
        let mut memory = DocumentMemory::new("doc1", cfg());
        for (i, topic) in ["alpha", "beta", "gamma", "delta", "epsilon"].iter().enumerate() {
            memory.add_section(&format!("s{}", i + 1), topic, &section_text(topic));
        }

        let ctx = memory.get_context_for_next();
        // 窗口 3：最近三节入窗，前两节进聚合
        assert_eq!(ctx.summaries.len(), 3);
        assert_eq!(ctx.summaries[0].heading, "gamma");
        let aggregate = ctx.aggregate.unwrap();
        assert!(aggregate.contains("alpha"));
        assert!(aggregate.contains("beta"));
        assert!(!aggregate.contains("epsilon"));
    }

    #[test]
    fn test_existing_summaries_never_mutate() {
        let mut memory = DocumentMemory::new("doc1", cfg());
        memory.add_section("s1", "One", &section_text("alpha"));
        let before = memory.sections()[0].compressed_summary.clone();

        memory.add_section("s2", "Two", &section_text("beta"));
        memory.add_section("s3", "Three", &section_text("gamma"));

        assert_eq!(memory.sections()[0].compressed_summary, before);
    }

    #[test]
    fn test_dominant_tone_majority() {
        let mut memory = DocumentMemory::new("doc1", cfg());
        memory.add_section(
            "s1",
            "T1",
            "The API config drives the runtime. The struct holds protocol state. The algorithm bounds latency.",
        );
        memory.add_section(
            "s2",
            "T2",
            "The database config and API runtime interact. The implementation tracks throughput.",
        );
        memory.add_section("s3", "T3", "Plain words about nothing much at all today.");
        assert_eq!(memory.dominant_tone(), Tone::Technical);
    }

    #[tokio::test]
    async fn test_sessions_get_or_create_and_sweep() {
        let sessions = NarrativeSessions::new(NarrativeSection {
            session_retention_secs: 0,
            ..cfg()
        });
        let a = sessions.get_or_create("doc1").await;
        let b = sessions.get_or_create("doc1").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(sessions.get("doc2").await.is_none());

        drop((a, b));
        let removed = sessions.sweep_idle().await;
        assert_eq!(removed, 1);
        assert!(sessions.get("doc1").await.is_none());
    }
}
