//! 文本分析基础件：token 估算、分句、关键词、语气
//!
//! 摘要与打分都建立在这些确定性函数上，不依赖 LLM，保证可复现与可缓存。

use std::collections::{HashMap, HashSet};

/// Token 估算器（简单的字符计数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    /// 使用简单的启发式规则：英文约 4 字符/token，中文约 1.5 字符/token
    pub fn estimate(text: &str) -> usize {
        let mut tokens = 0;
        let mut ascii_chars = 0;
        let mut non_ascii_chars = 0;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        tokens += ascii_chars / 4;
        tokens += (non_ascii_chars as f64 / 1.5).ceil() as usize;

        tokens.max(1)
    }
}

/// 将文本截断到指定 token 数（按比例截断，保留开头部分）
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let estimated = TokenEstimator::estimate(text);
    if estimated <= max_tokens {
        return text.to_string();
    }

    let ratio = max_tokens as f64 / estimated as f64;
    let target_chars = (text.chars().count() as f64 * ratio * 0.9) as usize;

    let truncated: String = text.chars().take(target_chars).collect();
    format!("{}...", truncated.trim_end())
}

/// 按句号/问号/感叹号分句，过滤空句与 Markdown 标题行
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut current = String::new();
        for c in line.chars() {
            current.push(c);
            if matches!(c, '.' | '!' | '?' | '。' | '！' | '？') {
                let s = current.trim().to_string();
                if !s.is_empty() {
                    sentences.push(s);
                }
                current = String::new();
            }
        }
        let tail = current.trim();
        if !tail.is_empty() {
            sentences.push(tail.to_string());
        }
    }
    sentences
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "for", "nor", "with", "this", "that", "these", "those",
    "from", "into", "onto", "over", "under", "about", "after", "before", "between", "through",
    "their", "there", "where", "which", "while", "would", "could", "should", "will", "have",
    "has", "had", "been", "being", "were", "are", "was", "its", "than", "then", "them", "they",
    "when", "what", "who", "whom", "whose", "here", "each", "every", "some", "such", "also",
    "more", "most", "much", "many", "very", "just", "only", "both", "because", "does", "not",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// 归一化后的内容词（小写、去标点、过滤停用词与短词）
pub fn content_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 3 && !is_stopword(w))
        .collect()
}

/// 内容词集合
pub fn word_set(text: &str) -> HashSet<String> {
    content_words(text).into_iter().collect()
}

/// 词频 Top-N 关键词；同频按字典序，保证确定性
pub fn keywords(text: &str, max: usize) -> Vec<String> {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for word in content_words(text) {
        *freq.entry(word).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(max).map(|(w, _)| w).collect()
}

/// 两个词集合的 Jaccard 重叠度
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// 语气描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// 正式书面语（moreover / consequently / 长句）
    Formal,
    /// 口语化（第二人称、缩写、疑问）
    Conversational,
    /// 技术性（代码、数字、术语）
    Technical,
    /// 无明显倾向
    Neutral,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Formal => "formal",
            Tone::Conversational => "conversational",
            Tone::Technical => "technical",
            Tone::Neutral => "neutral",
        }
    }

    /// 根据标记词频率推断语气
    pub fn detect(text: &str) -> Tone {
        let lower = text.to_lowercase();
        let words = lower.split_whitespace().count().max(1);

        let conversational_markers = [
            "you ", "your ", "let's", "we'll", "don't", "can't", "it's", "isn't", "won't",
            "you'll", "here's", "that's",
        ];
        let formal_markers = [
            "moreover", "furthermore", "consequently", "nevertheless", "therefore", "thus",
            "hence", "accordingly", "notwithstanding",
        ];
        let technical_markers = [
            "```", "api", "config", "function", "struct", "runtime", "protocol", "algorithm",
            "implementation", "latency", "throughput", "database",
        ];

        let count = |markers: &[&str]| -> usize {
            markers.iter().map(|m| lower.matches(m).count()).sum()
        };

        let conversational = count(&conversational_markers) as f64 / words as f64;
        let formal = count(&formal_markers) as f64 / words as f64;
        let technical = count(&technical_markers) as f64 / words as f64;

        let threshold = 0.004;
        let best = conversational.max(formal).max(technical);
        if best < threshold {
            return Tone::Neutral;
        }
        if (best - technical).abs() < f64::EPSILON {
            Tone::Technical
        } else if (best - formal).abs() < f64::EPSILON {
            Tone::Formal
        } else {
            Tone::Conversational
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimator_english() {
        let text = "Hello, world! This is a test.";
        let tokens = TokenEstimator::estimate(text);
        assert!(tokens > 0);
        assert!(tokens < text.len());
    }

    #[test]
    fn test_truncate_to_tokens() {
        let long = "word ".repeat(500);
        let truncated = truncate_to_tokens(&long, 20);
        assert!(TokenEstimator::estimate(&truncated) <= 25);
        assert!(truncated.ends_with("..."));
        // 预算内不截断
        assert_eq!(truncate_to_tokens("short", 100), "short");
    }

    #[test]
    fn test_split_sentences_skips_headings() {
        let text = "## Heading\n\nFirst sentence. Second one! Third?\nTail without period";
        let sentences = split_sentences(text);
        assert_eq!(sentences.len(), 4);
        assert_eq!(sentences[0], "First sentence.");
        assert_eq!(sentences[3], "Tail without period");
    }

    #[test]
    fn test_keywords_deterministic() {
        let text = "Async runtimes schedule tasks. Runtimes drive tasks across threads. Async everywhere.";
        let a = keywords(text, 3);
        let b = keywords(text, 3);
        assert_eq!(a, b);
        assert!(a.contains(&"runtimes".to_string()));
        assert!(!a.iter().any(|w| w == "the"));
    }

    #[test]
    fn test_jaccard_bounds() {
        let a = word_set("rust async runtime");
        let b = word_set("rust async runtime");
        assert!((jaccard(&a, &b) - 1.0).abs() < 1e-9);
        let c = word_set("completely different subject matter");
        assert!(jaccard(&a, &c) < 0.2);
    }

    #[test]
    fn test_tone_detection() {
        assert_eq!(
            Tone::detect("You can't just skip this; here's what you'll do. Don't worry, it's fine. Let's go."),
            Tone::Conversational
        );
        assert_eq!(
            Tone::detect("The API config drives the runtime. The struct holds the protocol state. The algorithm bounds latency."),
            Tone::Technical
        );
        assert_eq!(
            Tone::detect("Moreover, the evidence is clear. Consequently, the committee concurred. Thus the matter closed."),
            Tone::Formal
        );
        assert_eq!(Tone::detect("Plain words about nothing in particular at all."), Tone::Neutral);
    }
}
