//! 证据检索：域名白名单、超时、片段大小限制
//!
//! search(query) 返回带标题 / URL / 片段 / 相关度的证据列表。
//! HTTP 实现走维基百科 opensearch 端点取候选，再按白名单抓取页面正文补全片段；
//! 对 HTML 响应使用 html2text 提取可读文本，超过 max_snippet_chars 时截断并追加 ...[truncated]。

use std::collections::HashSet;

use async_trait::async_trait;
use futures_util::future::join_all;
use html2text::from_read;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// 单条证据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// 相关度 [0,1]，按检索排名衰减
    pub relevance: f64,
}

/// 证据提供方接口
#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Evidence>, String>;
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut prev_whitespace = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => {
                let is_whitespace = c.is_whitespace();
                if is_whitespace && prev_whitespace {
                    continue;
                }
                prev_whitespace = is_whitespace;
                out.push(if is_whitespace { ' ' } else { c });
            }
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// 从 URL 中提取 host（不含端口后的路径）
fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let host = url.split('/').next()?;
    let host = host.split(':').next()?;
    Some(host.to_lowercase())
}

/// 片段截断：超出上限时补 ...[truncated]
fn clip_snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        text.to_string()
    }
}

/// 排名 → 相关度：首条 1.0，此后按位置衰减
fn rank_relevance(index: usize) -> f64 {
    1.0 / (1.0 + index as f64 * 0.5)
}

/// HTTP 证据提供方：opensearch 候选 + 白名单抓取
pub struct HttpEvidenceProvider {
    client: Client,
    allowed_domains: HashSet<String>,
    max_snippet_chars: usize,
    max_results: usize,
}

impl HttpEvidenceProvider {
    pub fn new(
        allowed_domains: Vec<String>,
        timeout_secs: u64,
        max_snippet_chars: usize,
        max_results: usize,
    ) -> Self {
        let allowed_domains = allowed_domains.into_iter().map(|s| s.to_lowercase()).collect();
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("weaver/0.1 content research")
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains,
            max_snippet_chars,
            max_results: max_results.max(1),
        }
    }

    fn is_allowed(&self, url: &str) -> Result<(), String> {
        let domain = extract_domain(url).ok_or_else(|| "Invalid or missing URL".to_string())?;
        if self.allowed_domains.contains(&domain) {
            return Ok(());
        }
        Err(format!("Domain not in allowlist: {}", domain))
    }

    /// 将 HTML 转为可读文本（去除 script/style 等）
    fn html_to_text(&self, html: &str) -> String {
        match from_read(html.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => strip_html_tags(html),
        }
    }

    /// opensearch：返回 (title, description, url) 三元组
    async fn opensearch(&self, query: &str) -> Result<Vec<(String, String, String)>, String> {
        let url = format!(
            "https://en.wikipedia.org/w/api.php?action=opensearch&format=json&limit={}&search={}",
            self.max_results,
            urlencode(query)
        );
        self.is_allowed(&url)?;

        let resp: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?
            .json()
            .await
            .map_err(|e| format!("Parse body: {}", e))?;

        // opensearch 格式：[query, [titles], [descriptions], [urls]]
        let titles = resp.get(1).and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let descriptions = resp.get(2).and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let urls = resp.get(3).and_then(|v| v.as_array()).cloned().unwrap_or_default();

        let mut out = Vec::new();
        for (i, title) in titles.iter().enumerate() {
            let title = title.as_str().unwrap_or("").to_string();
            let desc = descriptions
                .get(i)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let url = urls.get(i).and_then(|v| v.as_str()).unwrap_or("").to_string();
            if !title.is_empty() && !url.is_empty() {
                out.push((title, desc, url));
            }
        }
        Ok(out)
    }

    /// 片段为空时抓取页面正文开头补全
    async fn fetch_snippet(&self, url: &str) -> Result<String, String> {
        self.is_allowed(url)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp.text().await.map_err(|e| format!("Read body: {}", e))?;
        Ok(clip_snippet(&self.html_to_text(&body), self.max_snippet_chars))
    }
}

#[async_trait]
impl EvidenceProvider for HttpEvidenceProvider {
    async fn search(&self, query: &str) -> Result<Vec<Evidence>, String> {
        let query = query.trim();
        if query.is_empty() {
            return Err("Empty query".to_string());
        }
        tracing::info!(%query, "evidence search");

        let candidates = self.opensearch(query).await?;

        // 缺描述的候选并发抓取页面正文补全片段；单条抓取失败不影响整次检索
        let snippets = join_all(candidates.iter().map(|(_, desc, url)| async move {
            if !desc.trim().is_empty() {
                return clip_snippet(desc, self.max_snippet_chars);
            }
            match self.fetch_snippet(url).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::debug!(%url, error = %e, "snippet fetch failed, keeping bare result");
                    String::new()
                }
            }
        }))
        .await;

        Ok(candidates
            .into_iter()
            .zip(snippets)
            .enumerate()
            .map(|(i, ((title, _, url), snippet))| Evidence {
                title,
                url,
                snippet,
                relevance: rank_relevance(i),
            })
            .collect())
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Mock 证据提供方（测试用，无需网络）
#[derive(Debug, Default)]
pub struct MockEvidenceProvider;

#[async_trait]
impl EvidenceProvider for MockEvidenceProvider {
    async fn search(&self, query: &str) -> Result<Vec<Evidence>, String> {
        Ok(vec![
            Evidence {
                title: format!("{} overview", query),
                url: "https://en.wikipedia.org/wiki/Example".to_string(),
                snippet: format!("Background reading about {}.", query),
                relevance: 1.0,
            },
            Evidence {
                title: format!("{} in practice", query),
                url: "https://docs.rs/example".to_string(),
                snippet: format!("Practical notes on {}.", query),
                relevance: rank_relevance(1),
            },
        ])
    }
}
