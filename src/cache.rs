//! 研究/结果缓存：指纹精确匹配 + TTL + LRU
//!
//! 指纹是规范化请求参数的 SHA-256，只做精确匹配：相近但不同的查询绝不命中。
//! TTL 惰性过期：过期条目在下次触达时按 miss 处理并移除；容量超限时淘汰最久未使用的条目。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// 规范化参数并计算指纹（kind 参与哈希，避免跨任务类型串键）
pub fn fingerprint(kind: &str, params: &serde_json::Value) -> String {
    let canonical = canonicalize(params);
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical.to_string().as_bytes());
    let digest = hasher.finalize();
    format!("{:x}", digest)
}

/// 递归规范化：对象键排序（serde_json Map 本身有序，重建确保一致）、字符串去首尾空白并小写、
/// 数组逐项处理
fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), canonicalize(&map[k]));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        serde_json::Value::String(s) => {
            serde_json::Value::String(s.trim().to_lowercase())
        }
        other => other.clone(),
    }
}

/// 缓存条目
struct CacheEntry {
    payload: serde_json::Value,
    created_at: Instant,
    ttl: Duration,
    /// 逻辑时钟，越大越新
    last_accessed: u64,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// 缓存存储接口：get / put，注入使用，不做隐藏单例
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 精确指纹命中返回 payload；过期条目按 miss 处理并移除
    async fn get(&self, fingerprint: &str) -> Option<serde_json::Value>;

    /// 写入条目；容量超限时淘汰最久未使用的条目
    async fn put(&self, fingerprint: &str, payload: serde_json::Value, ttl: Duration);

    /// 当前驻留条目数（含未触达的过期条目）
    async fn len(&self) -> usize;
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// 访问序号发生器
    tick: u64,
}

/// 内存缓存存储
pub struct InMemoryCacheStore {
    capacity: usize,
    inner: RwLock<CacheInner>,
}

impl InMemoryCacheStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                tick: 0,
            }),
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, fingerprint: &str) -> Option<serde_json::Value> {
        let mut inner = self.inner.write().await;
        let expired = match inner.entries.get(fingerprint) {
            Some(entry) => entry.is_expired(),
            None => return None,
        };

        if expired {
            inner.entries.remove(fingerprint);
            tracing::debug!(%fingerprint, "cache entry expired on touch");
            return None;
        }

        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner.entries.get_mut(fingerprint)?;
        entry.last_accessed = tick;
        Some(entry.payload.clone())
    }

    async fn put(&self, fingerprint: &str, payload: serde_json::Value, ttl: Duration) {
        let mut inner = self.inner.write().await;
        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(
            fingerprint.to_string(),
            CacheEntry {
                payload,
                created_at: Instant::now(),
                ttl,
                last_accessed: tick,
            },
        );

        // 容量超限：淘汰最久未使用（容量为数百量级，线性扫描即可）
        while inner.entries.len() > self.capacity {
            let lru_key = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            match lru_key {
                Some(key) => {
                    inner.entries.remove(&key);
                    tracing::debug!(evicted = %key, "cache evicted LRU entry");
                }
                None => break,
            }
        }
    }

    async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_key_order_and_case() {
        let a = serde_json::json!({"query": "  Rust Async ", "depth": 2});
        let b = serde_json::json!({"depth": 2, "query": "rust async"});
        assert_eq!(fingerprint("research", &a), fingerprint("research", &b));
    }

    #[test]
    fn test_fingerprint_exact_match_only() {
        let a = serde_json::json!({"query": "rust async"});
        let b = serde_json::json!({"query": "rust async runtime"});
        assert_ne!(fingerprint("research", &a), fingerprint("research", &b));
        // 同参数不同任务类型也不串键
        assert_ne!(fingerprint("research", &a), fingerprint("outline", &a));
    }

    #[tokio::test]
    async fn test_put_get_within_ttl() {
        let cache = InMemoryCacheStore::new(4);
        cache
            .put("fp1", serde_json::json!({"v": 1}), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("fp1").await.unwrap()["v"], 1);
    }

    #[tokio::test]
    async fn test_ttl_lazy_expiry() {
        let cache = InMemoryCacheStore::new(4);
        cache
            .put("fp1", serde_json::json!({"v": 1}), Duration::from_millis(10))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        // 仍然驻留，但触达时按 miss 处理并移除
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("fp1").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_lru_eviction_exact() {
        let cache = InMemoryCacheStore::new(3);
        for key in ["a", "b", "c"] {
            cache
                .put(key, serde_json::json!(key), Duration::from_secs(60))
                .await;
        }
        // 触达 a 使其变新，此时 b 是最久未使用
        assert!(cache.get("a").await.is_some());

        cache
            .put("d", serde_json::json!("d"), Duration::from_secs(60))
            .await;

        assert_eq!(cache.len().await, 3);
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("c").await.is_some());
        assert!(cache.get("d").await.is_some());
    }
}
