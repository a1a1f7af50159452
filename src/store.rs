//! 连贯性指标存储：窄的 get/set 契约
//!
//! 进程内实现用于默认部署；需要跨进程持久化时替换实现即可，核心不感知后端。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::narrative::FlowMetrics;

/// (document_id, section_id) → FlowMetrics 的窄存储契约
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn set(&self, document_id: &str, section_id: &str, metrics: FlowMetrics);
    async fn get(&self, document_id: &str, section_id: &str) -> Option<FlowMetrics>;
}

/// 内存实现
#[derive(Default)]
pub struct InMemoryMetricsStore {
    entries: RwLock<HashMap<(String, String), FlowMetrics>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn set(&self, document_id: &str, section_id: &str, metrics: FlowMetrics) {
        self.entries
            .write()
            .await
            .insert((document_id.to_string(), section_id.to_string()), metrics);
    }

    async fn get(&self, document_id: &str, section_id: &str) -> Option<FlowMetrics> {
        self.entries
            .read()
            .await
            .get(&(document_id.to_string(), section_id.to_string()))
            .cloned()
    }
}
