//! 任务注册表：状态 / 进度 / 结果的唯一归属方
//!
//! TaskStore 以 trait 注入（内存实现可替换为分布式后端），不做隐藏单例；
//! 读取返回快照克隆，写入只在短临界区内持锁。
//! 所有状态转移经过单调性检查，非法转移被拒绝并记录告警。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::error::PipelineError;
use crate::core::task::{ProgressEntry, Task, TaskError, TaskId, TaskSnapshot, TaskStatus};

/// 任务存储接口：创建、快照、转移、进度、终态、清扫
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 登记新任务（Pending）
    async fn insert(&self, task: Task) -> TaskId;

    /// 一致性快照；progress 仅含最近 tail 条。未知 id 返回 None
    async fn snapshot(&self, id: &str, tail: usize) -> Option<TaskSnapshot>;

    /// Pending → Running
    async fn mark_running(&self, id: &str) -> Result<(), PipelineError>;

    /// 追加一条带时间戳的进度（从不覆盖已有条目）
    async fn append_progress(&self, id: &str, message: String);

    /// Running → Completed，提交结果。终态后再次提交被拒绝
    async fn complete(&self, id: &str, result: serde_json::Value) -> Result<(), PipelineError>;

    /// 进入 Failed / Cancelled 终态；超时与取消共用此清理路径，不提交任何部分结果
    async fn finish_with_error(
        &self,
        id: &str,
        status: TaskStatus,
        error: TaskError,
    ) -> Result<(), PipelineError>;

    /// 清除所有过期任务（不论是否终态），返回清除数
    async fn sweep_expired(&self) -> usize;
}

/// 内存任务存储
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    async fn transition(
        &self,
        id: &str,
        next: TaskStatus,
        mutate: impl FnOnce(&mut Task),
    ) -> Result<(), PipelineError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))?;

        if !task.status.can_transition_to(next) {
            tracing::warn!(
                task_id = %id,
                from = ?task.status,
                to = ?next,
                "rejected non-monotonic status transition"
            );
            return Err(PipelineError::Validation(format!(
                "illegal transition {:?} -> {:?}",
                task.status, next
            )));
        }

        task.status = next;
        task.updated_at = chrono::Utc::now().timestamp_millis();
        mutate(task);
        Ok(())
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> TaskId {
        let id = task.id.clone();
        self.tasks.write().await.insert(id.clone(), task);
        id
    }

    async fn snapshot(&self, id: &str, tail: usize) -> Option<TaskSnapshot> {
        self.tasks
            .read()
            .await
            .get(id)
            .map(|t| TaskSnapshot::of(t, tail))
    }

    async fn mark_running(&self, id: &str) -> Result<(), PipelineError> {
        self.transition(id, TaskStatus::Running, |_| {}).await
    }

    async fn append_progress(&self, id: &str, message: String) {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(id) {
            task.progress.push(ProgressEntry {
                timestamp: chrono::Utc::now().timestamp_millis(),
                message,
            });
            task.updated_at = chrono::Utc::now().timestamp_millis();
        }
    }

    async fn complete(&self, id: &str, result: serde_json::Value) -> Result<(), PipelineError> {
        self.transition(id, TaskStatus::Completed, |task| {
            task.result = Some(result);
        })
        .await
    }

    async fn finish_with_error(
        &self,
        id: &str,
        status: TaskStatus,
        error: TaskError,
    ) -> Result<(), PipelineError> {
        debug_assert!(matches!(
            status,
            TaskStatus::Failed | TaskStatus::Cancelled
        ));
        self.transition(id, status, |task| {
            task.error = Some(error);
            task.result = None;
        })
        .await
    }

    async fn sweep_expired(&self) -> usize {
        let now = chrono::Utc::now().timestamp_millis();
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, t| t.expires_at > now);
        let removed = before - tasks.len();
        if removed > 0 {
            tracing::info!(removed, "reaper removed expired tasks");
        }
        removed
    }
}

/// 启动后台 reaper：按固定间隔清扫过期任务，约束内存占用与客户端行为无关
pub fn spawn_reaper(
    store: std::sync::Arc<dyn TaskStore>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            store.sweep_expired().await;
        }
    })
}
