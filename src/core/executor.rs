//! 任务执行器：在硬截止时间与协作式取消下运行单个操作
//!
//! 每个任务逻辑上单线程跑完全程；并发由 Semaphore 限流（等待许可是挂起点，计入截止时间）。
//! 取消只在既定检查点被观察（发起供应商调用前、返回后、提交结果前），从不抢占进行中的调用；
//! 取消与超时共用同一条清理路径，永不提交部分结果。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::core::error::PipelineError;
use crate::core::registry::TaskStore;
use crate::core::task::{TaskError, TaskId, TaskStatus};

/// 每任务取消令牌注册表（网关 cancel 端点写入，执行器在检查点读取）
#[derive(Default)]
pub struct CancellationRegistry {
    tokens: RwLock<HashMap<TaskId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为任务创建并登记令牌
    pub async fn register(&self, task_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens
            .write()
            .await
            .insert(task_id.to_string(), token.clone());
        token
    }

    /// 触发协作式取消；未知任务返回 false
    pub async fn cancel(&self, task_id: &str) -> bool {
        match self.tokens.read().await.get(task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn remove(&self, task_id: &str) {
        self.tokens.write().await.remove(task_id);
    }
}

/// 检查点：已取消则返回 Cancelled，调用方用 `?` 传播
pub fn checkpoint(token: &CancellationToken) -> Result<(), PipelineError> {
    if token.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

/// 进度上报句柄（只追加，由任务自己的执行器持有）
#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<dyn TaskStore>,
    task_id: TaskId,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn TaskStore>, task_id: TaskId) -> Self {
        Self { store, task_id }
    }

    pub async fn report(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(task_id = %self.task_id, %message, "progress");
        self.store.append_progress(&self.task_id, message).await;
    }
}

/// 任务执行器：许可限流 + 截止时间 + 终态落账
pub struct TaskExecutor {
    store: Arc<dyn TaskStore>,
    cancellations: Arc<CancellationRegistry>,
    semaphore: Arc<Semaphore>,
}

impl TaskExecutor {
    pub fn new(store: Arc<dyn TaskStore>, max_concurrent: usize) -> Self {
        Self {
            store,
            cancellations: Arc::new(CancellationRegistry::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn cancellations(&self) -> Arc<CancellationRegistry> {
        Arc::clone(&self.cancellations)
    }

    /// 派发一个已登记（Pending）的任务
    ///
    /// op 收到进度句柄与取消令牌，返回结果 JSON；执行器负责：
    /// 等待许可 → Running → 在 deadline 内运行 op → 提交前最后一次检查点 → 终态。
    pub fn spawn<F, Fut>(&self, task_id: TaskId, deadline: std::time::Duration, op: F)
    where
        F: FnOnce(ProgressReporter, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value, PipelineError>> + Send,
    {
        let store = Arc::clone(&self.store);
        let cancellations = Arc::clone(&self.cancellations);
        let semaphore = Arc::clone(&self.semaphore);

        tokio::spawn(async move {
            let token = cancellations.register(&task_id).await;
            let reporter = ProgressReporter::new(Arc::clone(&store), task_id.clone());

            let run = async {
                // 等待许可也是挂起点，计入截止时间
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| PipelineError::ProviderFailure("executor shut down".into()))?;

                checkpoint(&token)?;
                store.mark_running(&task_id).await?;

                let result = op(reporter, token.clone()).await?;

                // 提交前的最后检查点：取消后不提交任何结果
                checkpoint(&token)?;
                Ok::<serde_json::Value, PipelineError>(result)
            };

            let outcome = tokio::time::timeout(deadline, run).await;

            let finish = match outcome {
                Ok(Ok(result)) => store.complete(&task_id, result).await,
                Ok(Err(PipelineError::Cancelled)) => {
                    store
                        .finish_with_error(
                            &task_id,
                            TaskStatus::Cancelled,
                            TaskError {
                                kind: PipelineError::Cancelled.kind().into(),
                                message: "task cancelled by caller".into(),
                            },
                        )
                        .await
                }
                Ok(Err(e)) => {
                    store
                        .finish_with_error(
                            &task_id,
                            TaskStatus::Failed,
                            TaskError {
                                kind: e.kind().into(),
                                message: e.to_string(),
                            },
                        )
                        .await
                }
                Err(_elapsed) => {
                    tracing::warn!(task_id = %task_id, "task exceeded deadline");
                    store
                        .finish_with_error(
                            &task_id,
                            TaskStatus::Failed,
                            TaskError {
                                kind: PipelineError::TaskTimeout.kind().into(),
                                message: PipelineError::TaskTimeout.to_string(),
                            },
                        )
                        .await
                }
            };

            if let Err(e) = finish {
                // 任务已不在可转移状态（如 reaper 先清除），只记录
                tracing::warn!(task_id = %task_id, error = %e, "could not finalize task");
            }

            cancellations.remove(&task_id).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::InMemoryTaskStore;
    use crate::core::task::{Task, TaskKind};
    use std::time::Duration;

    async fn wait_terminal(
        store: &Arc<dyn TaskStore>,
        id: &str,
        max_ms: u64,
    ) -> crate::core::task::TaskSnapshot {
        for _ in 0..(max_ms / 5) {
            if let Some(snap) = store.snapshot(id, 10).await {
                if snap.status.is_terminal() {
                    return snap;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {} did not reach a terminal state", id);
    }

    fn setup() -> (Arc<dyn TaskStore>, TaskExecutor) {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let executor = TaskExecutor::new(Arc::clone(&store), 4);
        (store, executor)
    }

    #[tokio::test]
    async fn test_successful_run() {
        let (store, executor) = setup();
        let id = store
            .insert(Task::new(TaskKind::Outline, serde_json::json!({}), 60))
            .await;

        executor.spawn(id.clone(), Duration::from_secs(5), |reporter, _token| async move {
            reporter.report("working").await;
            Ok(serde_json::json!({"text": "outline"}))
        });

        let snap = wait_terminal(&store, &id, 2000).await;
        assert_eq!(snap.status, TaskStatus::Completed);
        assert_eq!(snap.progress.len(), 1);
        assert_eq!(snap.result.unwrap()["text"], "outline");
    }

    #[tokio::test]
    async fn test_deadline_exceeded_fails_with_timeout() {
        let (store, executor) = setup();
        let id = store
            .insert(Task::new(TaskKind::Research, serde_json::json!({}), 60))
            .await;

        let started = std::time::Instant::now();
        executor.spawn(id.clone(), Duration::from_millis(50), |_r, _t| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(serde_json::json!({"never": true}))
        });

        let snap = wait_terminal(&store, &id, 2000).await;
        // 截止时间 + 小 epsilon 内进入终态
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(snap.status, TaskStatus::Failed);
        assert_eq!(snap.error.unwrap().kind, "task_timeout");
        assert!(snap.result.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_at_checkpoint() {
        let (store, executor) = setup();
        let cancellations = executor.cancellations();
        let id = store
            .insert(Task::new(TaskKind::Section, serde_json::json!({}), 60))
            .await;

        let id2 = id.clone();
        executor.spawn(id.clone(), Duration::from_secs(5), move |_r, token| async move {
            // 模拟供应商调用返回后的检查点
            for _ in 0..100 {
                checkpoint(&token)?;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(serde_json::json!({"text": "section"}))
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cancellations.cancel(&id2).await);

        let snap = wait_terminal(&store, &id, 2000).await;
        assert_eq!(snap.status, TaskStatus::Cancelled);
        assert!(snap.result.is_none());
        assert_eq!(snap.error.unwrap().kind, "cancelled");
    }

    #[tokio::test]
    async fn test_operation_error_is_sanitized_kind() {
        let (store, executor) = setup();
        let id = store
            .insert(Task::new(TaskKind::Research, serde_json::json!({}), 60))
            .await;

        executor.spawn(id.clone(), Duration::from_secs(5), |_r, _t| async move {
            Err(PipelineError::ProviderFailure(
                "content provider error: timeout".into(),
            ))
        });

        let snap = wait_terminal(&store, &id, 2000).await;
        assert_eq!(snap.status, TaskStatus::Failed);
        assert_eq!(snap.error.unwrap().kind, "provider_failure");
    }

    #[tokio::test]
    async fn test_cancel_unknown_task() {
        let (_store, executor) = setup();
        assert!(!executor.cancellations().cancel("task_missing").await);
    }
}
