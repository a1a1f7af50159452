//! 任务数据模型
//!
//! 任务由网关创建、由其执行器独占修改、由 reaper 到期销毁；
//! 状态转移单调：Pending → Running → {Completed | Failed | Cancelled}，不可回退、不可重复进入终态。

use serde::{Deserialize, Serialize};

/// 任务 ID
pub type TaskId = String;

/// 任务类型（决定参数校验与硬截止时间）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// 主题研究（证据检索 + 结论综合）
    Research,
    /// 大纲生成
    Outline,
    /// 章节生成（走叙事连贯与质量审计）
    Section,
    /// SEO 启发式分析
    SeoAnalysis,
}

impl TaskKind {
    /// 解析 kebab-case 名称（网关入参）
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "research" => Some(TaskKind::Research),
            "outline" => Some(TaskKind::Outline),
            "section" => Some(TaskKind::Section),
            "seo-analysis" => Some(TaskKind::SeoAnalysis),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Research => "research",
            TaskKind::Outline => "outline",
            TaskKind::Section => "section",
            TaskKind::SeoAnalysis => "seo-analysis",
        }
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 已创建，等待执行
    Pending,
    /// 正在执行
    Running,
    /// 成功完成，result 可用
    Completed,
    /// 执行失败，error 可用
    Failed,
    /// 被协作式取消
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// 单调转移检查：只允许 Pending→Running 与 Running→终态
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Cancelled)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
        )
    }
}

/// 进度条目（只追加，不覆盖）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    /// 毫秒时间戳
    pub timestamp: i64,
    pub message: String,
}

/// 任务错误（机器可读种类 + 人类可读消息）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: String,
    pub message: String,
}

/// 异步任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    /// 原始入参（已通过校验）
    pub params: serde_json::Value,
    /// 进度日志（只追加）
    pub progress: Vec<ProgressEntry>,
    /// 仅 Completed 时存在
    pub result: Option<serde_json::Value>,
    /// 仅 Failed / Cancelled 时存在
    pub error: Option<TaskError>,
    /// 毫秒时间戳
    pub created_at: i64,
    pub updated_at: i64,
    /// 到期后 reaper 无条件清除（不论是否终态）
    pub expires_at: i64,
}

impl Task {
    pub fn new(kind: TaskKind, params: serde_json::Value, retention_secs: u64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: format!("task_{}", uuid::Uuid::new_v4()),
            kind,
            status: TaskStatus::Pending,
            params,
            progress: Vec::new(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            expires_at: now + (retention_secs as i64) * 1000,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// 对外的一致性快照（status 端点返回；progress 仅含最近 N 条）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: Vec<ProgressEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TaskSnapshot {
    /// 从任务克隆出快照，progress 只保留尾部 tail 条
    pub fn of(task: &Task, tail: usize) -> Self {
        let skip = task.progress.len().saturating_sub(tail);
        Self {
            task_id: task.id.clone(),
            kind: task.kind,
            status: task.status,
            progress: task.progress[skip..].to_vec(),
            result: task.result.clone(),
            error: task.error.clone(),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for s in ["research", "outline", "section", "seo-analysis"] {
            assert_eq!(TaskKind::parse(s).unwrap().as_str(), s);
        }
        assert!(TaskKind::parse("publish").is_none());
    }

    #[test]
    fn test_monotonic_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
        // 不可回退
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Running));
        // 终态不可重复进入
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_snapshot_progress_tail() {
        let mut task = Task::new(TaskKind::Research, serde_json::json!({}), 60);
        for i in 0..10 {
            task.progress.push(ProgressEntry {
                timestamp: i,
                message: format!("step {}", i),
            });
        }
        let snap = TaskSnapshot::of(&task, 3);
        assert_eq!(snap.progress.len(), 3);
        assert_eq!(snap.progress[0].message, "step 7");
    }
}
