//! 流水线错误类型
//!
//! 对外只暴露机器可读的错误种类 + 人类可读消息；上游供应商的内部细节在入库前统一脱敏。

use thiserror::Error;

/// 生成流水线可能出现的错误（校验、供应商、超时、审计、未知任务）
#[derive(Error, Debug)]
pub enum PipelineError {
    /// 参数校验失败，任务创建前同步返回
    #[error("Validation failed: {0}")]
    Validation(String),

    /// 供应商调用超时
    #[error("Provider timed out after {0}s")]
    ProviderTimeout(u64),

    /// 供应商调用失败（已脱敏）
    #[error("Provider failed: {0}")]
    ProviderFailure(String),

    /// 任务超过其硬截止时间
    #[error("Task exceeded its deadline")]
    TaskTimeout,

    /// 结构性审计失败，无法继续评分
    #[error("Quality gate failure: {0}")]
    QualityGate(String),

    /// 未知任务 / 文档 / 章节
    #[error("Not found: {0}")]
    NotFound(String),

    /// 任务被协作式取消
    #[error("Task cancelled")]
    Cancelled,
}

impl PipelineError {
    /// 机器可读的错误种类（状态端点返回）
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::ProviderTimeout(_) => "provider_timeout",
            PipelineError::ProviderFailure(_) => "provider_failure",
            PipelineError::TaskTimeout => "task_timeout",
            PipelineError::QualityGate(_) => "quality_gate_failure",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Cancelled => "cancelled",
        }
    }
}

/// 将供应商原始错误脱敏为对外可见的消息（去掉 URL、key、内部堆栈等细节）
pub fn sanitize_provider_error(raw: &str) -> String {
    // 只保留第一行，截断到合理长度，去除疑似密钥片段
    let first_line = raw.lines().next().unwrap_or("").trim();
    let mut msg: String = first_line.chars().take(160).collect();
    if msg.to_lowercase().contains("key") || msg.contains("sk-") || msg.contains("Bearer") {
        msg = "upstream rejected the request".to_string();
    }
    if msg.is_empty() {
        msg = "upstream provider error".to_string();
    }
    format!("content provider error: {}", msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(PipelineError::TaskTimeout.kind(), "task_timeout");
        assert_eq!(PipelineError::Cancelled.kind(), "cancelled");
        assert_eq!(
            PipelineError::Validation("x".into()).kind(),
            "validation_error"
        );
    }

    #[test]
    fn test_sanitize_strips_secrets() {
        let raw = "401 Unauthorized: invalid api key sk-abc123\nstack trace follows";
        let msg = sanitize_provider_error(raw);
        assert!(!msg.contains("sk-abc123"));
        assert!(!msg.contains("stack trace"));
    }

    #[test]
    fn test_sanitize_keeps_first_line() {
        let msg = sanitize_provider_error("connection reset by peer\ndetails");
        assert!(msg.contains("connection reset by peer"));
        assert!(!msg.contains("details"));
    }
}
