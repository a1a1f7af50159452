//! 轮询网关：对外唯一的 HTTP 表面
//!
//! POST /api/tasks 创建任务（参数先校验，失败不消耗执行槽位）；
//! GET /api/tasks/:id 轮询快照；POST /api/tasks/:id/cancel 协作式取消；
//! GET /api/continuity/:document_id/:section_id 读连贯性指标。
//! 网关不限制轮询次数，任务生命周期只由自身截止时间约束。

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::config::TasksSection;
use crate::core::{
    PipelineError, Task, TaskExecutor, TaskKind, TaskSnapshot, TaskStore,
};
use crate::pipeline::{self, Pipeline};
use crate::store::MetricsStore;

/// 网关共享状态
pub struct GatewayState {
    pub store: Arc<dyn TaskStore>,
    pub executor: Arc<TaskExecutor>,
    pub pipeline: Arc<Pipeline>,
    pub metrics: Arc<dyn MetricsStore>,
    pub tasks_cfg: TasksSection,
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub task_id: String,
}

/// 统一错误响应体：机器可读种类 + 人类可读消息
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

fn error_response(status: StatusCode, e: &PipelineError) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            error: ErrorDetail {
                kind: e.kind().to_string(),
                message: e.to_string(),
            },
        }),
    )
}

/// 组装路由
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/api/tasks", post(api_task_start))
        .route("/api/tasks/:id", get(api_task_status))
        .route("/api/tasks/:id/cancel", post(api_task_cancel))
        .route(
            "/api/continuity/:document_id/:section_id",
            get(api_continuity),
        )
        .route("/api/health", get(|| async { "OK" }))
        .with_state(state)
}

/// 绑定并运行网关
pub async fn serve(state: Arc<GatewayState>, addr: &str) -> anyhow::Result<()> {
    let app = router(state);
    tracing::info!("weaver gateway listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// POST /api/tasks：校验 → 登记 → 派发执行器
async fn api_task_start(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<StartRequest>,
) -> Result<(StatusCode, Json<StartResponse>), (StatusCode, Json<ErrorBody>)> {
    let kind = TaskKind::parse(&req.kind).ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            &PipelineError::Validation(format!("unknown task kind \"{}\"", req.kind)),
        )
    })?;

    // fail fast：校验不过不创建任务、不占执行槽位
    pipeline::validate(kind, &req.params)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e))?;

    let task = Task::new(kind, req.params.clone(), state.tasks_cfg.retention_secs);
    let task_id = state.store.insert(task).await;
    tracing::info!(task_id = %task_id, kind = kind.as_str(), "task created");

    let pipeline = Arc::clone(&state.pipeline);
    let params = req.params;
    let deadline = state.tasks_cfg.deadline_for(kind);
    state
        .executor
        .spawn(task_id.clone(), deadline, move |reporter, token| async move {
            pipeline.run(kind, params, reporter, token).await
        });

    Ok((StatusCode::ACCEPTED, Json(StartResponse { task_id })))
}

/// GET /api/tasks/:id：一致性快照或 404
async fn api_task_status(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskSnapshot>, (StatusCode, Json<ErrorBody>)> {
    match state.store.snapshot(&id, state.tasks_cfg.progress_tail).await {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(error_response(
            StatusCode::NOT_FOUND,
            &PipelineError::NotFound(id),
        )),
    }
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    cancelled: bool,
}

/// POST /api/tasks/:id/cancel：设置协作式取消标志
///
/// 执行器只在既定检查点观察标志；已终态的任务返回 cancelled=false。
async fn api_task_cancel(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, (StatusCode, Json<ErrorBody>)> {
    if state
        .store
        .snapshot(&id, 0)
        .await
        .is_none()
    {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            &PipelineError::NotFound(id),
        ));
    }

    let cancelled = state.executor.cancellations().cancel(&id).await;
    Ok(Json(CancelResponse { cancelled }))
}

/// GET /api/continuity/:document_id/:section_id：连贯性指标
async fn api_continuity(
    State(state): State<Arc<GatewayState>>,
    Path((document_id, section_id)): Path<(String, String)>,
) -> Result<Json<crate::narrative::FlowMetrics>, (StatusCode, Json<ErrorBody>)> {
    match state.metrics.get(&document_id, &section_id).await {
        Some(metrics) => Ok(Json(metrics)),
        None => Err(error_response(
            StatusCode::NOT_FOUND,
            &PipelineError::NotFound(format!("{}/{}", document_id, section_id)),
        )),
    }
}
