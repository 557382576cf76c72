//! The HTTP observation surface (§6.2, §10.5): read-only JSON endpoints
//! plus an SSE `watch_board` stream, and the mutating Task/Workspace/Plan
//! operations as JSON POST endpoints.
//!
//! Router shape (state, error type, `oneshot`-testable handlers) is
//! adapted from the host's `serve_cmd`; the SSE endpoint is new, since the
//! host's surface is read-only HTTP with no live stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use taskboard_core::bus::BoardEvent;
use taskboard_core::plan::PlanResult;
use taskboard_core::{Board, BoardError, SchedulerHandle};
use taskboard_db::models::{Task, TaskStatus, Workspace};
use taskboard_db::queries::tasks::TaskPatch;
use taskboard_db::queries::workspaces::WorkspacePatch;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl From<BoardError> for AppError {
    fn from(err: BoardError) -> Self {
        let status = match &err {
            BoardError::Validation(_) => StatusCode::BAD_REQUEST,
            BoardError::WorkspaceNotFound(_) | BoardError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            BoardError::IllegalTransition { .. } | BoardError::Conflict(_) => StatusCode::CONFLICT,
            BoardError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError { status, message: err.to_string() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    board: Arc<Board>,
    scheduler: Arc<dyn SchedulerHandle>,
}

pub fn build_router(board: Arc<Board>, scheduler: Arc<dyn SchedulerHandle>) -> Router {
    let state = AppState { board, scheduler };
    Router::new()
        .route("/api/overview", get(get_overview))
        .route("/api/workspaces", get(list_workspaces).post(create_workspace))
        .route(
            "/api/workspaces/{id}",
            get(get_workspace).patch(update_workspace).delete(delete_workspace),
        )
        .route("/api/workspaces/{id}/pause", post(pause_workspace))
        .route("/api/workspaces/{id}/resume", post(resume_workspace))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", get(get_task).patch(update_task).delete(delete_task))
        .route("/api/tasks/{id}/start", post(start_task))
        .route("/api/tasks/{id}/cancel", post(cancel_task))
        .route("/api/tasks/{id}/retry", post(retry_task))
        .route("/api/tasks/{id}/log", get(get_task_log))
        .route("/api/plans/approve", post(approve_plan))
        .route("/api/watch", get(watch_board))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Observation handlers
// ---------------------------------------------------------------------------

async fn get_overview(State(state): State<AppState>) -> Result<Response, AppError> {
    Ok(Json(state.board.overview().await?).into_response())
}

async fn list_workspaces(State(state): State<AppState>) -> Result<Response, AppError> {
    let workspaces: Vec<Workspace> = state.board.list_workspaces().await?;
    Ok(Json(workspaces).into_response())
}

#[derive(Debug, Deserialize)]
struct CreateWorkspaceRequest {
    name: String,
    goal: String,
    #[serde(default)]
    context: String,
    #[serde(default = "default_max_concurrent")]
    max_concurrent: i64,
    work_dir: String,
}

fn default_max_concurrent() -> i64 {
    3
}

async fn create_workspace(
    State(state): State<AppState>,
    Json(body): Json<CreateWorkspaceRequest>,
) -> Result<Response, AppError> {
    let workspace = state
        .board
        .create_workspace(&body.name, &body.goal, &body.context, body.max_concurrent, &body.work_dir)
        .await?;
    Ok((StatusCode::CREATED, Json(workspace)).into_response())
}

async fn get_workspace(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response, AppError> {
    Ok(Json(state.board.get_workspace(id).await?).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct UpdateWorkspaceRequest {
    name: Option<String>,
    goal: Option<String>,
    context: Option<String>,
    max_concurrent: Option<i64>,
}

async fn update_workspace(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateWorkspaceRequest>,
) -> Result<Response, AppError> {
    let patch = WorkspacePatch {
        name: body.name,
        goal: body.goal,
        context: body.context,
        max_concurrent: body.max_concurrent,
        status: None,
    };
    Ok(Json(state.board.update_workspace(id, &patch).await?).into_response())
}

async fn delete_workspace(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response, AppError> {
    state.board.delete_workspace(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn pause_workspace(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response, AppError> {
    Ok(Json(state.board.pause_workspace(id).await?).into_response())
}

async fn resume_workspace(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response, AppError> {
    Ok(Json(state.board.resume_workspace(id).await?).into_response())
}

#[derive(Debug, Deserialize)]
struct ListTasksQuery {
    workspace_id: Option<Uuid>,
    status: Option<TaskStatus>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Response, AppError> {
    let statuses = query.status.map(|s| vec![s]);
    let tasks: Vec<Task> = state.board.list_tasks(query.workspace_id, statuses.as_deref()).await?;
    Ok(Json(tasks).into_response())
}

#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    workspace_id: Uuid,
    title: String,
    #[serde(default)]
    description: String,
    prompt: String,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    max_retries: i64,
    #[serde(default)]
    auto_ready: bool,
}

async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<Response, AppError> {
    let task = state
        .board
        .create_task(
            body.workspace_id,
            &body.title,
            &body.description,
            &body.prompt,
            body.priority,
            &body.depends_on,
            &body.tags,
            body.max_retries,
            body.auto_ready,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(task)).into_response())
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    Ok(Json(state.board.get_task(&id).await?).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct UpdateTaskRequest {
    title: Option<String>,
    description: Option<String>,
    prompt: Option<String>,
    priority: Option<i64>,
    tags: Option<Vec<String>>,
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Response, AppError> {
    let patch = TaskPatch {
        title: body.title,
        description: body.description,
        prompt: body.prompt,
        priority: body.priority,
        tags: body.tags,
    };
    Ok(Json(state.board.update_task(&id, &patch).await?).into_response())
}

async fn delete_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    state.board.delete_task(&id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn start_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    Ok(Json(state.board.start_task(&id).await?).into_response())
}

async fn cancel_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    Ok(Json(state.board.cancel_task(&id).await?).into_response())
}

async fn retry_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    Ok(Json(state.board.retry_task(&id).await?).into_response())
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    limit: Option<i64>,
}

async fn get_task_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Response, AppError> {
    let log = taskboard_db::queries::task_logs::get_task_log(state.board.pool(), &id, query.limit)
        .await
        .map_err(BoardError::from)?;
    Ok(Json(log).into_response())
}

// ---------------------------------------------------------------------------
// Plan handler
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApprovePlanRequest {
    plan: PlanResult,
    goal: String,
    work_dir: String,
    #[serde(default)]
    auto_start: bool,
}

#[derive(Debug, Serialize)]
struct ApprovePlanResponse {
    workspace_id: Uuid,
    tasks: Vec<Task>,
}

async fn approve_plan(
    State(state): State<AppState>,
    Json(body): Json<ApprovePlanRequest>,
) -> Result<Response, AppError> {
    let plan = body.plan;
    let (workspace_id, tasks) = taskboard_core::approve_and_create(
        state.board.pool(),
        state.board.bus(),
        state.scheduler.as_ref(),
        &plan,
        &body.goal,
        &body.work_dir,
        body.auto_start,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(ApprovePlanResponse { workspace_id, tasks })).into_response())
}

// ---------------------------------------------------------------------------
// SSE: watch_board
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WatchQuery {
    workspace_id: Option<Uuid>,
}

async fn watch_board(
    State(state): State<AppState>,
    Query(query): Query<WatchQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut subscription = state.board.bus().subscribe();
    let workspace_filter = query.workspace_id;

    let stream = async_stream::stream! {
        while let Some(event) = subscription.receiver.recv().await {
            if let Some(filter) = workspace_filter {
                if event.workspace_id != filter {
                    continue;
                }
            }
            yield Ok(sse_event(&event));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn sse_event(event: &BoardEvent) -> Event {
    Event::default()
        .event(format!("{:?}", event.kind))
        .json_data(event)
        .unwrap_or_else(|_| Event::default().data("serialization error"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use taskboard_core::bus::EventBus;
    use taskboard_core::handle::NoopSchedulerHandle;
    use tower::ServiceExt;

    async fn test_app() -> (Router, Arc<Board>, taskboard_test_utils::TestDb) {
        let db = taskboard_test_utils::TestDb::new().await;
        let board = Arc::new(Board::new(db.pool.clone(), EventBus::new()));
        let scheduler: Arc<dyn SchedulerHandle> = Arc::new(NoopSchedulerHandle);
        (build_router(Arc::clone(&board), scheduler), board, db)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn overview_returns_zero_counts_on_empty_store() {
        let (app, _board, _db) = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/api/overview").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["total"], 0);
    }

    #[tokio::test]
    async fn create_then_list_workspace_round_trips() {
        let (app, _board, _db) = test_app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/workspaces")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"name": "w", "goal": "ship it", "work_dir": "/work"}).to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(Request::builder().uri("/api/workspaces").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_unknown_task_returns_not_found() {
        let (app, _board, _db) = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/api/tasks/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn approve_plan_materializes_workspace() {
        let (app, _board, _db) = test_app().await;
        let body = serde_json::json!({
            "plan": {
                "workspace_name": "ws",
                "max_concurrent": 2,
                "tasks": [
                    {"title": "a", "description": "", "prompt": "do a", "priority": 1, "tags": [], "depends_on": []}
                ]
            },
            "goal": "ship it",
            "work_dir": "/work",
            "auto_start": false
        });
        let request = Request::builder()
            .method("POST")
            .uri("/api/plans/approve")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["tasks"].as_array().unwrap().len(), 1);
    }
}
