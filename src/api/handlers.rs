//! HTTP handlers for the Task Tracker API.
//!
//! Each handler validates its input, performs exactly one repository call,
//! and shapes the result into a response. Validation failures never reach
//! the repository.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
};

use super::dto::{
    CreateTaskRequest, TaskPath, TaskResponse, UpdateTaskRequest, validate_create_request,
    validate_update_request,
};
use super::error::ApiErrorResponse;
use crate::domain::TaskId;
use crate::infrastructure::TaskRepository;

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
///
/// Holds the repository as a trait object so the router does not depend on
/// the storage backend.
#[derive(Clone)]
pub struct AppState {
    /// Task repository for persistence.
    pub task_repository: Arc<dyn TaskRepository + Send + Sync>,
}

impl AppState {
    /// Creates a new `AppState` owning the given repository.
    #[must_use]
    pub fn new(repository: impl TaskRepository + 'static) -> Self {
        Self {
            task_repository: Arc::new(repository),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Extracts the task id from the path.
///
/// A malformed id is a validation error. Zero is well formed but can never
/// name a task, so it resolves to not found.
fn resolve_task_id(
    path: Result<Path<TaskPath>, PathRejection>,
) -> Result<TaskId, ApiErrorResponse> {
    let Path(TaskPath { id }) = path?;
    TaskId::try_from(id).map_err(|_| ApiErrorResponse::task_not_found())
}

// =============================================================================
// GET /tasks Handler
// =============================================================================

/// Lists every task in insertion order.
///
/// # Response
///
/// - **200 OK**: JSON array of tasks (possibly empty)
///
/// # Errors
///
/// Returns 500 if the repository fails.
pub async fn list_tasks(
    State(state): State<AppState>,
) -> Result<Json<Vec<TaskResponse>>, ApiErrorResponse> {
    let tasks = state.task_repository.list_all().await?;

    Ok(Json(tasks.iter().map(TaskResponse::from).collect()))
}

// =============================================================================
// POST /tasks Handler
// =============================================================================

/// Creates a new task.
///
/// # Request Body
///
/// ```json
/// {
///   "title": "Task title",
///   "description": "Optional description"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: Task created successfully
/// - **422 Unprocessable Entity**: Missing or blank title, or malformed body
/// - **500 Internal Server Error**: The task could not be persisted
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] for the failure statuses above.
pub async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiErrorResponse> {
    let Json(request) = payload?;
    let new_task = validate_create_request(request)?;

    let task = state.task_repository.create(new_task).await?;
    tracing::info!(task_id = %task.id, "Task created");

    Ok((StatusCode::CREATED, Json(TaskResponse::from(&task))))
}

// =============================================================================
// GET /tasks/{id} Handler
// =============================================================================

/// Returns a single task.
///
/// # Errors
///
/// - **404 Not Found**: No task with this id
/// - **422 Unprocessable Entity**: Malformed id
pub async fn get_task(
    State(state): State<AppState>,
    path: Result<Path<TaskPath>, PathRejection>,
) -> Result<Json<TaskResponse>, ApiErrorResponse> {
    let id = resolve_task_id(path)?;

    state
        .task_repository
        .find(id)
        .await?
        .map(|task| Json(TaskResponse::from(task)))
        .ok_or_else(ApiErrorResponse::task_not_found)
}

// =============================================================================
// PUT /tasks/{id} Handler
// =============================================================================

/// Partially updates a task.
///
/// Only fields present (and non-null) in the body are changed; `updated_at`
/// is refreshed on every successful call.
///
/// # Response
///
/// - **200 OK**: The updated task
/// - **404 Not Found**: No task with this id
/// - **422 Unprocessable Entity**: Malformed id or body, or blank title
/// - **500 Internal Server Error**: The change could not be persisted
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] for the failure statuses above.
pub async fn update_task(
    State(state): State<AppState>,
    path: Result<Path<TaskPath>, PathRejection>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<TaskResponse>, ApiErrorResponse> {
    let id = resolve_task_id(path)?;
    let Json(request) = payload?;
    let patch = validate_update_request(request)?;

    let task = state
        .task_repository
        .update(id, patch)
        .await?
        .ok_or_else(ApiErrorResponse::task_not_found)?;
    tracing::info!(task_id = %task.id, "Task updated");

    Ok(Json(TaskResponse::from(&task)))
}

// =============================================================================
// DELETE /tasks/{id} Handler
// =============================================================================

/// Deletes a task.
///
/// # Response
///
/// - **204 No Content**: Task deleted
/// - **404 Not Found**: No task with this id
/// - **422 Unprocessable Entity**: Malformed id
/// - **500 Internal Server Error**: The deletion could not be persisted
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] for the failure statuses above.
pub async fn delete_task(
    State(state): State<AppState>,
    path: Result<Path<TaskPath>, PathRejection>,
) -> Result<StatusCode, ApiErrorResponse> {
    let id = resolve_task_id(path)?;

    if state.task_repository.delete(id).await? {
        tracing::info!(task_id = %id, "Task deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiErrorResponse::task_not_found())
    }
}

// =============================================================================
// GET /health Handler
// =============================================================================

/// Health check response body.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Health check endpoint.
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// =============================================================================
// Tests
// =============================================================================
