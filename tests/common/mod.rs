//! Common test helpers for integration tests.
//!
//! # Note
//!
//! The `#![allow(dead_code)]` attribute is necessary because Rust compiles each
//! integration test file as a separate crate, and not every file uses every
//! helper.

#![allow(dead_code)]

use std::path::Path;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use task_tracker::api::{AppState, create_router};
use task_tracker::domain::{NewTask, Task, TaskId, TaskPatch};
use task_tracker::infrastructure::{JsonFileTaskRepository, RepositoryError, TaskRepository};

// =============================================================================
// Router Creation Helpers
// =============================================================================

/// Creates a router backed by a JSON file repository at `path`.
pub async fn create_test_app(path: &Path) -> Router {
    let repository = JsonFileTaskRepository::open(path)
        .await
        .expect("Failed to open task store");
    create_router(AppState::new(repository))
}

/// Creates a router whose repository fails every operation.
pub fn create_failing_app() -> Router {
    create_router(AppState::new(FailingTaskRepository))
}

// =============================================================================
// Request Helpers
// =============================================================================

/// Sends a request and returns the status and the JSON body.
///
/// An empty body is returned as `Value::Null`.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("Failed to build request");

    send_request(app, request).await
}

/// Sends a prepared request and returns the status and the JSON body.
pub async fn send_request(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("Router should not fail");

    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();

    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Response body is not JSON")
    };

    (status, json)
}

// =============================================================================
// Test Doubles
// =============================================================================

/// Repository whose every operation fails as if the disk were gone.
pub struct FailingTaskRepository;

fn disk_failure() -> RepositoryError {
    RepositoryError::Persistence("No space left on device".to_string())
}

#[async_trait]
impl TaskRepository for FailingTaskRepository {
    async fn list_all(&self) -> Result<Vec<Task>, RepositoryError> {
        Err(disk_failure())
    }

    async fn find(&self, _id: TaskId) -> Result<Option<Task>, RepositoryError> {
        Err(disk_failure())
    }

    async fn create(&self, _new_task: NewTask) -> Result<Task, RepositoryError> {
        Err(disk_failure())
    }

    async fn update(
        &self,
        _id: TaskId,
        _patch: TaskPatch,
    ) -> Result<Option<Task>, RepositoryError> {
        Err(disk_failure())
    }

    async fn delete(&self, _id: TaskId) -> Result<bool, RepositoryError> {
        Err(disk_failure())
    }
}
