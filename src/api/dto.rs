//! Data Transfer Objects for API requests and responses.
//!
//! This module contains DTOs that are separate from domain models,
//! providing a clean API contract, and the request validation rules.

use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use crate::domain::{NewTask, Task, TaskPatch};

// =============================================================================
// Task DTOs
// =============================================================================

/// Request DTO for creating a new task.
///
/// `title` is optional at the serde level so a missing title is reported as
/// a field error instead of a generic body rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTaskRequest {
    /// Title of the task.
    #[serde(default)]
    pub title: Option<String>,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Request DTO for updating a task. Absent or null fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskRequest {
    /// New title for the task.
    #[serde(default)]
    pub title: Option<String>,
    /// New description for the task.
    #[serde(default)]
    pub description: Option<String>,
}

/// Path parameter for task ID.
#[derive(Debug, Deserialize)]
pub struct TaskPath {
    /// The task ID.
    pub id: u64,
}

/// Response DTO for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResponse {
    /// Task ID.
    pub id: u64,
    /// Title of the task.
    pub title: String,
    /// Description of the task.
    pub description: Option<String>,
    /// Creation timestamp (RFC 3339).
    pub created_at: Option<String>,
    /// Last update timestamp (RFC 3339).
    pub updated_at: Option<String>,
}

impl From<&Task> for TaskResponse {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.get(),
            title: task.title.clone(),
            description: task.description.clone(),
            created_at: task.created_at.map(|timestamp| timestamp.to_string()),
            updated_at: task.updated_at.map(|timestamp| timestamp.to_string()),
        }
    }
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self::from(&task)
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Validates a task title.
///
/// # Validation Rules
///
/// - Title must be present
/// - Title must not be blank (whitespace only)
///
/// The title is returned exactly as sent.
///
/// # Errors
///
/// Returns a `ValidationError` for the `title` field when a rule is violated.
pub fn validate_title(title: Option<String>) -> Result<String, ValidationError> {
    match title {
        None => Err(ValidationError::single("title", "Title is required")),
        Some(title) if title.trim().is_empty() => Err(ValidationError::single(
            "title",
            "Title must not be empty",
        )),
        Some(title) => Ok(title),
    }
}

/// Validates a create request and converts it to domain input.
///
/// # Errors
///
/// Returns a `ValidationError` if the title is missing or blank.
pub fn validate_create_request(request: CreateTaskRequest) -> Result<NewTask, ValidationError> {
    let title = validate_title(request.title)?;

    Ok(NewTask {
        title,
        description: request.description,
    })
}

/// Validates an update request and converts it to a domain patch.
///
/// # Errors
///
/// Returns a `ValidationError` if a title is supplied but blank.
pub fn validate_update_request(request: UpdateTaskRequest) -> Result<TaskPatch, ValidationError> {
    let title = request
        .title
        .map(|title| validate_title(Some(title)))
        .transpose()?;

    Ok(TaskPatch {
        title,
        description: request.description,
    })
}

// =============================================================================
// Tests
// =============================================================================
