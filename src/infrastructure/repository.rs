//! Repository trait for the task collection.
//!
//! The trait is object safe so the HTTP layer can hold any backend behind
//! `Arc<dyn TaskRepository>`.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{NewTask, Task, TaskId, TaskPatch};

// =============================================================================
// Repository Error
// =============================================================================

/// Errors that can occur during repository operations.
///
/// A missing task is not an error: lookups return `Option` and deletes
/// return `bool`.
#[derive(Debug, Error, Clone)]
pub enum RepositoryError {
    /// The backing storage could not be read at startup.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Writing the collection to its persistence target failed.
    /// The mutation that triggered the write was not applied.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Every task id up to `u64::MAX` is taken.
    #[error("Task id space exhausted")]
    IdSpaceExhausted,
}

// =============================================================================
// Task Repository
// =============================================================================

/// Repository for `Task` entities.
///
/// Mutations are atomic from the caller's point of view: either the change
/// is visible in memory and persisted, or an error is returned and nothing
/// changed.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Returns every task in insertion order.
    async fn list_all(&self) -> Result<Vec<Task>, RepositoryError>;

    /// Finds a task by its ID.
    async fn find(&self, id: TaskId) -> Result<Option<Task>, RepositoryError>;

    /// Creates a task with a freshly assigned id and returns it.
    async fn create(&self, new_task: NewTask) -> Result<Task, RepositoryError>;

    /// Applies `patch` to the task with the given id.
    ///
    /// Returns `Ok(None)` without writing anything if no such task exists.
    async fn update(
        &self,
        id: TaskId,
        patch: TaskPatch,
    ) -> Result<Option<Task>, RepositoryError>;

    /// Deletes a task by its ID.
    ///
    /// Returns `Ok(true)` if the task was deleted, `Ok(false)` if it didn't exist.
    async fn delete(&self, id: TaskId) -> Result<bool, RepositoryError>;
}

// =============================================================================
// Tests
// =============================================================================
