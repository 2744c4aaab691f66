//! Infrastructure module for persistence.
//!
//! This module contains the repository trait and its JSON file backend.

pub mod json_file;
pub mod repository;

pub use json_file::{DEFAULT_TASKS_FILE, JsonFileTaskRepository};
pub use repository::{RepositoryError, TaskRepository};
