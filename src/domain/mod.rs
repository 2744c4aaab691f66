//! Domain module for task tracking.
//!
//! This module contains the task entity, its value objects, and the
//! id-assignment rule.

pub mod task;

pub use task::{
    NewTask, Task, TaskId, TaskIdError, TaskPatch, Timestamp, TimestampParseError, next_task_id,
};
