//! Task domain model.
//!
//! This module contains the value objects and the `Task` entity tracked by
//! the service, together with the pure id-assignment rule used by stores.

use std::num::NonZeroU64;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

// =============================================================================
// Value Objects - Newtypes
// =============================================================================

/// Error returned when an integer cannot be used as a task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TaskIdError {
    /// Task identifiers start at 1.
    #[error("task id must be a positive integer")]
    Zero,
}

/// Unique identifier for a task.
///
/// Identifiers are positive integers assigned by the store. Zero is rejected
/// wherever an id enters the system, including when a persisted file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct TaskId(NonZeroU64);

impl TaskId {
    /// The id given to the first task of an empty store.
    pub const FIRST: Self = Self(NonZeroU64::MIN);

    /// Returns the numeric value of the id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Returns the id directly following this one, or `None` on overflow.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }
}

impl TryFrom<u64> for TaskId {
    type Error = TaskIdError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        NonZeroU64::new(value).map(Self).ok_or(TaskIdError::Zero)
    }
}

impl From<TaskId> for u64 {
    fn from(id: TaskId) -> Self {
        id.get()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Error returned when a timestamp string is in none of the accepted formats.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid timestamp: {0:?}")]
pub struct TimestampParseError(String);

/// Naive layouts accepted when reading files produced by earlier writers.
/// Values without an offset are interpreted as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// A UTC timestamp.
///
/// Serialized as RFC 3339 keeping every sub-second digit the value carries,
/// so a persisted timestamp reads back to the identical instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a `Timestamp` from a `DateTime<Utc>`.
    #[must_use]
    pub const fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Returns the current time as a `Timestamp`.
    ///
    /// **Note**: This is an impure function (side effect: system clock).
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl FromStr for Timestamp {
    type Err = TimestampParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();

        if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
            return Ok(Self(datetime.with_timezone(&Utc)));
        }

        if let Ok(datetime) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
            return Ok(Self(datetime.with_timezone(&Utc)));
        }

        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .map(|naive| Self(naive.and_utc()))
            .ok_or_else(|| TimestampParseError(value.to_string()))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Task
// =============================================================================

/// A tracked task.
///
/// `created_at` and `updated_at` are optional because the persisted format
/// allows null timestamps. Tasks created through a store always carry both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned identifier.
    pub id: TaskId,
    /// Title of the task.
    pub title: String,
    /// Optional detailed description.
    #[serde(default)]
    pub description: Option<String>,
    /// Set once at creation.
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    /// Refreshed by every successful update.
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

impl Task {
    /// Creates a new task with both timestamps set to `timestamp`.
    ///
    /// This is a pure function. Obtain the id from [`next_task_id`] and the
    /// timestamp from [`Timestamp::now`].
    #[must_use]
    pub fn new(id: TaskId, title: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            created_at: Some(timestamp),
            updated_at: Some(timestamp),
        }
    }

    /// Returns a new task with the given title.
    #[must_use]
    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..self
        }
    }

    /// Returns a new task with the given description.
    #[must_use]
    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..self
        }
    }

    /// Returns a new task with the updated timestamp.
    #[must_use]
    pub fn with_updated_at(self, timestamp: Timestamp) -> Self {
        Self {
            updated_at: Some(timestamp),
            ..self
        }
    }

    /// Applies a partial update.
    ///
    /// Fields absent from `patch` keep their current value. `updated_at` is
    /// set to `timestamp` even when the patch is empty.
    #[must_use]
    pub fn apply(self, patch: TaskPatch, timestamp: Timestamp) -> Self {
        let task = match patch.title {
            Some(title) => self.with_title(title),
            None => self,
        };
        let task = match patch.description {
            Some(description) => task.with_description(description),
            None => task,
        };
        task.with_updated_at(timestamp)
    }
}

/// Validated input for creating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Title of the new task.
    pub title: String,
    /// Optional description of the new task.
    pub description: Option<String>,
}

impl NewTask {
    /// Creates a new task input without a description.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
        }
    }

    /// Returns the input with the given description.
    #[must_use]
    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..self
        }
    }

    /// Builds the task this input describes.
    #[must_use]
    pub fn into_task(self, id: TaskId, timestamp: Timestamp) -> Task {
        Task {
            description: self.description,
            ..Task::new(id, self.title, timestamp)
        }
    }
}

/// Partial update of a task. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    /// Replacement title.
    pub title: Option<String>,
    /// Replacement description.
    pub description: Option<String>,
}

// =============================================================================
// Id Assignment
// =============================================================================

/// Returns the id for the next task appended to `tasks`.
///
/// The result is the maximum existing id plus one, or [`TaskId::FIRST`] when
/// `tasks` is empty. Returns `None` when the maximum id is `u64::MAX`.
#[must_use]
pub fn next_task_id(tasks: &[Task]) -> Option<TaskId> {
    tasks
        .iter()
        .map(|task| task.id)
        .max()
        .map_or(Some(TaskId::FIRST), TaskId::next)
}

// =============================================================================
// Tests
// =============================================================================
