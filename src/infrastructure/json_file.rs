//! JSON file repository implementation.
//!
//! Tasks live in memory behind a `tokio::sync::RwLock` and the whole
//! collection is rewritten to a single JSON file after every mutation.
//!
//! # Write protocol
//!
//! A mutation takes the write lock, builds a staged copy of the collection,
//! writes the staged copy to disk, and only then swaps it into memory. When
//! the write fails the in-memory collection is left untouched, so memory
//! never runs ahead of the file.
//!
//! Once the lock is held, the write and the swap run on a spawned task that
//! owns the lock guard. Dropping the caller's future (a client hanging up
//! mid-request) therefore cannot leave the file updated and memory stale.
//!
//! The file is replaced atomically: the payload goes to a temporary file in
//! the same directory, is fsynced, and is renamed over the target. The
//! directory is fsynced afterwards so the rename itself is durable. An
//! interrupted write leaves the previous file intact.

use std::collections::HashSet;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::sync::RwLock;

use crate::domain::{NewTask, Task, TaskId, TaskPatch, Timestamp, next_task_id};
use crate::infrastructure::{RepositoryError, TaskRepository};

/// Persistence target used when none is configured.
pub const DEFAULT_TASKS_FILE: &str = "tasks.json";

// =============================================================================
// JSON File Task Repository
// =============================================================================

/// File-backed implementation of `TaskRepository`.
///
/// # Example
///
/// ```ignore
/// let repository = JsonFileTaskRepository::open("tasks.json").await?;
/// let task = repository.create(NewTask::new("Write docs")).await?;
/// assert_eq!(task.id, TaskId::FIRST);
/// ```
#[derive(Debug)]
pub struct JsonFileTaskRepository {
    path: PathBuf,
    tasks: Arc<RwLock<Vec<Task>>>,
}

/// Result of staging a mutation against the current collection.
enum Staged<T> {
    /// Nothing to write.
    Unchanged(T),
    /// The collection to persist and swap in.
    Replace(Vec<Task>, T),
}

impl JsonFileTaskRepository {
    /// Opens the store, loading every task from `path`.
    ///
    /// A missing file or one that does not hold a valid array of tasks
    /// yields an empty store; both cases are logged as warnings.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Storage` when the file exists but cannot be
    /// read (permission denied, path is a directory, ...).
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        let tasks = load_tasks(&path).await?;

        tracing::info!(path = %path.display(), count = tasks.len(), "Task store loaded");

        Ok(Self {
            path,
            tasks: Arc::new(RwLock::new(tasks)),
        })
    }

    /// Returns the persistence target.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stages a mutation under the write lock, then persists and swaps it in.
    ///
    /// The guard moves into a spawned task before anything touches the disk,
    /// so the write and the swap complete together even if this future is
    /// dropped.
    async fn commit<T, F>(&self, stage: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&[Task]) -> Result<Staged<T>, RepositoryError> + Send + 'static,
    {
        let mut tasks = Arc::clone(&self.tasks).write_owned().await;
        let path = self.path.clone();

        tokio::spawn(async move {
            match stage(tasks.as_slice())? {
                Staged::Unchanged(outcome) => Ok(outcome),
                Staged::Replace(staged, outcome) => {
                    persist(path, &staged).await?;
                    *tasks = staged;
                    Ok(outcome)
                }
            }
        })
        .await
        .map_err(|error| RepositoryError::Persistence(error.to_string()))?
    }
}

#[async_trait]
impl TaskRepository for JsonFileTaskRepository {
    async fn list_all(&self) -> Result<Vec<Task>, RepositoryError> {
        Ok(self.tasks.read().await.clone())
    }

    async fn find(&self, id: TaskId) -> Result<Option<Task>, RepositoryError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().find(|task| task.id == id).cloned())
    }

    async fn create(&self, new_task: NewTask) -> Result<Task, RepositoryError> {
        let task = self
            .commit(move |tasks| {
                let id = next_task_id(tasks).ok_or(RepositoryError::IdSpaceExhausted)?;
                let task = new_task.into_task(id, Timestamp::now());

                let mut staged = tasks.to_vec();
                staged.push(task.clone());
                Ok(Staged::Replace(staged, task))
            })
            .await?;

        tracing::debug!(task_id = %task.id, "Task created");
        Ok(task)
    }

    async fn update(
        &self,
        id: TaskId,
        patch: TaskPatch,
    ) -> Result<Option<Task>, RepositoryError> {
        let updated = self
            .commit(move |tasks| {
                let Some(index) = tasks.iter().position(|task| task.id == id) else {
                    return Ok(Staged::Unchanged(None));
                };

                // updated_at never moves backwards, even if the wall clock does.
                let now = Timestamp::now();
                let now = tasks[index]
                    .updated_at
                    .map_or(now, |previous| previous.max(now));
                let updated = tasks[index].clone().apply(patch, now);

                let mut staged = tasks.to_vec();
                staged[index] = updated.clone();
                Ok(Staged::Replace(staged, Some(updated)))
            })
            .await?;

        if updated.is_some() {
            tracing::debug!(task_id = %id, "Task updated");
        }
        Ok(updated)
    }

    async fn delete(&self, id: TaskId) -> Result<bool, RepositoryError> {
        let deleted = self
            .commit(move |tasks| {
                let Some(index) = tasks.iter().position(|task| task.id == id) else {
                    return Ok(Staged::Unchanged(false));
                };

                let mut staged = tasks.to_vec();
                staged.remove(index);
                Ok(Staged::Replace(staged, true))
            })
            .await?;

        if deleted {
            tracing::debug!(task_id = %id, "Task deleted");
        }
        Ok(deleted)
    }
}

// =============================================================================
// File Helpers
// =============================================================================

/// Reads the persisted collection, treating a missing or corrupt file as empty.
async fn load_tasks(path: &Path) -> Result<Vec<Task>, RepositoryError> {
    let contents = match tokio::fs::read(path).await {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(
                path = %path.display(),
                "Task file not found, starting with an empty store"
            );
            return Ok(Vec::new());
        }
        Err(error) => {
            return Err(RepositoryError::Storage(format!(
                "{}: {error}",
                path.display()
            )));
        }
    };

    match parse_tasks(&contents) {
        Ok(tasks) => Ok(tasks),
        Err(reason) => {
            tracing::warn!(
                path = %path.display(),
                %reason,
                "Task file is corrupt, starting with an empty store"
            );
            Ok(Vec::new())
        }
    }
}

/// Parses a persisted collection. Duplicate ids make the whole file invalid.
fn parse_tasks(contents: &[u8]) -> Result<Vec<Task>, String> {
    let tasks: Vec<Task> = serde_json::from_slice(contents).map_err(|error| error.to_string())?;

    let mut seen = HashSet::with_capacity(tasks.len());
    if let Some(duplicate) = tasks.iter().find(|task| !seen.insert(task.id)) {
        return Err(format!("duplicate task id {}", duplicate.id));
    }

    Ok(tasks)
}

/// Writes `tasks` to `path`, replacing its contents.
async fn persist(path: PathBuf, tasks: &[Task]) -> Result<(), RepositoryError> {
    let payload = serde_json::to_vec_pretty(tasks)
        .map_err(|error| RepositoryError::Serialization(error.to_string()))?;

    let target = path.clone();
    tokio::task::spawn_blocking(move || write_atomically(&target, &payload))
        .await
        .map_err(|error| RepositoryError::Persistence(error.to_string()))?
        .map_err(|error| RepositoryError::Persistence(format!("{}: {error}", path.display())))?;

    tracing::debug!(path = %path.display(), count = tasks.len(), "Task file written");
    Ok(())
}

/// Replaces the file at `path` with `payload` and makes the rename durable.
fn write_atomically(path: &Path, payload: &[u8]) -> io::Result<()> {
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    replace_file(path, directory, payload)?;
    sync_directory(directory)
}

/// Stages `payload` in a temporary file under `staging` and renames it over
/// `path`. The target is untouched unless the rename happens.
///
/// The permissions of an existing target are carried over to the new file.
fn replace_file(path: &Path, staging: &Path, payload: &[u8]) -> io::Result<()> {
    let mut file = NamedTempFile::new_in(staging)?;
    if let Ok(metadata) = std::fs::metadata(path) {
        file.as_file().set_permissions(metadata.permissions())?;
    }

    file.write_all(payload)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;

    Ok(())
}

#[cfg(unix)]
fn sync_directory(directory: &Path) -> io::Result<()> {
    std::fs::File::open(directory)?.sync_all()
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
const fn sync_directory(_directory: &Path) -> io::Result<()> {
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn task_id(value: u64) -> TaskId {
        TaskId::try_from(value).unwrap()
    }

    async fn open_in(directory: &TempDir) -> JsonFileTaskRepository {
        JsonFileTaskRepository::open(directory.path().join("tasks.json"))
            .await
            .unwrap()
    }

    fn read_file(path: &Path) -> serde_json::Value {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    async fn assert_memory_matches_file(repository: &JsonFileTaskRepository) {
        let in_memory = repository.list_all().await.unwrap();
        let reopened = JsonFileTaskRepository::open(repository.path())
            .await
            .unwrap();

        assert_eq!(in_memory, reopened.list_all().await.unwrap());
    }

    // -------------------------------------------------------------------------
    // Open Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let directory = tempfile::tempdir().unwrap();
        let repository = open_in(&directory).await;

        assert!(repository.list_all().await.unwrap().is_empty());
        assert!(!repository.path().exists(), "open must not create the file");
    }

    #[rstest]
    #[case::not_json("this is not json")]
    #[case::empty_file("")]
    #[case::object_instead_of_array(r#"{"id": 1, "title": "x"}"#)]
    #[case::missing_title(r#"[{"id": 1}]"#)]
    #[case::zero_id(r#"[{"id": 0, "title": "x"}]"#)]
    #[case::duplicate_ids(r#"[{"id": 1, "title": "a"}, {"id": 1, "title": "b"}]"#)]
    #[tokio::test]
    async fn test_open_corrupt_file_is_empty(#[case] contents: &str) {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("tasks.json");
        std::fs::write(&path, contents).unwrap();

        let repository = JsonFileTaskRepository::open(&path).await.unwrap();

        assert!(repository.list_all().await.unwrap().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_open_unreadable_target_fails() {
        let directory = tempfile::tempdir().unwrap();

        let result = JsonFileTaskRepository::open(directory.path()).await;

        assert!(matches!(result, Err(RepositoryError::Storage(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn test_open_reads_legacy_timestamps() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("tasks.json");
        std::fs::write(
            &path,
            r#"[
  {
    "id": 2,
    "title": "Écrire le rapport",
    "description": null,
    "created_at": "2024-03-01 09:15:00.123456",
    "updated_at": "2024-03-02 10:00:00.654321"
  },
  {"id": 7, "title": "No timestamps", "description": "old", "created_at": null, "updated_at": null}
]"#,
        )
        .unwrap();

        let repository = JsonFileTaskRepository::open(&path).await.unwrap();
        let tasks = repository.list_all().await.unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "Écrire le rapport");
        assert!(tasks[0].created_at.is_some());
        assert!(tasks[1].updated_at.is_none());

        let created = repository.create(NewTask::new("next")).await.unwrap();
        assert_eq!(created.id, task_id(8));
    }

    // -------------------------------------------------------------------------
    // Create Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let directory = tempfile::tempdir().unwrap();
        let repository = open_in(&directory).await;

        for expected in 1..=3 {
            let task = repository
                .create(NewTask::new(format!("Task {expected}")))
                .await
                .unwrap();
            assert_eq!(task.id, task_id(expected));
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_create_sets_fields_and_persists() {
        let directory = tempfile::tempdir().unwrap();
        let repository = open_in(&directory).await;

        let task = repository
            .create(NewTask::new("T").with_description("D"))
            .await
            .unwrap();

        let tasks = repository.list_all().await.unwrap();
        assert_eq!(tasks, vec![task.clone()]);
        assert_eq!(task.title, "T");
        assert_eq!(task.description.as_deref(), Some("D"));
        assert!(task.created_at.is_some());
        assert_eq!(task.created_at, task.updated_at);

        let persisted = read_file(repository.path());
        assert_eq!(persisted.as_array().unwrap().len(), 1);
        assert_eq!(persisted[0]["id"], 1);
        assert_eq!(persisted[0]["title"], "T");
    }

    #[rstest]
    #[tokio::test]
    async fn test_create_after_deleting_max_reuses_next_id() {
        let directory = tempfile::tempdir().unwrap();
        let repository = open_in(&directory).await;

        repository.create(NewTask::new("one")).await.unwrap();
        repository.create(NewTask::new("two")).await.unwrap();
        repository.create(NewTask::new("three")).await.unwrap();

        assert!(repository.delete(task_id(2)).await.unwrap());
        let task = repository.create(NewTask::new("four")).await.unwrap();
        assert_eq!(task.id, task_id(4), "gaps are never filled");

        assert!(repository.delete(task_id(4)).await.unwrap());
        let task = repository.create(NewTask::new("five")).await.unwrap();
        assert_eq!(task.id, task_id(4), "id follows the current maximum");
    }

    #[rstest]
    #[tokio::test]
    async fn test_concurrent_creates_get_unique_ids() {
        let directory = tempfile::tempdir().unwrap();
        let repository = Arc::new(open_in(&directory).await);

        let handles: Vec<_> = (0..16)
            .map(|index| {
                let repository = Arc::clone(&repository);
                tokio::spawn(async move {
                    repository
                        .create(NewTask::new(format!("Task {index}")))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().id.get());
        }
        ids.sort_unstable();

        assert_eq!(ids, (1..=16).collect::<Vec<_>>());
        assert_eq!(read_file(repository.path()).as_array().unwrap().len(), 16);
    }

    #[rstest]
    #[tokio::test]
    async fn test_file_is_pretty_printed_utf8() {
        let directory = tempfile::tempdir().unwrap();
        let repository = open_in(&directory).await;

        repository.create(NewTask::new("Café ✓")).await.unwrap();

        let contents = std::fs::read_to_string(repository.path()).unwrap();
        assert!(contents.contains("Café ✓"));
        assert!(contents.starts_with("[\n  {"));
    }

    // -------------------------------------------------------------------------
    // Update Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_update_title_only() {
        let directory = tempfile::tempdir().unwrap();
        let repository = open_in(&directory).await;
        let original = repository
            .create(NewTask::new("Old").with_description("Keep me"))
            .await
            .unwrap();

        let patch = TaskPatch {
            title: Some("New".to_string()),
            description: None,
        };
        let updated = repository
            .update(original.id, patch)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, "New");
        assert_eq!(updated.description.as_deref(), Some("Keep me"));
        assert_eq!(updated.created_at, original.created_at);
        assert!(updated.updated_at >= original.updated_at);
        assert_eq!(repository.list_all().await.unwrap(), vec![updated.clone()]);
        assert_eq!(read_file(repository.path())[0]["title"], "New");
    }

    #[rstest]
    #[tokio::test]
    async fn test_update_missing_task_changes_nothing() {
        let directory = tempfile::tempdir().unwrap();
        let repository = open_in(&directory).await;
        repository.create(NewTask::new("Only")).await.unwrap();
        let before = repository.list_all().await.unwrap();

        let patch = TaskPatch {
            title: Some("Ghost".to_string()),
            description: None,
        };
        let result = repository.update(task_id(42), patch).await.unwrap();

        assert!(result.is_none());
        assert_eq!(repository.list_all().await.unwrap(), before);
    }

    // -------------------------------------------------------------------------
    // Delete Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_delete_removes_exactly_one_task() {
        let directory = tempfile::tempdir().unwrap();
        let repository = open_in(&directory).await;
        for title in ["a", "b", "c"] {
            repository.create(NewTask::new(title)).await.unwrap();
        }

        assert!(repository.delete(task_id(2)).await.unwrap());

        let remaining: Vec<u64> = repository
            .list_all()
            .await
            .unwrap()
            .iter()
            .map(|task| task.id.get())
            .collect();
        assert_eq!(remaining, vec![1, 3]);
        assert!(!repository.delete(task_id(2)).await.unwrap());
    }

    #[rstest]
    #[tokio::test]
    async fn test_delete_missing_task_does_not_write() {
        let directory = tempfile::tempdir().unwrap();
        let repository = open_in(&directory).await;

        assert!(!repository.delete(task_id(999)).await.unwrap());
        assert!(!repository.path().exists());
    }

    // -------------------------------------------------------------------------
    // Persistence Failure Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_failed_write_rolls_back_create() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("missing").join("tasks.json");
        let repository = JsonFileTaskRepository::open(&path).await.unwrap();

        let result = repository.create(NewTask::new("Lost")).await;

        assert!(matches!(result, Err(RepositoryError::Persistence(_))));
        assert!(repository.list_all().await.unwrap().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_failed_write_rolls_back_update_and_delete() {
        let directory = tempfile::tempdir().unwrap();
        let nested = directory.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        let repository = JsonFileTaskRepository::open(nested.join("tasks.json"))
            .await
            .unwrap();
        let task = repository.create(NewTask::new("Stable")).await.unwrap();

        std::fs::remove_dir_all(&nested).unwrap();

        let patch = TaskPatch {
            title: Some("Changed".to_string()),
            description: None,
        };
        let update = repository.update(task.id, patch).await;
        assert!(matches!(update, Err(RepositoryError::Persistence(_))));

        let delete = repository.delete(task.id).await;
        assert!(matches!(delete, Err(RepositoryError::Persistence(_))));

        assert_eq!(repository.list_all().await.unwrap(), vec![task]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_cancelled_mutations_keep_memory_and_file_in_sync() {
        let directory = tempfile::tempdir().unwrap();
        let repository = open_in(&directory).await;
        repository.create(NewTask::new("keep")).await.unwrap();
        repository.create(NewTask::new("doomed")).await.unwrap();

        let _ = timeout(Duration::ZERO, repository.create(NewTask::new("ghost"))).await;
        assert_memory_matches_file(&repository).await;

        let patch = TaskPatch {
            title: Some("renamed".to_string()),
            description: None,
        };
        let _ = timeout(Duration::ZERO, repository.update(task_id(1), patch)).await;
        assert_memory_matches_file(&repository).await;

        let _ = timeout(Duration::ZERO, repository.delete(task_id(2))).await;
        assert_memory_matches_file(&repository).await;

        let next = repository.create(NewTask::new("after")).await.unwrap();
        let reopened = JsonFileTaskRepository::open(repository.path())
            .await
            .unwrap();
        assert_eq!(reopened.find(next.id).await.unwrap(), Some(next));
        assert_eq!(
            reopened.list_all().await.unwrap(),
            repository.list_all().await.unwrap()
        );
    }

    // -------------------------------------------------------------------------
    // File Replacement Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_write_atomically_replaces_contents_without_leftovers() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("tasks.json");
        std::fs::write(&path, "[]").unwrap();

        write_atomically(&path, b"[{\"id\": 1, \"title\": \"x\"}]").unwrap();

        assert_eq!(read_file(&path)[0]["title"], "x");
        let entries = std::fs::read_dir(directory.path()).unwrap().count();
        assert_eq!(entries, 1, "temporary file must not be left behind");
    }

    #[rstest]
    fn test_failed_replacement_keeps_previous_file() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("tasks.json");
        std::fs::write(&path, r#"[{"id": 1, "title": "old"}]"#).unwrap();

        let result = replace_file(&path, &directory.path().join("gone"), b"[]");

        assert!(result.is_err());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r#"[{"id": 1, "title": "old"}]"#
        );
    }

    // -------------------------------------------------------------------------
    // Round-trip Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_reopen_reproduces_collection() {
        let directory = tempfile::tempdir().unwrap();
        let repository = open_in(&directory).await;

        repository
            .create(NewTask::new("first").with_description("one"))
            .await
            .unwrap();
        repository.create(NewTask::new("second")).await.unwrap();
        repository.create(NewTask::new("third")).await.unwrap();
        let patch = TaskPatch {
            title: None,
            description: Some("added later".to_string()),
        };
        repository.update(task_id(2), patch).await.unwrap();
        repository.delete(task_id(1)).await.unwrap();

        let before = repository.list_all().await.unwrap();
        drop(repository);

        let reopened = open_in(&directory).await;
        assert_eq!(reopened.list_all().await.unwrap(), before);
    }
}
