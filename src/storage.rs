//! Storage layer for nudge
//!
//! All state lives in one data directory:
//!
//! ```text
//! <data_dir>/
//!   reminder_tasks.json    # The task slot (TaskSnapshot, pretty JSON)
//!   reminder_tasks.lock    # fs2 lock guarding slot read-modify-write
//!   daemon.lock            # Held by the running daemon
//!   nudge.sock             # Control socket (unless overridden in config)
//! ```
//!
//! The task list is a single named slot: read once at startup, rewritten
//! after every mutation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};
use crate::lock::{self, FileLock, DEFAULT_LOCK_TIMEOUT_MS};
use crate::task::{Task, TaskSnapshot, TASKS_SCHEMA_VERSION};

/// Name of the slot holding the serialized task list
pub const TASK_SLOT: &str = "reminder_tasks";

/// Persistence for the task list
pub trait TaskSlot: Send + Sync {
    /// Load the persisted list; a slot that was never written is empty
    fn load(&self) -> Result<Vec<Task>>;

    /// Replace the persisted list
    fn save(&self, tasks: &[Task]) -> Result<()>;
}

/// Path layout for a nudge data directory
#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
}

impl Storage {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path to a named slot file
    pub fn slot_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{name}.json"))
    }

    /// Path to the lock guarding a named slot
    pub fn slot_lock_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{name}.lock"))
    }

    /// Path to the single-instance daemon lock
    pub fn daemon_lock_file(&self) -> PathBuf {
        self.data_dir.join("daemon.lock")
    }

    /// Default control socket path
    pub fn socket_file(&self) -> PathBuf {
        self.data_dir.join("nudge.sock")
    }

    // =========================================================================
    // Initialization and JSON helpers
    // =========================================================================

    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Write JSON atomically (temp file + rename)
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        lock::write_atomic(path, json.as_bytes())
    }

    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// File-backed slot for the task list
    pub fn task_slot(&self) -> FileSlot {
        FileSlot::new(self.clone(), TASK_SLOT)
    }
}

/// Task slot backed by one JSON file
#[derive(Debug, Clone)]
pub struct FileSlot {
    storage: Storage,
    name: String,
}

impl FileSlot {
    pub fn new(storage: Storage, name: impl Into<String>) -> Self {
        Self {
            storage,
            name: name.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.storage.slot_file(&self.name)
    }

    fn lock(&self) -> Result<FileLock> {
        FileLock::acquire(self.storage.slot_lock_file(&self.name), DEFAULT_LOCK_TIMEOUT_MS)
    }
}

fn persistence(context: &str, path: &Path, err: Error) -> Error {
    Error::Persistence(format!("{context} {}: {err}", path.display()))
}

impl TaskSlot for FileSlot {
    fn load(&self) -> Result<Vec<Task>> {
        let path = self.path();
        let _lock = self
            .lock()
            .map_err(|err| persistence("failed to lock", &path, err))?;

        if !path.exists() {
            return Ok(Vec::new());
        }

        let snapshot: TaskSnapshot = self
            .storage
            .read_json(&path)
            .map_err(|err| persistence("failed to read", &path, err))?;
        if snapshot.schema_version != TASKS_SCHEMA_VERSION {
            tracing::warn!(
                path = %path.display(),
                found = %snapshot.schema_version,
                expected = TASKS_SCHEMA_VERSION,
                "task slot schema mismatch, loading anyway"
            );
        }
        Ok(snapshot.tasks)
    }

    fn save(&self, tasks: &[Task]) -> Result<()> {
        let path = self.path();
        let _lock = self
            .lock()
            .map_err(|err| persistence("failed to lock", &path, err))?;

        self.storage
            .write_json(&path, &TaskSnapshot::new(tasks.to_vec()))
            .map_err(|err| persistence("failed to write", &path, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{new_id, Priority, Reminder, ReminderKind};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sample_task() -> Task {
        Task {
            id: new_id(),
            title: "Submit report".to_string(),
            description: "Quarterly numbers".to_string(),
            original_text: "report due friday".to_string(),
            context: Some("work".to_string()),
            priority: Priority::High,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            reminders: vec![Reminder {
                id: new_id(),
                time: Utc.with_ymd_and_hms(2024, 1, 4, 17, 0, 0).unwrap(),
                message: "Report due tomorrow".to_string(),
                kind: ReminderKind::Beforehand,
            }],
        }
    }

    #[test]
    fn test_storage_paths() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path().to_path_buf());

        assert_eq!(
            storage.slot_file(TASK_SLOT),
            temp.path().join("reminder_tasks.json")
        );
        assert_eq!(
            storage.slot_lock_file(TASK_SLOT),
            temp.path().join("reminder_tasks.lock")
        );
        assert_eq!(storage.socket_file(), temp.path().join("nudge.sock"));
        assert_eq!(storage.daemon_lock_file(), temp.path().join("daemon.lock"));
    }

    #[test]
    fn test_missing_slot_loads_empty() {
        let temp = TempDir::new().unwrap();
        let slot = Storage::new(temp.path().to_path_buf()).task_slot();
        assert!(slot.load().unwrap().is_empty());
    }

    #[test]
    fn test_slot_round_trip() {
        let temp = TempDir::new().unwrap();
        let slot = Storage::new(temp.path().join("data")).task_slot();

        let tasks = vec![sample_task(), sample_task()];
        slot.save(&tasks).unwrap();
        let loaded = slot.load().unwrap();

        assert_eq!(loaded, tasks);
    }

    #[test]
    fn test_corrupt_slot_is_persistence_error() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path().to_path_buf());
        fs::write(storage.slot_file(TASK_SLOT), "{ not json").unwrap();

        let err = storage.task_slot().load().unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }
}
