//! Task and reminder records.
//!
//! Tasks are produced by parsing a model response and are only ever removed
//! by a clear-all. Each task owns an ordered list of reminders; a reminder has
//! no explicit status, whether it is pending or fired is derived from its fire
//! time and the wake-up registry.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};

pub const TASKS_SCHEMA_VERSION: &str = "nudge.tasks.v1";

/// Generate a fresh task or reminder identifier
pub fn new_id() -> String {
    Ulid::new().to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Lenient parse used for model output: unknown values become `Medium`
    pub fn from_model(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(Error::InvalidArgument(format!(
                "unknown priority '{other}', expected high, medium or low"
            ))),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory reminder kind; does not change behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderKind {
    Beforehand,
    #[default]
    Exact,
    Followup,
}

impl ReminderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderKind::Beforehand => "beforehand",
            ReminderKind::Exact => "exact",
            ReminderKind::Followup => "followup",
        }
    }

    /// Lenient parse used for model output: unknown values become `Exact`
    pub fn from_model(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "beforehand" | "before" => ReminderKind::Beforehand,
            "followup" | "follow-up" | "follow_up" => ReminderKind::Followup,
            _ => ReminderKind::Exact,
        }
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    /// Absolute fire time, second precision
    pub time: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub kind: ReminderKind,
}

impl Reminder {
    pub fn is_future(&self, now: DateTime<Utc>) -> bool {
        self.time > now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub original_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
}

impl Task {
    pub fn reminder(&self, reminder_id: &str) -> Option<&Reminder> {
        self.reminders.iter().find(|r| r.id == reminder_id)
    }

    /// A task is active while any reminder is still ahead of `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.reminders.iter().any(|r| r.is_future(now))
    }

    /// Earliest reminder still ahead of `now`
    pub fn next_reminder(&self, now: DateTime<Utc>) -> Option<&Reminder> {
        self.reminders
            .iter()
            .filter(|r| r.is_future(now))
            .min_by_key(|r| r.time)
    }

    pub fn future_reminders(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Reminder> {
        self.reminders.iter().filter(move |r| r.is_future(now))
    }
}

/// Persisted form of the whole task list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub schema_version: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl TaskSnapshot {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            schema_version: TASKS_SCHEMA_VERSION.to_string(),
            tasks,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

/// In-memory task list owned by the reminder service
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
}

impl TaskStore {
    pub fn from_vec(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn extend(&mut self, tasks: impl IntoIterator<Item = Task>) {
        self.tasks.extend(tasks);
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    pub fn find(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Look up a (task, reminder) pair
    pub fn lookup(&self, task_id: &str, reminder_id: &str) -> Option<(&Task, &Reminder)> {
        let task = self.find(task_id)?;
        let reminder = task.reminder(reminder_id)?;
        Some((task, reminder))
    }

    /// Snapshot of tasks with at least one future reminder
    pub fn active(&self, now: DateTime<Utc>) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|t| t.is_active(now))
            .cloned()
            .collect()
    }

    pub fn to_vec(&self) -> Vec<Task> {
        self.tasks.clone()
    }
}
