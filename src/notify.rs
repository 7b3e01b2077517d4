//! Platform notifications.
//!
//! The service hands every fired reminder to a `Notifier`. Two sinks are
//! provided: a terminal line on stderr and JSON lines to stdout or a file for
//! external integrations (desktop notifiers, status bars).

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use crossterm::style::Stylize;
use serde::Serialize;

use crate::config::{NotifyConfig, NotifySink};
use crate::error::{Error, Result};

pub const NOTIFICATION_SCHEMA_VERSION: &str = "nudge.notification.v1";

/// What the platform is asked to display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    /// 2 for high-priority tasks, 1 otherwise
    pub priority_hint: u8,
    pub require_interaction: bool,
}

pub trait Notifier: Send + Sync {
    fn show(&self, id: &str, notification: &Notification) -> Result<()>;
}

/// Writes a short styled line to stderr
#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn show(&self, _id: &str, notification: &Notification) -> Result<()> {
        let mut stderr = std::io::stderr().lock();
        let title = if notification.priority_hint >= 2 {
            notification.title.as_str().bold().red()
        } else {
            notification.title.as_str().bold()
        };
        writeln!(stderr, "{title}: {}", notification.message)?;
        if notification.require_interaction {
            stderr.write_all(b"\x07")?;
        }
        stderr.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum NotificationDestination {
    Stdout,
    File(PathBuf),
}

impl NotificationDestination {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("-") => NotificationDestination::Stdout,
            Some(path) => NotificationDestination::File(PathBuf::from(path)),
        }
    }

    pub fn open(&self) -> Result<JsonlNotifier> {
        match self {
            NotificationDestination::Stdout => Ok(JsonlNotifier::stdout()),
            NotificationDestination::File(path) => JsonlNotifier::file(path),
        }
    }
}

#[derive(Serialize)]
struct NotificationRecord<'a> {
    schema_version: &'static str,
    id: &'a str,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// Emits each notification as one JSON line
pub struct JsonlNotifier {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonlNotifier {
    pub fn stdout() -> Self {
        Self::from_writer(Box::new(std::io::stdout()))
    }

    /// Append to a file, creating it if necessary
    pub fn file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::from_writer(Box::new(file)))
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl Notifier for JsonlNotifier {
    fn show(&self, id: &str, notification: &Notification) -> Result<()> {
        let record = NotificationRecord {
            schema_version: NOTIFICATION_SCHEMA_VERSION,
            id,
            timestamp: Utc::now(),
            notification,
        };
        let serialized = serde_json::to_vec(&record)?;
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.write_all(&serialized)?;
        writer.write_all(b"\n")?;
        writer.flush().map_err(Error::Io)?;
        Ok(())
    }
}

/// Build the notifier selected in config
pub fn from_config(config: &NotifyConfig) -> Result<Box<dyn Notifier>> {
    match config.sink {
        NotifySink::Terminal => Ok(Box::new(TerminalNotifier)),
        NotifySink::Jsonl => Ok(Box::new(
            NotificationDestination::parse(config.path.as_deref()).open()?,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonl_notifier_appends_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("notifications.jsonl");
        let notifier = NotificationDestination::parse(Some(path.to_str().unwrap()))
            .open()
            .unwrap();

        let notification = Notification {
            title: "AI Reminder".to_string(),
            message: "Stand-up in 10 minutes".to_string(),
            priority_hint: 2,
            require_interaction: true,
        };
        notifier.show("reminder_a_b", &notification).unwrap();
        notifier.show("reminder_a_c", &notification).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["schema_version"], NOTIFICATION_SCHEMA_VERSION);
        assert_eq!(lines[0]["id"], "reminder_a_b");
        assert_eq!(lines[0]["message"], "Stand-up in 10 minutes");
        assert_eq!(lines[0]["priority_hint"], 2);
        assert_eq!(lines[1]["require_interaction"], true);
    }

    #[test]
    fn destination_parse() {
        assert!(matches!(
            NotificationDestination::parse(None),
            NotificationDestination::Stdout
        ));
        assert!(matches!(
            NotificationDestination::parse(Some(" - ")),
            NotificationDestination::Stdout
        ));
        assert!(matches!(
            NotificationDestination::parse(Some("/tmp/n.jsonl")),
            NotificationDestination::File(_)
        ));
    }
}
