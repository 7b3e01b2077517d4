//! Model response parsing.
//!
//! The model answers in free text that should contain one JSON object of the
//! shape `{ "tasks": [ { title, description, priority, reminders: [ { time,
//! message, type } ] } ] }`. Prose before or after the object is tolerated.
//! Fire-time strings are local wall-clock times and are pinned to absolute
//! instants here, once.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::task::{new_id, Priority, Reminder, ReminderKind, Task};

const LOCAL_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Deserialize)]
struct ModelDocument {
    tasks: Vec<ModelTask>,
}

#[derive(Debug, Deserialize)]
struct ModelTask {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: Option<String>,
    reminders: Vec<ModelReminder>,
}

#[derive(Debug, Deserialize)]
struct ModelReminder {
    time: String,
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Inputs that turn a model document into tasks
#[derive(Debug, Clone)]
pub struct ParseOptions<'a, Tz: TimeZone> {
    pub original_text: &'a str,
    pub context: Option<&'a str>,
    pub now: DateTime<Utc>,
    /// Timezone the model's wall-clock strings are expressed in
    pub tz: Tz,
    /// Fire times beyond `now + max_horizon` are rejected
    pub max_horizon: Duration,
}

/// Find the structured block inside a free-form response
///
/// Returns the first well-formed JSON object that carries a `tasks` key,
/// or failing that the first well-formed object of any shape.
pub fn extract_block(response: &str) -> Result<Value> {
    let mut fallback = None;

    for (idx, ch) in response.char_indices() {
        if ch != '{' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&response[idx..]).into_iter::<Value>();
        if let Some(Ok(value @ Value::Object(_))) = stream.next() {
            if value.get("tasks").is_some() {
                return Ok(value);
            }
            if fallback.is_none() {
                fallback = Some(value);
            }
        }
    }

    fallback.ok_or_else(|| Error::Parse("no JSON object found in model response".to_string()))
}

/// Parse a model response into new tasks
pub fn parse_response<Tz: TimeZone>(response: &str, options: &ParseOptions<'_, Tz>) -> Result<Vec<Task>> {
    let block = extract_block(response)?;
    let document: ModelDocument = serde_json::from_value(block)
        .map_err(|err| Error::Parse(format!("unexpected response shape: {err}")))?;

    let created_at = options.now;
    let mut tasks = Vec::with_capacity(document.tasks.len());

    for raw in document.tasks {
        let title = raw.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::Parse("task title is empty".to_string()));
        }

        let mut reminders = Vec::with_capacity(raw.reminders.len());
        for reminder in raw.reminders {
            let time = parse_fire_time(&reminder.time, &options.tz)?;
            if time > options.now + options.max_horizon {
                return Err(Error::Parse(format!(
                    "reminder time '{}' is more than {} days ahead",
                    reminder.time,
                    options.max_horizon.num_days()
                )));
            }
            reminders.push(Reminder {
                id: new_id(),
                time,
                message: reminder.message,
                kind: reminder
                    .kind
                    .as_deref()
                    .map(ReminderKind::from_model)
                    .unwrap_or_default(),
            });
        }

        tasks.push(Task {
            id: new_id(),
            title,
            description: raw.description,
            original_text: options.original_text.to_string(),
            context: options
                .context
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            priority: raw
                .priority
                .as_deref()
                .map(Priority::from_model)
                .unwrap_or_default(),
            created_at,
            reminders,
        });
    }

    Ok(tasks)
}

/// Convert a model wall-clock string to an absolute instant in `tz`
///
/// Ambiguous local times (DST fold) resolve to the earliest instant; times
/// that do not exist in `tz` are rejected. Strings carrying an explicit
/// offset are taken as-is.
pub fn parse_fire_time<Tz: TimeZone>(raw: &str, tz: &Tz) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(with_offset.with_timezone(&Utc));
    }

    let naive = LOCAL_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| Error::Parse(format!("invalid reminder time '{raw}'")))?;

    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| Error::Parse(format!("reminder time '{raw}' does not exist locally")))
}
