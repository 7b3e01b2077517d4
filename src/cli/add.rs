//! nudge add command implementation

use chrono::Local;

use super::list::format_time;
use super::Session;
use crate::client::ControlClient;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};

/// Options for the add command
pub struct AddOptions {
    pub text: String,
    pub context: Option<String>,
}

pub async fn run(session: &Session, options: AddOptions) -> Result<()> {
    let text = options.text.trim();
    if text.is_empty() {
        return Err(Error::InvalidArgument(
            "describe the task, e.g. nudge add \"call mom tomorrow at 6pm\"".to_string(),
        ));
    }

    let mut client = ControlClient::connect(&session.socket).await?;
    let submission = client.submit_task(text, options.context.as_deref()).await?;

    let header = match submission.tasks.len() {
        0 => "No tasks found in that description".to_string(),
        1 => "Added 1 task".to_string(),
        n => format!("Added {n} tasks"),
    };
    let mut human = HumanOutput::new(header);
    for task in &submission.tasks {
        human.push_summary(&task.title, format!("{} priority", task.priority));
        for reminder in &task.reminders {
            human.push_detail(format!(
                "{} {} ({})",
                format_time(reminder.time.with_timezone(&Local)),
                reminder.message,
                reminder.kind
            ));
        }
    }

    let skipped = submission.reminders.len().saturating_sub(submission.scheduled);
    if skipped > 0 {
        human.push_warning(format!(
            "{skipped} reminder(s) are already in the past and were not scheduled"
        ));
    }
    if !submission.tasks.is_empty() {
        human.push_next_step("nudge list");
    }

    emit_success(session.output, "add", &submission, Some(&human))
}
