//! nudge list command implementation

use chrono::{DateTime, Local};

use super::Session;
use crate::client::ControlClient;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::protocol::ActiveTasks;

pub const EMPTY_LIST: &str = "No active reminders";

pub(crate) fn format_time(time: DateTime<Local>) -> String {
    time.format("%a %Y-%m-%d %H:%M").to_string()
}

/// Human rendering shared by `list` and `watch`
pub(crate) fn render(active: &ActiveTasks) -> HumanOutput {
    if active.tasks.is_empty() {
        return HumanOutput::new(EMPTY_LIST);
    }

    let mut human = HumanOutput::new(format!("Active reminders ({})", active.tasks.len()));
    for task in &active.tasks {
        let status = match task.next_reminder(active.now) {
            Some(next) => format!("Next: {}", format_time(next.time.with_timezone(&Local))),
            None => "Completed".to_string(),
        };
        human.push_summary(&task.original_text, status);
    }
    human
}

pub async fn run(session: &Session) -> Result<()> {
    let mut client = ControlClient::connect(&session.socket).await?;
    let active = client.list_active_tasks().await?;

    let mut human = render(&active);
    if !active.tasks.is_empty() {
        human.push_next_step("nudge clear");
    }
    emit_success(session.output, "list", &active, Some(&human))
}
