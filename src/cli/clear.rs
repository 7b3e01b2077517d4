//! nudge clear command implementation

use std::io::{BufRead, Write};

use super::Session;
use crate::client::ControlClient;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};

/// Options for the clear command
pub struct ClearOptions {
    pub yes: bool,
}

fn confirm(prompt: &str) -> Result<bool> {
    let mut stderr = std::io::stderr().lock();
    write!(stderr, "{prompt} [y/N] ")?;
    stderr.flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

pub async fn run(session: &Session, options: ClearOptions) -> Result<()> {
    if !options.yes {
        if session.output.json {
            return Err(Error::InvalidArgument(
                "clear needs --yes when --json is set".to_string(),
            ));
        }
        if !confirm("Clear all reminders?")? {
            if !session.output.quiet {
                println!("Cancelled");
            }
            return Ok(());
        }
    }

    let mut client = ControlClient::connect(&session.socket).await?;
    let report = client.clear_all().await?;

    let mut human = HumanOutput::new("All reminders cleared");
    human.push_summary("Tasks removed", report.tasks_removed.to_string());
    human.push_summary("Wake-ups cancelled", report.wake_ups_cancelled.to_string());

    emit_success(session.output, "clear", &report, Some(&human))
}
