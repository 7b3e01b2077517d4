//! nudge watch command implementation
//!
//! Keeps two connections open: one subscribed to service events, one for
//! re-fetching the listing after each event.

use std::io::Write;

use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};

use super::{list, Session};
use crate::client::ControlClient;
use crate::error::{Error, Result};
use crate::output::{emit_success, format_human};

async fn refresh(session: &Session, client: &mut ControlClient) -> Result<()> {
    let active = client.list_active_tasks().await?;
    if session.output.json {
        return emit_success(session.output, "watch", &active, None);
    }
    if session.output.quiet {
        return Ok(());
    }

    let mut stdout = std::io::stdout().lock();
    execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
    writeln!(stdout, "{}", format_human(&list::render(&active)))?;
    stdout.flush()?;
    Ok(())
}

pub async fn run(session: &Session) -> Result<()> {
    let mut queries = ControlClient::connect(&session.socket).await?;
    let mut events = ControlClient::connect(&session.socket).await?;
    events.subscribe().await?;

    refresh(session, &mut queries).await?;

    loop {
        tokio::select! {
            event = events.next_event() => match event? {
                Some(event) => {
                    tracing::debug!(?event, "refreshing listing");
                    refresh(session, &mut queries).await?;
                }
                None => return Err(Error::DaemonUnavailable(session.socket.clone())),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
