//! nudge page command implementation

use std::sync::Arc;

use super::Session;
use crate::client::ControlClient;
use crate::error::Result;
use crate::pages::PageAgent;
use crate::presenter::{Presenter, PresenterSettings, TerminalHost};

/// Options for the page command
pub struct PageOptions {
    pub label: String,
}

pub async fn run(session: &Session, options: PageOptions) -> Result<()> {
    let mut client = ControlClient::connect(&session.socket).await?;
    let attached = client.attach_page(&options.label).await?;

    let host = Arc::new(TerminalHost::new(&session.config.presenter, "nudge page"));
    let presenter = Presenter::with_host(host, PresenterSettings::from(&session.config.presenter));

    if !session.output.quiet {
        eprintln!("attached as page {} ({}); ctrl-c to detach", attached.page_id, options.label);
    }

    loop {
        tokio::select! {
            request = client.next_page_request() => match request? {
                Some(request) => {
                    if let Err(err) = presenter.deliver(&request).await {
                        tracing::warn!(%err, "failed to present notification");
                    }
                }
                None => {
                    tracing::info!("daemon closed the connection");
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
