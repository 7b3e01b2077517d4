//! nudge run command implementation

use super::Session;
use crate::daemon::{self, DaemonOptions};
use crate::error::Result;

/// Options for the run command
pub struct RunOptions {
    pub local_page: bool,
}

pub async fn run(session: &Session, options: RunOptions) -> Result<()> {
    if session.config.model.api_key().is_none() {
        tracing::warn!(
            var = %session.config.model.api_key_env,
            "no API key in environment, model calls will be unauthenticated"
        );
    }

    if !session.output.quiet && !session.output.json {
        eprintln!("nudge daemon listening on {}", session.socket.display());
    }

    daemon::run(
        &session.config,
        &session.storage,
        DaemonOptions {
            socket: session.socket.clone(),
            local_page: options.local_page,
        },
    )
    .await
}
