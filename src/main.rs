//! nudge - reminders from plain language
//!
//! Runs the reminder daemon (`nudge run`) or talks to it over the control
//! socket (`add`, `list`, `test`, `clear`, `watch`, `page`).

use clap::Parser;
use nudge::cli::{Cli, Commands};
use nudge::output::{emit_error, infer_command_name_from_args};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    let command = infer_command_name_from_args();
    let cli = Cli::parse();

    // Tracing is opt-in via RUST_LOG; `nudge run --verbose` falls back to info.
    // Keep startup robust: ignore invalid/huge filters.
    let fallback = if cli.verbose && matches!(cli.command, Commands::Run { .. }) {
        "nudge=info"
    } else {
        "off"
    };
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw.len() > 4096 {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let json = cli.json;
    if let Err(err) = cli.run() {
        let _ = emit_error(&command, &err, json);
        std::process::exit(err.exit_code());
    }
}
