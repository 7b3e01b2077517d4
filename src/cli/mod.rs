//! Command-line interface for nudge
//!
//! This module defines the CLI structure using clap derive macros.
//! Each subcommand is defined in its own submodule; all of them except
//! `run` talk to the daemon over the control socket.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{default_data_dir, Config};
use crate::daemon;
use crate::error::{Error, Result};
use crate::output::OutputOptions;
use crate::storage::Storage;

mod add;
mod clear;
mod list;
mod page;
mod run;
mod watch;

/// nudge - reminders from plain language
///
/// Describe what you need to do; a language model turns it into scheduled
/// reminders and the daemon notifies you when they are due.
#[derive(Parser, Debug)]
#[command(name = "nudge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true, env = "NUDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the task store and control socket
    #[arg(long, global = true, env = "NUDGE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Describe a task and schedule its reminders
    Add {
        /// What needs doing, in plain language
        #[arg(required = true)]
        text: Vec<String>,

        /// Extra context passed to the model
        #[arg(short, long)]
        context: Option<String>,
    },

    /// Show tasks with upcoming reminders
    List,

    /// Send a test notification to every page
    Test,

    /// Remove all tasks and cancel their reminders
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the task list and refresh it whenever it changes
    Watch,

    /// Run the daemon in the foreground
    Run {
        /// Do not present notifications on this terminal
        #[arg(long)]
        no_local_page: bool,
    },

    /// Attach this terminal as a notification page
    Page {
        /// Label shown in daemon logs
        #[arg(long, default_value = "terminal")]
        label: String,
    },
}

/// Resolved global settings shared by every command
#[derive(Debug, Clone)]
pub struct Session {
    pub config: Config,
    pub storage: Storage,
    pub socket: PathBuf,
    pub output: OutputOptions,
}

impl Session {
    fn resolve(cli: &Cli) -> Result<Self> {
        let config = Config::resolve(cli.config.as_deref())?;
        let data_dir = cli
            .data_dir
            .clone()
            .or_else(default_data_dir)
            .ok_or_else(|| {
                Error::InvalidConfig(
                    "cannot determine a data directory; pass --data-dir".to_string(),
                )
            })?;
        let storage = Storage::new(data_dir);
        let socket = daemon::socket_path(&config, &storage);
        Ok(Self {
            config,
            storage,
            socket,
            output: OutputOptions {
                json: cli.json,
                quiet: cli.quiet,
            },
        })
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let session = Session::resolve(&self)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        runtime.block_on(async move {
            match self.command {
                Commands::Add { text, context } => {
                    add::run(
                        &session,
                        add::AddOptions {
                            text: text.join(" "),
                            context,
                        },
                    )
                    .await
                }
                Commands::List => list::run(&session).await,
                Commands::Test => self_test::run(&session).await,
                Commands::Clear { yes } => clear::run(&session, clear::ClearOptions { yes }).await,
                Commands::Watch => watch::run(&session).await,
                Commands::Run { no_local_page } => {
                    run::run(
                        &session,
                        run::RunOptions {
                            local_page: !no_local_page,
                        },
                    )
                    .await
                }
                Commands::Page { label } => page::run(&session, page::PageOptions { label }).await,
            }
        })
    }
}
