//! Terminal host: banner on the top row, window title via escape codes,
//! audio through external commands.
//!
//! The terminal's own title cannot be read back, so a flash saves it on the
//! xterm title stack and pops it to restore. Terminals without the stack
//! ignore those sequences and end up showing the host's fallback title.

use std::fmt;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use anyhow::{bail, Context};
use crossterm::cursor::{MoveTo, RestorePosition, SavePosition};
use crossterm::style::{Print, PrintStyledContent, Stylize};
use crossterm::terminal::{Clear, ClearType, SetTitle};
use crossterm::{execute, queue, Command as TerminalCommand};

use super::PageHost;
use crate::config::PresenterConfig;
use crate::error::Result;

/// Push the current window title onto the xterm title stack
#[derive(Debug, Clone, Copy)]
pub struct PushTitle;

impl TerminalCommand for PushTitle {
    fn write_ansi(&self, f: &mut impl fmt::Write) -> fmt::Result {
        f.write_str("\x1b[22;0t")
    }

    #[cfg(windows)]
    fn execute_winapi(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Pop the window title saved by `PushTitle`
#[derive(Debug, Clone, Copy)]
pub struct PopTitle;

impl TerminalCommand for PopTitle {
    fn write_ansi(&self, f: &mut impl fmt::Write) -> fmt::Result {
        f.write_str("\x1b[23;0t")
    }

    #[cfg(windows)]
    fn execute_winapi(&self) -> io::Result<()> {
        Ok(())
    }
}

pub struct TerminalHost {
    title: Mutex<String>,
    player: Vec<String>,
    speaker: Vec<String>,
}

fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn run(command: &[String], last_arg: &str) -> anyhow::Result<()> {
    let Some((program, args)) = command.split_first() else {
        bail!("no command configured");
    };
    let status = Command::new(program)
        .args(args)
        .arg(last_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("failed to start '{program}'"))?;
    if !status.success() {
        bail!("'{program}' exited with {status}");
    }
    Ok(())
}

impl TerminalHost {
    pub fn new(config: &PresenterConfig, initial_title: impl Into<String>) -> Self {
        Self {
            title: Mutex::new(initial_title.into()),
            player: split_command(&config.player),
            speaker: split_command(&config.speaker),
        }
    }

    fn remember_title(&self, title: &str) {
        *self
            .title
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = title.to_string();
    }

    fn write_top_row(&self, render: impl FnOnce(&mut io::StderrLock<'_>) -> io::Result<()>) -> Result<()> {
        let mut stderr = io::stderr().lock();
        queue!(stderr, SavePosition, MoveTo(0, 0), Clear(ClearType::CurrentLine))?;
        render(&mut stderr)?;
        queue!(stderr, RestorePosition)?;
        stderr.flush()?;
        Ok(())
    }
}

impl PageHost for TerminalHost {
    fn label(&self) -> String {
        "terminal".to_string()
    }

    fn show_banner(&self, title: &str, message: &str) -> Result<()> {
        self.write_top_row(|out| {
            queue!(
                out,
                PrintStyledContent(format!(" {title} ").bold().black().on_yellow()),
                Print(" "),
                Print(message)
            )
        })
    }

    fn dismiss_banner(&self) -> Result<()> {
        self.write_top_row(|_| Ok(()))
    }

    fn title(&self) -> String {
        self.title
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_title(&self, title: &str) -> Result<()> {
        execute!(io::stderr(), SetTitle(title))?;
        self.remember_title(title);
        Ok(())
    }

    fn save_title(&self) -> Result<()> {
        execute!(io::stderr(), PushTitle)?;
        Ok(())
    }

    fn restore_title(&self, original: &str, keep_saved: bool) -> Result<()> {
        let mut stderr = io::stderr().lock();
        queue!(stderr, SetTitle(original), PopTitle)?;
        if keep_saved {
            queue!(stderr, PushTitle)?;
        }
        stderr.flush()?;
        self.remember_title(original);
        Ok(())
    }

    fn play_wav(&self, wav: &[u8]) -> anyhow::Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix("nudge-")
            .suffix(".wav")
            .tempfile()
            .context("failed to create temporary WAV file")?;
        file.write_all(wav)?;
        file.flush()?;
        let path = file.path().to_string_lossy().into_owned();
        run(&self.player, &path)
    }

    /// Speech command, or the terminal bell when none is configured
    fn speak(&self, phrase: &str) -> anyhow::Result<()> {
        if self.speaker.is_empty() {
            let mut stderr = io::stderr().lock();
            stderr.write_all(b"\x07")?;
            stderr.flush()?;
            return Ok(());
        }
        run(&self.speaker, phrase)
    }
}
