//! nudge - Reminders from plain language
//!
//! This library provides the core functionality for the nudge CLI and
//! daemon: free-text task descriptions are sent to a language model, the
//! structured reply becomes tasks with timed reminders, and each reminder
//! fires a notification on every attached page.
//!
//! # Core Concepts
//!
//! - **Tasks**: model-derived activities, each with ordered reminders
//! - **Wake-ups**: one-shot named timers, one per future reminder
//! - **Pages**: presenters attached to the daemon (banner, sound, title flash)
//! - **Control socket**: JSON-lines protocol between CLI and daemon
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `client` / `protocol` / `daemon`: control socket and daemon loop
//! - `config`: Configuration loading from `config.toml`
//! - `error`: Error types and result aliases
//! - `service`: The reminder service (store, scheduling, dispatch)
//! - `llm` / `parse`: Model call and response parsing
//! - `task`: Task and reminder records
//! - `wakeup` / `clock`: Wake-up registry and time source
//! - `notify` / `pages` / `presenter`: Notification delivery
//! - `storage` / `lock`: Task slot persistence with file locking

pub mod cli;
pub mod client;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod error;
pub mod llm;
pub mod lock;
pub mod notify;
pub mod output;
pub mod pages;
pub mod parse;
pub mod presenter;
pub mod protocol;
pub mod service;
pub mod storage;
pub mod task;
pub mod wakeup;

pub use error::{Error, Result};
