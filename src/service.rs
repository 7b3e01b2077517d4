//! The reminder service.
//!
//! Owns the task store and keeps the wake-up registry consistent with it:
//! every reminder whose fire time is ahead of "now" has exactly one wake-up,
//! named after its (task, reminder) pair. All store mutations run under one
//! async mutex, so commands never interleave their read-modify-write; the
//! model call happens before the lock is taken.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{ModelClient, ModelRequest};
use crate::notify::{Notification, Notifier};
use crate::pages::{BroadcastReport, PageHub, PageRequest, DEFAULT_NOTIFICATION_TITLE};
use crate::parse::{parse_response, ParseOptions};
use crate::storage::TaskSlot;
use crate::task::{Priority, Reminder, Task, TaskStore};
use crate::wakeup::{WakeUp, WakeUpKey, WakeUpScheduler};

const EVENT_CAPACITY: usize = 64;
const SELF_TEST_ID: &str = "test";
const SELF_TEST_TITLE: &str = "Test Notification";
const SELF_TEST_MESSAGE: &str = "Test reminder working! Sound should also play.";

/// Collaborators injected into the service
#[derive(Clone)]
pub struct ServiceDeps {
    pub model: Arc<dyn ModelClient>,
    pub slot: Arc<dyn TaskSlot>,
    pub scheduler: Arc<dyn WakeUpScheduler>,
    pub notifier: Arc<dyn Notifier>,
    pub pages: Arc<PageHub>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Fire times further ahead than this are rejected at parse time
    pub max_horizon: Duration,
    /// Bound on a single model call
    pub model_timeout: StdDuration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            max_horizon: Duration::days(366),
            model_timeout: StdDuration::from_secs(60),
        }
    }
}

impl From<&Config> for ServiceOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_horizon: Duration::days(config.schedule.max_horizon_days),
            model_timeout: StdDuration::from_secs(config.model.timeout_secs),
        }
    }
}

/// Broadcast to front ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceEvent {
    TasksChanged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub tasks: Vec<Task>,
    pub reminders: Vec<Reminder>,
    /// Wake-ups created for this submission (future reminders only)
    pub scheduled: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub scheduled: usize,
    pub kept: usize,
    pub pruned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    pub tasks_removed: usize,
    pub wake_ups_cancelled: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub notification_id: String,
    pub notified: bool,
    pub pages_delivered: usize,
    pub pages_failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Name does not decode as a reminder wake-up
    Foreign,
    /// Already handled, or never scheduled by this service
    NotActive,
    /// Task or reminder no longer exists
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WakeUpOutcome {
    Delivered(DispatchReport),
    Ignored { reason: IgnoreReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfTestReport {
    pub notification: DispatchReport,
    pub sound: BroadcastReport,
}

#[derive(Default)]
struct State {
    store: TaskStore,
    /// Wake-up names scheduled by this service and not yet handled
    active: HashSet<String>,
}

pub struct ReminderService {
    deps: ServiceDeps,
    options: ServiceOptions,
    state: Mutex<State>,
    events: broadcast::Sender<ServiceEvent>,
}

impl ReminderService {
    /// Service with an empty store; nothing is loaded or scheduled
    pub fn new(deps: ServiceDeps, options: ServiceOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            deps,
            options,
            state: Mutex::new(State::default()),
            events,
        }
    }

    /// Load the persisted task list and re-derive its wake-ups
    pub async fn restore(deps: ServiceDeps, options: ServiceOptions) -> Result<Self> {
        let tasks = deps.slot.load()?;
        let service = Self::new(deps, options);
        service.state.lock().await.store = TaskStore::from_vec(tasks);

        let report = service.reconcile().await;
        tracing::info!(
            tasks = service.state.lock().await.store.tasks().len(),
            scheduled = report.scheduled,
            kept = report.kept,
            pruned = report.pruned,
            "reminder service restored"
        );
        Ok(service)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.deps.clock.now()
    }

    pub fn pages(&self) -> &Arc<PageHub> {
        &self.deps.pages
    }

    fn emit(&self, event: ServiceEvent) {
        // No receivers is normal when no front end is watching.
        let _ = self.events.send(event);
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Ask the model about `text`, store the resulting tasks and schedule
    /// their future reminders
    ///
    /// The store is untouched when any step fails.
    pub async fn submit_task(&self, text: &str, context: Option<&str>) -> Result<Submission> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidArgument("task text is empty".to_string()));
        }
        let context = context.map(str::trim).filter(|c| !c.is_empty());

        let request = ModelRequest {
            task_text: text.to_string(),
            context: context.map(str::to_string),
            now: self.deps.clock.now_local(),
        };
        let response = tokio::time::timeout(self.options.model_timeout, self.deps.model.complete(&request))
            .await
            .map_err(|_| {
                Error::Model(format!(
                    "model call timed out after {}s",
                    self.options.model_timeout.as_secs()
                ))
            })??;

        let tasks = parse_response(
            &response,
            &ParseOptions {
                original_text: text,
                context,
                now: self.deps.clock.now(),
                tz: Local,
                max_horizon: self.options.max_horizon,
            },
        )
        .inspect_err(|err| tracing::debug!(%err, response = %response, "unparseable model response"))?;

        let mut state = self.state.lock().await;

        let mut updated = state.store.to_vec();
        updated.extend(tasks.iter().cloned());
        self.deps.slot.save(&updated)?;
        state.store.extend(tasks.iter().cloned());

        let now = self.deps.clock.now();
        let existing = self.owned_wake_ups();
        let mut scheduled = 0;
        for task in &tasks {
            for reminder in task.future_reminders(now) {
                let key = WakeUpKey::new(&task.id, &reminder.id);
                if self.ensure_wake_up(&mut state, &key, reminder.time, &existing) {
                    scheduled += 1;
                }
            }
        }
        drop(state);

        tracing::info!(tasks = tasks.len(), scheduled, "task submitted");
        self.emit(ServiceEvent::TasksChanged);

        let reminders = tasks.iter().flat_map(|t| t.reminders.iter().cloned()).collect();
        Ok(Submission {
            tasks,
            reminders,
            scheduled,
        })
    }

    /// Tasks that still have at least one future reminder
    pub async fn list_active_tasks(&self) -> Vec<Task> {
        let now = self.deps.clock.now();
        self.state.lock().await.store.active(now)
    }

    /// Owned wake-ups currently registered, ordered by time
    pub async fn scheduled_wake_ups(&self) -> Vec<WakeUp> {
        let _state = self.state.lock().await;
        self.deps
            .scheduler
            .list_all()
            .into_iter()
            .filter(|w| WakeUpKey::decode(&w.name).is_some())
            .collect()
    }

    /// Cancel owned wake-ups and empty the store
    pub async fn clear_all(&self) -> Result<ClearReport> {
        let mut state = self.state.lock().await;

        self.deps.slot.save(&[])?;

        let mut cancelled = 0;
        for wake_up in self.deps.scheduler.list_all() {
            if WakeUpKey::decode(&wake_up.name).is_some() && self.deps.scheduler.cancel(&wake_up.name) {
                cancelled += 1;
            }
        }

        let removed = state.store.tasks().len();
        state.store.clear();
        state.active.clear();
        drop(state);

        tracing::info!(tasks = removed, wake_ups = cancelled, "cleared all tasks");
        self.emit(ServiceEvent::TasksChanged);

        Ok(ClearReport {
            tasks_removed: removed,
            wake_ups_cancelled: cancelled,
        })
    }

    /// Handle a wake-up delivered by the registry
    ///
    /// Foreign names, already-handled names and stale pairs are no-ops.
    pub async fn handle_wake_up(&self, name: &str) -> WakeUpOutcome {
        let Some(key) = WakeUpKey::decode(name) else {
            tracing::debug!(name, "ignoring foreign wake-up");
            return WakeUpOutcome::Ignored {
                reason: IgnoreReason::Foreign,
            };
        };

        let mut state = self.state.lock().await;
        if !state.active.remove(name) {
            tracing::debug!(name, "ignoring wake-up that is not active");
            return WakeUpOutcome::Ignored {
                reason: IgnoreReason::NotActive,
            };
        }

        let Some((task, reminder)) = state.store.lookup(&key.task_id, &key.reminder_id) else {
            tracing::debug!(name, "ignoring wake-up for removed reminder");
            return WakeUpOutcome::Ignored {
                reason: IgnoreReason::Stale,
            };
        };
        let priority = task.priority;
        let message = reminder.message.clone();
        let fire_time = reminder.time;
        // Already out of `active`, so duplicates are rejected without the lock.
        drop(state);

        let lateness = self.deps.clock.now() - fire_time;
        if lateness > Duration::seconds(1) {
            tracing::info!(name, late_by_secs = lateness.num_seconds(), "delivering late reminder");
        }

        let report = self
            .dispatch(name, DEFAULT_NOTIFICATION_TITLE, priority, &message)
            .await;
        WakeUpOutcome::Delivered(report)
    }

    /// Push a synthetic notification through the normal dispatch path
    pub async fn run_self_test(&self) -> SelfTestReport {
        let notification = self
            .dispatch(SELF_TEST_ID, SELF_TEST_TITLE, Priority::Medium, SELF_TEST_MESSAGE)
            .await;
        let sound = self.deps.pages.broadcast(&PageRequest::PlaySound).await;
        SelfTestReport {
            notification,
            sound,
        }
    }

    /// Make the registry match the store
    ///
    /// Every future reminder gets exactly one wake-up at its fire time;
    /// owned wake-ups with no matching future reminder are cancelled.
    /// Running it twice in a row changes nothing the second time.
    pub async fn reconcile(&self) -> ReconcileReport {
        let mut state = self.state.lock().await;
        let now = self.deps.clock.now();
        let existing = self.owned_wake_ups();

        let mut wanted: HashMap<String, (WakeUpKey, DateTime<Utc>)> = HashMap::new();
        for task in state.store.tasks() {
            for reminder in task.future_reminders(now) {
                let key = WakeUpKey::new(&task.id, &reminder.id);
                wanted.insert(key.name(), (key, reminder.time));
            }
        }

        let mut report = ReconcileReport::default();
        for name in existing.keys() {
            if !wanted.contains_key(name) {
                self.deps.scheduler.cancel(name);
                state.active.remove(name);
                report.pruned += 1;
            }
        }

        for (key, at) in wanted.values() {
            if self.ensure_wake_up(&mut state, key, *at, &existing) {
                report.scheduled += 1;
            } else {
                report.kept += 1;
            }
        }

        report
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn owned_wake_ups(&self) -> HashMap<String, DateTime<Utc>> {
        self.deps
            .scheduler
            .list_all()
            .into_iter()
            .filter(|w| WakeUpKey::decode(&w.name).is_some())
            .map(|w| (w.name, w.at))
            .collect()
    }

    /// Schedule `key` at `at` unless an identical wake-up already exists.
    /// Returns true when a wake-up was created or moved.
    fn ensure_wake_up(
        &self,
        state: &mut State,
        key: &WakeUpKey,
        at: DateTime<Utc>,
        existing: &HashMap<String, DateTime<Utc>>,
    ) -> bool {
        let name = key.name();
        if existing.get(&name) == Some(&at) {
            state.active.insert(name);
            return false;
        }

        match self.deps.scheduler.schedule(&name, at) {
            Ok(()) => {
                state.active.insert(name);
                true
            }
            Err(err) => {
                tracing::warn!(%name, %err, "failed to schedule wake-up");
                false
            }
        }
    }

    async fn dispatch(
        &self,
        id: &str,
        title: &str,
        priority: Priority,
        message: &str,
    ) -> DispatchReport {
        let high = priority == Priority::High;
        let notification = Notification {
            title: title.to_string(),
            message: message.to_string(),
            priority_hint: if high { 2 } else { 1 },
            require_interaction: high,
        };

        let notified = match self.deps.notifier.show(id, &notification) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(id, %err, "platform notification failed");
                false
            }
        };

        let pages = self
            .deps
            .pages
            .broadcast(&PageRequest::ShowNotification {
                title: title.to_string(),
                message: message.to_string(),
            })
            .await;
        tracing::info!(id, delivered = pages.delivered, failed = pages.failed, "notification sent");

        DispatchReport {
            notification_id: id.to_string(),
            notified,
            pages_delivered: pages.delivered,
            pages_failed: pages.failed,
        }
    }
}
