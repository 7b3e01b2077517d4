#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use nudge::clock::Clock;
use nudge::error::{Error, Result};
use nudge::llm::{ModelClient, ModelRequest};
use nudge::notify::{Notification, Notifier};
use nudge::pages::{PageAgent, PageHub, PageRequest};
use nudge::service::{ReminderService, ServiceDeps, ServiceOptions};
use nudge::storage::TaskSlot;
use nudge::task::Task;
use nudge::wakeup::{WakeUp, WakeUpScheduler};

/// Local wall-clock time as a UTC instant
pub fn local(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, min, sec))
        .expect("valid date");
    Local
        .from_local_datetime(&naive)
        .earliest()
        .expect("local time exists")
        .with_timezone(&Utc)
}

pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
pub struct MemorySlot {
    pub tasks: Mutex<Vec<Task>>,
    pub saves: AtomicUsize,
    pub fail_saves: AtomicBool,
}

impl MemorySlot {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }
}

impl TaskSlot for MemorySlot {
    fn load(&self) -> Result<Vec<Task>> {
        Ok(self.stored())
    }

    fn save(&self, tasks: &[Task]) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Persistence("disk full".to_string()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.tasks.lock().unwrap() = tasks.to_vec();
        Ok(())
    }
}

/// Wake-up registry driven by the test
#[derive(Default)]
pub struct ManualScheduler {
    entries: Mutex<BTreeMap<String, DateTime<Utc>>>,
    pub schedule_calls: AtomicUsize,
}

impl ManualScheduler {
    /// Remove and return every wake-up due at `now`, earliest first
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut entries = self.entries.lock().unwrap();
        let mut due: Vec<(String, DateTime<Utc>)> = entries
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(name, at)| (name.clone(), *at))
            .collect();
        due.sort_by_key(|(_, at)| *at);
        for (name, _) in &due {
            entries.remove(name);
        }
        due.into_iter().map(|(name, _)| name).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<DateTime<Utc>> {
        self.entries.lock().unwrap().get(name).copied()
    }
}

impl WakeUpScheduler for ManualScheduler {
    fn schedule(&self, name: &str, at: DateTime<Utc>) -> Result<()> {
        self.schedule_calls.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().insert(name.to_string(), at);
        Ok(())
    }

    fn cancel(&self, name: &str) -> bool {
        self.entries.lock().unwrap().remove(name).is_some()
    }

    fn list_all(&self) -> Vec<WakeUp> {
        let mut all: Vec<WakeUp> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|(name, at)| WakeUp {
                name: name.clone(),
                at: *at,
            })
            .collect();
        all.sort_by_key(|w| w.at);
        all
    }
}

/// Model returning queued replies in order
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    pub requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn reply(&self, text: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(text.into()));
    }

    pub fn fail(&self, message: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Err(message.into()));
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(Error::Model(message)),
            None => Err(Error::Model("no scripted reply".to_string())),
        }
    }
}

/// Model that never answers
pub struct HangingModel;

#[async_trait]
impl ModelClient for HangingModel {
    async fn complete(&self, _request: &ModelRequest) -> Result<String> {
        std::future::pending().await
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub shown: Mutex<Vec<(String, Notification)>>,
}

impl RecordingNotifier {
    pub fn shown(&self) -> Vec<(String, Notification)> {
        self.shown.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn show(&self, id: &str, notification: &Notification) -> Result<()> {
        self.shown
            .lock()
            .unwrap()
            .push((id.to_string(), notification.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPage {
    pub seen: Mutex<Vec<PageRequest>>,
    pub fail: bool,
}

impl RecordingPage {
    pub fn seen(&self) -> Vec<PageRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageAgent for RecordingPage {
    fn label(&self) -> String {
        "recording".to_string()
    }

    async fn deliver(&self, request: &PageRequest) -> Result<()> {
        if self.fail {
            return Err(Error::Protocol("page unavailable".to_string()));
        }
        self.seen.lock().unwrap().push(request.clone());
        Ok(())
    }
}

/// Page that holds every delivery until released
#[derive(Default)]
pub struct GatedPage {
    pub entered: tokio::sync::Notify,
    pub release: tokio::sync::Notify,
}

#[async_trait]
impl PageAgent for GatedPage {
    fn label(&self) -> String {
        "gated".to_string()
    }

    async fn deliver(&self, _request: &PageRequest) -> Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

/// All doubles wired into one service
pub struct Harness {
    pub clock: Arc<FixedClock>,
    pub slot: Arc<MemorySlot>,
    pub scheduler: Arc<ManualScheduler>,
    pub model: Arc<ScriptedModel>,
    pub notifier: Arc<RecordingNotifier>,
    pub pages: Arc<PageHub>,
    pub page: Arc<RecordingPage>,
}

impl Harness {
    pub async fn new(now: DateTime<Utc>) -> Self {
        Self::with_slot(now, MemorySlot::default()).await
    }

    pub async fn with_slot(now: DateTime<Utc>, slot: MemorySlot) -> Self {
        let pages = Arc::new(PageHub::new());
        let page = Arc::new(RecordingPage::default());
        pages.attach(page.clone()).await;

        Self {
            clock: Arc::new(FixedClock::new(now)),
            slot: Arc::new(slot),
            scheduler: Arc::new(ManualScheduler::default()),
            model: Arc::new(ScriptedModel::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            pages,
            page,
        }
    }

    pub fn deps(&self) -> ServiceDeps {
        ServiceDeps {
            model: self.model.clone(),
            slot: self.slot.clone(),
            scheduler: self.scheduler.clone(),
            notifier: self.notifier.clone(),
            pages: self.pages.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn service(&self) -> ReminderService {
        ReminderService::new(self.deps(), ServiceOptions::default())
    }

    pub async fn restored(&self) -> ReminderService {
        ReminderService::restore(self.deps(), ServiceOptions::default())
            .await
            .expect("restore")
    }
}

/// Model reply with one task per (title, priority, reminders) entry
pub fn reply(tasks: &[(&str, &str, &[(&str, &str, &str)])]) -> String {
    let tasks: Vec<serde_json::Value> = tasks
        .iter()
        .map(|(title, priority, reminders)| {
            serde_json::json!({
                "title": title,
                "description": format!("{title} description"),
                "priority": priority,
                "reminders": reminders
                    .iter()
                    .map(|(time, message, kind)| serde_json::json!({
                        "time": time,
                        "message": message,
                        "type": kind,
                    }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::json!({ "tasks": tasks }).to_string()
}
