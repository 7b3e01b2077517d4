//! Wake-ups: one-shot timers that deliver a name at an absolute time.
//!
//! The registry only knows names. The reminder service encodes its
//! (task id, reminder id) pair into the name with `WakeUpKey` and ignores
//! names it cannot decode, which is also how it avoids touching wake-ups it
//! does not own.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use ulid::Ulid;

use crate::clock::Clock;
use crate::error::{Error, Result};

/// Prefix of every wake-up name owned by the reminder service
pub const WAKE_UP_PREFIX: &str = "reminder";
const WAKE_UP_DELIM: char = '_';

/// Longest a timer sleeps before looking at the wall clock again
pub const WALL_CLOCK_CHECK: Duration = Duration::from_secs(30);

/// Structured identity of a reminder wake-up
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WakeUpKey {
    pub task_id: String,
    pub reminder_id: String,
}

impl WakeUpKey {
    pub fn new(task_id: impl Into<String>, reminder_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            reminder_id: reminder_id.into(),
        }
    }

    /// Encode as `reminder_<task>_<reminder>`
    pub fn name(&self) -> String {
        format!(
            "{WAKE_UP_PREFIX}{WAKE_UP_DELIM}{}{WAKE_UP_DELIM}{}",
            self.task_id, self.reminder_id
        )
    }

    /// Decode a wake-up name; `None` for names this service does not own
    pub fn decode(name: &str) -> Option<Self> {
        name.parse().ok()
    }
}

impl fmt::Display for WakeUpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for WakeUpKey {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        let invalid = || Error::InvalidArgument(format!("not a reminder wake-up: '{name}'"));

        let mut parts = name.split(WAKE_UP_DELIM);
        let (Some(prefix), Some(task_id), Some(reminder_id), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if prefix != WAKE_UP_PREFIX {
            return Err(invalid());
        }
        // Ids are ULIDs, which never contain the delimiter.
        if Ulid::from_string(task_id).is_err() || Ulid::from_string(reminder_id).is_err() {
            return Err(invalid());
        }

        Ok(Self::new(task_id, reminder_id))
    }
}

/// A scheduled wake-up as reported by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeUp {
    pub name: String,
    pub at: DateTime<Utc>,
}

/// Platform alarm facility
pub trait WakeUpScheduler: Send + Sync {
    /// Schedule `name` at `at`, replacing any wake-up with the same name
    fn schedule(&self, name: &str, at: DateTime<Utc>) -> Result<()>;

    /// Cancel `name`; returns whether something was cancelled
    fn cancel(&self, name: &str) -> bool;

    fn list_all(&self) -> Vec<WakeUp>;
}

struct Entry {
    at: DateTime<Utc>,
    generation: u64,
    handle: JoinHandle<()>,
}

type Entries = Arc<Mutex<HashMap<String, Entry>>>;

fn lock_entries(entries: &Entries) -> MutexGuard<'_, HashMap<String, Entry>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Wake-up registry backed by tokio timers
///
/// Each wake-up is a spawned task sleeping until its time; on expiry the
/// entry is removed and the name is sent on the channel given to `new`.
/// Sleeps are capped at the check interval and the remaining time is
/// recomputed from the clock, so suspends and clock changes do not shift
/// the fire time.
pub struct TokioScheduler {
    clock: Arc<dyn Clock>,
    runtime: Handle,
    entries: Entries,
    fired: mpsc::UnboundedSender<String>,
    next_generation: AtomicU64,
    check_interval: Duration,
}

impl TokioScheduler {
    /// Create a scheduler on the current tokio runtime
    pub fn new(clock: Arc<dyn Clock>, fired: mpsc::UnboundedSender<String>) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|err| Error::Protocol(format!("wake-up scheduler needs a tokio runtime: {err}")))?;
        Ok(Self {
            clock,
            runtime,
            entries: Arc::new(Mutex::new(HashMap::new())),
            fired,
            next_generation: AtomicU64::new(0),
            check_interval: WALL_CLOCK_CHECK,
        })
    }

    /// Override how often sleeping timers re-read the clock
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval.max(Duration::from_millis(1));
        self
    }
}

impl WakeUpScheduler for TokioScheduler {
    fn schedule(&self, name: &str, at: DateTime<Utc>) -> Result<()> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let clock = Arc::clone(&self.clock);
        let check_interval = self.check_interval;
        let entries = Arc::clone(&self.entries);
        let fired = self.fired.clone();
        let owned_name = name.to_string();

        // Hold the map lock across spawn so the timer cannot remove its
        // entry before it is inserted.
        let mut map = lock_entries(&self.entries);
        let handle = self.runtime.spawn(async move {
            loop {
                let remaining = (at - clock.now()).to_std().unwrap_or_default();
                if remaining.is_zero() {
                    break;
                }
                tokio::time::sleep(remaining.min(check_interval)).await;
            }
            {
                let mut map = lock_entries(&entries);
                match map.get(&owned_name) {
                    Some(entry) if entry.generation == generation => {
                        map.remove(&owned_name);
                    }
                    _ => return,
                }
            }
            if fired.send(owned_name).is_err() {
                tracing::debug!("wake-up receiver dropped");
            }
        });

        if let Some(previous) = map.insert(
            name.to_string(),
            Entry {
                at,
                generation,
                handle,
            },
        ) {
            previous.handle.abort();
        }
        tracing::debug!(name, %at, "wake-up scheduled");
        Ok(())
    }

    fn cancel(&self, name: &str) -> bool {
        match lock_entries(&self.entries).remove(name) {
            Some(entry) => {
                entry.handle.abort();
                tracing::debug!(name, "wake-up cancelled");
                true
            }
            None => false,
        }
    }

    fn list_all(&self) -> Vec<WakeUp> {
        let mut all: Vec<WakeUp> = lock_entries(&self.entries)
            .iter()
            .map(|(name, entry)| WakeUp {
                name: name.clone(),
                at: entry.at,
            })
            .collect();
        all.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.name.cmp(&b.name)));
        all
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, entry) in lock_entries(&self.entries).drain() {
            entry.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use chrono::Duration;

    struct ShiftedClock {
        offset: Mutex<Duration>,
    }

    impl ShiftedClock {
        fn new() -> Self {
            Self {
                offset: Mutex::new(Duration::zero()),
            }
        }

        fn jump(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for ShiftedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now() + *self.offset.lock().unwrap()
        }
    }

    #[test]
    fn key_round_trips_through_name() {
        let key = WakeUpKey::new(Ulid::new().to_string(), Ulid::new().to_string());
        let name = key.name();
        assert!(name.starts_with("reminder_"));
        assert_eq!(WakeUpKey::decode(&name), Some(key));
    }

    #[test]
    fn decode_rejects_foreign_and_malformed_names() {
        let task = Ulid::new().to_string();
        let reminder = Ulid::new().to_string();

        assert!(WakeUpKey::decode("daily-backup").is_none());
        assert!(WakeUpKey::decode(&format!("snooze_{task}_{reminder}")).is_none());
        assert!(WakeUpKey::decode(&format!("reminder_{task}")).is_none());
        assert!(WakeUpKey::decode(&format!("reminder_{task}_{reminder}_x")).is_none());
        assert!(WakeUpKey::decode("reminder_1704103200000.5_0.25").is_none());
    }

    #[tokio::test]
    async fn fires_once_and_forgets() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = TokioScheduler::new(Arc::new(SystemClock), tx).unwrap();

        scheduler
            .schedule("soon", Utc::now() + Duration::milliseconds(20))
            .unwrap();
        assert_eq!(scheduler.list_all().len(), 1);

        let name = rx.recv().await.unwrap();
        assert_eq!(name, "soon");
        assert!(scheduler.list_all().is_empty());
    }

    #[tokio::test]
    async fn past_time_fires_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = TokioScheduler::new(Arc::new(SystemClock), tx).unwrap();

        scheduler
            .schedule("late", Utc::now() - Duration::minutes(1))
            .unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn reschedule_replaces_and_cancel_silences() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = TokioScheduler::new(Arc::new(SystemClock), tx).unwrap();

        let later = Utc::now() + Duration::hours(1);
        scheduler.schedule("a", Utc::now() + Duration::milliseconds(10)).unwrap();
        scheduler.schedule("a", later).unwrap();
        scheduler.schedule("b", Utc::now() + Duration::milliseconds(10)).unwrap();

        assert!(scheduler.cancel("b"));
        assert!(!scheduler.cancel("b"));

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(
            scheduler.list_all(),
            vec![WakeUp {
                name: "a".to_string(),
                at: later
            }]
        );
    }

    #[tokio::test]
    async fn wall_clock_jump_fires_due_wake_up() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let clock = Arc::new(ShiftedClock::new());
        let scheduler = TokioScheduler::new(clock.clone(), tx)
            .unwrap()
            .with_check_interval(std::time::Duration::from_millis(10));

        scheduler
            .schedule("meeting", clock.now() + Duration::hours(1))
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());

        // Resume from a two-hour suspend.
        clock.jump(Duration::hours(2));
        let name = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .expect("wake-up fired after the jump");
        assert_eq!(name.as_deref(), Some("meeting"));
    }

    #[tokio::test]
    async fn clock_set_back_delays_wake_up() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let clock = Arc::new(ShiftedClock::new());
        let scheduler = TokioScheduler::new(clock.clone(), tx)
            .unwrap()
            .with_check_interval(std::time::Duration::from_millis(10));

        scheduler
            .schedule("standup", clock.now() + Duration::milliseconds(50))
            .unwrap();
        clock.jump(-Duration::hours(1));

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.list_all().len(), 1);
    }
}
